use tracing::debug;

use crate::error::Result;
use crate::geometry::Vector;
use crate::math::Float;
use crate::quantity::QuantityId;
use crate::storage::{IndicesFlags, Storage};

/// What happens to particles touching an attractor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttractorInteraction {
    /// Particles only feel the gravity of the attractor.
    #[default]
    None,
    /// Particles that enter the attractor are removed and their mass and momentum absorbed.
    Absorb,
    /// Particles are reflected from the attractor surface.
    Repel,
}

/// Point mass living outside of the particle partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attractor {
    pub position: Vector,
    pub velocity: Vector,
    pub acceleration: Vector,
    pub mass: Float,
    pub radius: Float,
    pub interaction: AttractorInteraction,
}

impl Attractor {
    pub fn new(position: Vector, velocity: Vector, radius: Float, mass: Float) -> Self {
        Self {
            position: position.clear_h(),
            velocity: velocity.clear_h(),
            acceleration: Vector::ZERO,
            mass,
            radius,
            interaction: AttractorInteraction::None,
        }
    }

    pub fn with_interaction(mut self, interaction: AttractorInteraction) -> Self {
        self.interaction = interaction;
        self
    }

    /// True if the sphere of radius `h` around `r` overlaps the attractor.
    pub fn touches(&self, r: &Vector) -> bool {
        let d = (*r - self.position).length();
        d < self.radius + r.h()
    }

    /// Explicit Euler update of the attractor's own motion.
    pub fn advance(&mut self, dt: Float) {
        self.position += self.velocity * dt;
        self.velocity += self.acceleration * dt;
        self.position.set_h(0.0);
        self.velocity.set_h(0.0);
    }
}

/// Applies the [`AttractorInteraction`] of every attractor to the particles touching it.
///
/// Absorbed particles are removed from the storage, their mass and momentum go to the
/// attractor. Repelled particles are moved onto the attractor surface and their approaching
/// velocity component is reflected. Returns the number of absorbed particles.
pub fn apply_interactions(storage: &mut Storage) -> Result<usize> {
    let mut absorbed = Vec::new();
    let mut attractors = storage.attractors().to_vec();
    {
        let r = storage.get::<Vector>(QuantityId::Position)?;
        let m = storage.get::<Float>(QuantityId::Mass)?;
        let v = storage.dt::<Vector>(QuantityId::Position)?;
        for attractor in attractors
            .iter_mut()
            .filter(|a| a.interaction == AttractorInteraction::Absorb)
        {
            let touching: Vec<usize> = (0..r.len())
                .filter(|&i| attractor.touches(&r[i]) && !absorbed.contains(&i))
                .collect();
            let mut momentum = attractor.velocity * attractor.mass;
            for i in touching {
                momentum += v[i].clear_h() * m[i];
                attractor.mass += m[i];
                absorbed.push(i);
            }
            attractor.velocity = momentum / attractor.mass;
        }
    }

    let repelling: Vec<Attractor> = attractors
        .iter()
        .copied()
        .filter(|a| a.interaction == AttractorInteraction::Repel)
        .collect();
    if !repelling.is_empty() {
        let mut positions = storage.get::<Vector>(QuantityId::Position)?.to_vec();
        let velocities = storage.dt_mut::<Vector>(QuantityId::Position)?;
        for attractor in &repelling {
            for (r, v) in positions.iter_mut().zip(velocities.iter_mut()) {
                if !attractor.touches(r) {
                    continue;
                }
                let d = (*r - attractor.position).clear_h();
                let n = if d.length_squared() > 0.0 {
                    d.normalized()
                } else {
                    Vector::Z_AXIS
                };
                let h = r.h();
                *r = (attractor.position + n * (attractor.radius + h)).with_smoothing_length(h);
                let vn = (*v - attractor.velocity).dot(&n);
                if vn < 0.0 {
                    *v -= n * (2.0 * vn);
                }
            }
        }
        storage
            .get_mut::<Vector>(QuantityId::Position)?
            .copy_from_slice(&positions);
    }

    *storage.attractors_mut() = attractors;
    if !absorbed.is_empty() {
        absorbed.sort_unstable();
        storage.remove(&absorbed, IndicesFlags::SORTED | IndicesFlags::PROPAGATE)?;
        debug!(count = absorbed.len(), "particles absorbed by attractors");
    }
    Ok(absorbed.len())
}
