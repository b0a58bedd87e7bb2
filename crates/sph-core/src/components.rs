use crate::config::FinderConfig;
use crate::error::Result;
use crate::finders::{FinderFlags, KdTree, NeighborFinder, NeighborRecord};
use crate::geometry::Vector;
use crate::math::Float;
use crate::quantity::QuantityId;
use crate::scheduler::Scheduler;
use crate::storage::Storage;

/// Decides whether two neighboring particles are connected.
pub trait ComponentChecker: Sync {
    fn belong(&self, i: usize, j: usize) -> bool;
}

/// Any two particles within the search radius are connected.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllConnected;

impl ComponentChecker for AllConnected {
    fn belong(&self, _i: usize, _j: usize) -> bool {
        true
    }
}

/// Only particles with equal flags are connected.
#[derive(Clone, Copy, Debug)]
pub struct SameFlag<'a>(pub &'a [usize]);

impl ComponentChecker for SameFlag<'_> {
    fn belong(&self, i: usize, j: usize) -> bool {
        self.0[i] == self.0[j]
    }
}

/// Connects particles that are both away from the surface.
#[derive(Clone, Copy, Debug)]
pub struct InnerParticles<'a>(pub &'a [bool]);

impl ComponentChecker for InnerParticles<'_> {
    fn belong(&self, i: usize, j: usize) -> bool {
        !self.0[i] && !self.0[j]
    }
}

/// Connects overlapping particles and pairs moving slower than their mutual escape velocity.
#[derive(Clone, Copy, Debug)]
pub struct EscapeVelocity<'a> {
    pub positions: &'a [Vector],
    pub velocities: &'a [Vector],
    pub masses: &'a [Float],
    /// Overlap radius in units of the mean smoothing length.
    pub radius: Float,
    pub gravity_constant: Float,
}

impl ComponentChecker for EscapeVelocity<'_> {
    fn belong(&self, i: usize, j: usize) -> bool {
        let (ri, rj) = (self.positions[i], self.positions[j]);
        let dr = (ri - rj).length();
        if dr < 0.5 * self.radius * (ri.h() + rj.h()) {
            return true;
        }
        let dv = (self.velocities[i] - self.velocities[j]).length();
        let v_esc = (2.0 * self.gravity_constant * (self.masses[i] + self.masses[j]) / dr).sqrt();
        dv < v_esc
    }
}

bitflags::bitflags! {
    /// Options of [`find_storage_components`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ComponentFlags: u32 {
        /// Also connects gravitationally bound particles, searching up to 10 times further.
        const ESCAPE_VELOCITY = 1;
        /// Numbers components by decreasing total mass.
        const SORT_BY_MASS = 2;
    }
}

/// Assignment of particles to connected components.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Components {
    /// Component of each particle, in `0..count`.
    pub indices: Vec<usize>,
    pub count: usize,
}

impl Components {
    /// Number of particles in each component.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.count];
        for &c in &self.indices {
            sizes[c] += 1;
        }
        sizes
    }

    /// Particles of component `index`, in ascending order.
    pub fn members(&self, index: usize) -> Vec<usize> {
        (0..self.indices.len())
            .filter(|&i| self.indices[i] == index)
            .collect()
    }

    /// Renumbers the components so that component 0 has the largest `weight` sum.
    pub fn sort_by(&mut self, weights: &[Float]) {
        let mut totals = vec![0.0; self.count];
        for (&c, w) in self.indices.iter().zip(weights) {
            totals[c] += w;
        }
        let mut order: Vec<usize> = (0..self.count).collect();
        order.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]).then(a.cmp(&b)));
        let mut mapping = vec![0; self.count];
        for (new, &old) in order.iter().enumerate() {
            mapping[old] = new;
        }
        for c in &mut self.indices {
            *c = mapping[*c];
        }
    }
}

/// Finds connected components of the particles in a built finder.
///
/// Particle `j` is a neighbor of `i` if it lies within `radius · h_i` and the checker accepts
/// the pair. Components are numbered in the order of their lowest particle index.
pub fn find_components(
    finder: &dyn NeighborFinder,
    radius: Float,
    checker: &dyn ComponentChecker,
) -> Components {
    debug_assert!(radius > 0.0);
    let points = finder.points();
    let unassigned = usize::MAX;
    let mut indices = vec![unassigned; points.len()];
    let mut count = 0;
    let mut stack = Vec::new();
    let mut neighbors: Vec<NeighborRecord> = Vec::new();
    for i in 0..points.len() {
        if indices[i] != unassigned {
            continue;
        }
        indices[i] = count;
        stack.push(i);
        while let Some(index) = stack.pop() {
            finder.find_all(index, points[index].h() * radius, &mut neighbors);
            for n in &neighbors {
                if indices[n.index] == unassigned && checker.belong(index, n.index) {
                    indices[n.index] = count;
                    stack.push(n.index);
                }
            }
        }
        count += 1;
    }
    Components { indices, count }
}

/// Components of the particles of a storage.
pub fn find_storage_components(
    scheduler: &dyn Scheduler,
    storage: &Storage,
    radius: Float,
    flags: ComponentFlags,
    gravity_constant: Float,
) -> Result<Components> {
    let positions = storage.get::<Vector>(QuantityId::Position)?;
    let mut finder = KdTree::new(FinderConfig::default());
    finder.build(scheduler, positions, FinderFlags::SKIP_RANK);
    let mut components = if flags.contains(ComponentFlags::ESCAPE_VELOCITY) {
        let checker = EscapeVelocity {
            positions,
            velocities: storage.dt::<Vector>(QuantityId::Position)?,
            masses: storage.get::<Float>(QuantityId::Mass)?,
            radius,
            gravity_constant,
        };
        find_components(&finder, 10.0 * radius, &checker)
    } else {
        find_components(&finder, radius, &AllConnected)
    };
    if flags.contains(ComponentFlags::SORT_BY_MASS) {
        components.sort_by(storage.get::<Float>(QuantityId::Mass)?);
    }
    Ok(components)
}
