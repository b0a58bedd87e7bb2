use crate::error::Result;
use crate::geometry::Vector;
use crate::math::{cube, sqr, Float};
use crate::quantity::QuantityId;
use crate::storage::Storage;

/// Solid spheres the collision handlers operate on.
///
/// The `h` lane of each position holds the sphere radius.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SphereState {
    pub positions: Vec<Vector>,
    pub velocities: Vec<Vector>,
    pub masses: Vec<Float>,
    pub angular_frequencies: Vec<Vector>,
}

impl SphereState {
    /// Reads positions (of second order) and masses; angular frequencies default to zero.
    pub fn from_storage(storage: &Storage) -> Result<Self> {
        let positions = storage.get::<Vector>(QuantityId::Position)?.to_vec();
        let angular_frequencies = storage
            .get::<Vector>(QuantityId::AngularFrequency)
            .map_or_else(|_| vec![Vector::ZERO; positions.len()], <[Vector]>::to_vec);
        Ok(Self {
            velocities: storage.dt::<Vector>(QuantityId::Position)?.to_vec(),
            masses: storage.get::<Float>(QuantityId::Mass)?.to_vec(),
            positions,
            angular_frequencies,
        })
    }

    /// Writes the state back; angular frequencies only if the storage holds them.
    pub fn write_to(&self, storage: &mut Storage) -> Result<()> {
        storage
            .get_mut::<Vector>(QuantityId::Position)?
            .copy_from_slice(&self.positions);
        storage
            .dt_mut::<Vector>(QuantityId::Position)?
            .copy_from_slice(&self.velocities);
        storage
            .get_mut::<Float>(QuantityId::Mass)?
            .copy_from_slice(&self.masses);
        if let Ok(omega) = storage.get_mut::<Vector>(QuantityId::AngularFrequency) {
            omega.copy_from_slice(&self.angular_frequencies);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Moment of inertia of a homogeneous sphere, `2/5 m r²`.
    pub fn moment_of_inertia(&self, i: usize) -> Float {
        0.4 * self.masses[i] * sqr(self.positions[i].h())
    }
}

/// Body replacing two merged spheres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergedBody {
    /// Center of mass, the `h` lane holds the volume-conserving radius.
    pub position: Vector,
    pub velocity: Vector,
    pub mass: Float,
    pub angular_frequency: Vector,
}

impl MergedBody {
    /// Merger of spheres `i` and `j` conserving mass, volume, momentum and angular momentum.
    pub fn of(state: &SphereState, i: usize, j: usize) -> Self {
        let (ri, rj) = (state.positions[i], state.positions[j]);
        let (vi, vj) = (state.velocities[i].clear_h(), state.velocities[j].clear_h());
        let (mi, mj) = (state.masses[i], state.masses[j]);
        let mass = mi + mj;
        let h = (cube(ri.h()) + cube(rj.h())).cbrt();
        let com = (ri.clear_h() * mi + rj.clear_h() * mj) / mass;
        let v = (vi * mi + vj * mj) / mass;

        let orbital = (ri.clear_h() - com).cross(&(vi - v)) * mi
            + (rj.clear_h() - com).cross(&(vj - v)) * mj;
        let spin = state.angular_frequencies[i] * state.moment_of_inertia(i)
            + state.angular_frequencies[j] * state.moment_of_inertia(j);
        let inertia = 0.4 * mass * sqr(h);
        let angular_frequency = if inertia > 0.0 {
            (orbital + spin) / inertia
        } else {
            Vector::ZERO
        };
        Self {
            position: com.with_smoothing_length(h),
            velocity: v,
            mass,
            angular_frequency,
        }
    }
}

/// Outcome of a collision proposed by a [`CollisionHandler`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionVerdict {
    /// Spheres are left as they are.
    None,
    /// Sphere `into` is replaced by `body` and sphere `removed` disappears.
    Merge {
        into: usize,
        removed: usize,
        body: MergedBody,
    },
    /// Both spheres keep their positions and receive new velocities.
    Bounce {
        i: usize,
        j: usize,
        vi: Vector,
        vj: Vector,
    },
}

/// Decides what happens when two spheres touch.
///
/// Handlers only propose; the change is applied by [`commit_verdict`].
pub trait CollisionHandler: Send + Sync {
    fn collide(&self, state: &SphereState, i: usize, j: usize) -> CollisionVerdict;
}

/// Applies a verdict; returns the index of a sphere to be removed.
pub fn commit_verdict(state: &mut SphereState, verdict: &CollisionVerdict) -> Option<usize> {
    match *verdict {
        CollisionVerdict::None => None,
        CollisionVerdict::Merge {
            into,
            removed,
            body,
        } => {
            state.positions[into] = body.position;
            state.velocities[into] = body.velocity;
            state.masses[into] = body.mass;
            state.angular_frequencies[into] = body.angular_frequency;
            Some(removed)
        }
        CollisionVerdict::Bounce { i, j, vi, vj } => {
            state.velocities[i] = vi;
            state.velocities[j] = vj;
            None
        }
    }
}

/// Merges spheres that are gravitationally bound and rotate slowly enough to stay together.
///
/// A merger is accepted iff `|v_i - v_j|² · bounce_limit < 2G (m_i + m_j) / (h_i + h_j)` and
/// `|ω|² · rotation_limit < G (m_i + m_j) / h³`, where `ω` and `h` are the angular frequency
/// and radius of the merged body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergingHandler {
    pub bounce_limit: Float,
    pub rotation_limit: Float,
    pub gravity_constant: Float,
}

impl MergingHandler {
    pub fn new(bounce_limit: Float, rotation_limit: Float, gravity_constant: Float) -> Self {
        Self {
            bounce_limit,
            rotation_limit,
            gravity_constant,
        }
    }

    pub fn is_bound(&self, state: &SphereState, i: usize, j: usize) -> bool {
        let dv_sqr = (state.velocities[i] - state.velocities[j]).length_squared();
        let m = state.masses[i] + state.masses[j];
        let radii = state.positions[i].h() + state.positions[j].h();
        dv_sqr * self.bounce_limit < 2.0 * self.gravity_constant * m / radii
    }

    pub fn is_rotationally_stable(&self, body: &MergedBody) -> bool {
        let breakup = self.gravity_constant * body.mass / cube(body.position.h());
        body.angular_frequency.length_squared() * self.rotation_limit < breakup
    }
}

impl CollisionHandler for MergingHandler {
    fn collide(&self, state: &SphereState, i: usize, j: usize) -> CollisionVerdict {
        if !self.is_bound(state, i, j) {
            return CollisionVerdict::None;
        }
        let body = MergedBody::of(state, i, j);
        if !self.is_rotationally_stable(&body) {
            return CollisionVerdict::None;
        }
        CollisionVerdict::Merge {
            into: i,
            removed: j,
            body,
        }
    }
}

/// Merges every colliding pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerfectMergingHandler;

impl CollisionHandler for PerfectMergingHandler {
    fn collide(&self, state: &SphereState, i: usize, j: usize) -> CollisionVerdict {
        CollisionVerdict::Merge {
            into: i,
            removed: j,
            body: MergedBody::of(state, i, j),
        }
    }
}

/// Inelastic bounce with separate restitution of the normal and tangential velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElasticBounceHandler {
    pub normal_restitution: Float,
    pub tangent_restitution: Float,
}

impl ElasticBounceHandler {
    pub fn new(normal_restitution: Float, tangent_restitution: Float) -> Self {
        Self {
            normal_restitution,
            tangent_restitution,
        }
    }

    fn reflect(&self, u: Vector, n: &Vector) -> Vector {
        let un = *n * u.dot(n);
        let ut = u - un;
        un * -self.normal_restitution + ut * self.tangent_restitution
    }
}

impl Default for ElasticBounceHandler {
    fn default() -> Self {
        Self::new(0.5, 1.0)
    }
}

impl CollisionHandler for ElasticBounceHandler {
    fn collide(&self, state: &SphereState, i: usize, j: usize) -> CollisionVerdict {
        let d = (state.positions[j] - state.positions[i]).clear_h();
        if d.length_squared() == 0.0 {
            return CollisionVerdict::None;
        }
        let n = d.normalized();
        let (vi, vj) = (state.velocities[i].clear_h(), state.velocities[j].clear_h());
        if (vi - vj).dot(&n) <= 0.0 {
            // already separating
            return CollisionVerdict::None;
        }
        let (mi, mj) = (state.masses[i], state.masses[j]);
        let v_com = (vi * mi + vj * mj) / (mi + mj);
        CollisionVerdict::Bounce {
            i,
            j,
            vi: v_com + self.reflect(vi - v_com, &n),
            vj: v_com + self.reflect(vj - v_com, &n),
        }
    }
}
