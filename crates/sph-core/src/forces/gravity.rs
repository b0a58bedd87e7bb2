use tracing::debug;

use crate::config::{FinderConfig, GravityKind};
use crate::error::Result;
use crate::finders::{FinderFlags, KdNode, KdTree, NeighborFinder, IterateDirection};
use crate::geometry::{Multipole, Vector};
use crate::math::{cube, sqr, Float, PI};
use crate::quantity::QuantityId;
use crate::scheduler::{parallel_for_each_mut, Scheduler};
use crate::storage::Storage;

/// Source of gravitational acceleration acting on particles.
pub trait Gravity: Send + Sync {
    /// Prepares the solver for the current particle positions.
    fn build(&mut self, scheduler: &dyn Scheduler, storage: &Storage) -> Result<()>;

    /// Acceleration at `r`; particle `skip` does not contribute.
    fn eval_at(&self, r: &Vector, skip: Option<usize>) -> Vector;
}

/// Adds the acceleration of `gravity` to the second derivative of positions.
pub fn add_gravity(
    scheduler: &dyn Scheduler,
    gravity: &dyn Gravity,
    storage: &mut Storage,
) -> Result<()> {
    let mut acc = vec![Vector::ZERO; storage.particle_count()];
    {
        let r = storage.get::<Vector>(QuantityId::Position)?;
        parallel_for_each_mut(scheduler, &mut acc, scheduler.recommended_granularity(), |i, a| {
            *a = gravity.eval_at(&r[i], Some(i));
        });
    }
    let dv = storage.d2t_mut::<Vector>(QuantityId::Position)?;
    for (d, a) in dv.iter_mut().zip(&acc) {
        *d += a.clear_h();
    }
    Ok(())
}

/// Creates the gravity solver selected by configuration.
pub fn create_gravity(
    kind: GravityKind,
    gravity_constant: Float,
    finder: FinderConfig,
) -> Option<Box<dyn Gravity>> {
    match kind {
        GravityKind::None => None,
        GravityKind::Spherical { density, radius } => {
            Some(Box::new(SphericalGravity::new(density, radius, gravity_constant)))
        }
        GravityKind::BruteForce => Some(Box::new(BruteForceGravity::new(gravity_constant))),
        GravityKind::BarnesHut { theta } => {
            Some(Box::new(BarnesHut::new(theta, gravity_constant, finder)))
        }
    }
}

/// Analytic field of a homogeneous sphere centered at the origin.
///
/// Inside the sphere the acceleration grows linearly with distance, `a = -4/3 π G ρ r`; outside
/// it is the field of a point mass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphericalGravity {
    pub density: Float,
    pub radius: Float,
    pub gravity_constant: Float,
}

impl SphericalGravity {
    pub fn new(density: Float, radius: Float, gravity_constant: Float) -> Self {
        Self {
            density,
            radius,
            gravity_constant,
        }
    }

    pub fn acceleration(&self, r: &Vector) -> Vector {
        let r = r.clear_h();
        let dist = r.length();
        if dist == 0.0 {
            return Vector::ZERO;
        }
        let enclosed = 4.0 / 3.0 * PI * self.density * cube(dist.min(self.radius));
        r * (-self.gravity_constant * enclosed / cube(dist))
    }
}

impl Gravity for SphericalGravity {
    fn build(&mut self, _scheduler: &dyn Scheduler, _storage: &Storage) -> Result<()> {
        Ok(())
    }

    fn eval_at(&self, r: &Vector, _skip: Option<usize>) -> Vector {
        self.acceleration(r)
    }
}

/// Plummer-softened acceleration at `r` due to mass `m` at `source`.
#[inline]
fn point_acceleration(r: &Vector, source: &Vector, m: Float, softening_sqr: Float, g: Float) -> Vector {
    let d = (*source - *r).clear_h();
    let dist_sqr = d.length_squared() + softening_sqr;
    if dist_sqr == 0.0 {
        return Vector::ZERO;
    }
    d * (g * m / (dist_sqr * dist_sqr.sqrt()))
}

/// Exact pairwise summation, O(N²).
#[derive(Clone, Debug, Default)]
pub struct BruteForceGravity {
    gravity_constant: Float,
    softening: Float,
    points: Vec<Vector>,
    masses: Vec<Float>,
}

impl BruteForceGravity {
    pub fn new(gravity_constant: Float) -> Self {
        Self {
            gravity_constant,
            ..Self::default()
        }
    }

    pub fn with_softening(mut self, softening: Float) -> Self {
        self.softening = softening;
        self
    }
}

impl Gravity for BruteForceGravity {
    fn build(&mut self, _scheduler: &dyn Scheduler, storage: &Storage) -> Result<()> {
        self.points = storage.get::<Vector>(QuantityId::Position)?.to_vec();
        self.masses = storage.get::<Float>(QuantityId::Mass)?.to_vec();
        Ok(())
    }

    fn eval_at(&self, r: &Vector, skip: Option<usize>) -> Vector {
        let eps = sqr(self.softening);
        self.points
            .iter()
            .zip(&self.masses)
            .enumerate()
            .filter(|(j, _)| Some(*j) != skip)
            .map(|(_, (p, m))| point_acceleration(r, p, *m, eps, self.gravity_constant))
            .sum()
    }
}

/// Barnes-Hut approximation on the k-d tree.
///
/// Each node carries the multipole expansion of its particles, computed bottom-up from the
/// leaves. A node is approximated by its expansion if it is seen under an angle smaller than
/// `theta`, otherwise its children are opened; leaves are summed directly.
#[derive(Clone, Debug)]
pub struct BarnesHut {
    theta: Float,
    gravity_constant: Float,
    softening: Float,
    tree: KdTree,
    multipoles: Vec<Multipole>,
    masses: Vec<Float>,
}

impl BarnesHut {
    pub fn new(theta: Float, gravity_constant: Float, finder: FinderConfig) -> Self {
        Self {
            theta,
            gravity_constant,
            softening: 0.0,
            tree: KdTree::new(finder),
            multipoles: Vec::new(),
            masses: Vec::new(),
        }
    }

    pub fn with_softening(mut self, softening: Float) -> Self {
        self.softening = softening;
        self
    }

    pub fn multipoles(&self) -> &[Multipole] {
        &self.multipoles
    }

    fn build_multipoles(&mut self) {
        let points = self.tree.points();
        let masses = &self.masses;
        let mut multipoles = vec![Multipole::default(); self.tree.node_count()];
        self.tree.iterate(IterateDirection::BottomUp, |index, _, left, right| {
            multipoles[index] = match (left, right) {
                (Some(left), Some(right)) => multipoles[left].combine(&multipoles[right]),
                _ => Multipole::from_points(
                    self.tree
                        .leaf_indices(index)
                        .iter()
                        .map(|&i| (points[i], masses[i])),
                ),
            };
        });
        self.multipoles = multipoles;
    }
}

impl Gravity for BarnesHut {
    fn build(&mut self, scheduler: &dyn Scheduler, storage: &Storage) -> Result<()> {
        let points = storage.get::<Vector>(QuantityId::Position)?;
        self.masses = storage.get::<Float>(QuantityId::Mass)?.to_vec();
        self.tree.build(scheduler, points, FinderFlags::SKIP_RANK);
        self.build_multipoles();
        debug!(
            nodes = self.tree.node_count(),
            theta = self.theta,
            "built multipoles for Barnes-Hut gravity"
        );
        Ok(())
    }

    fn eval_at(&self, r: &Vector, skip: Option<usize>) -> Vector {
        let nodes = self.tree.nodes();
        if nodes.is_empty() {
            return Vector::ZERO;
        }
        let points = self.tree.points();
        let eps = sqr(self.softening);
        let theta_sqr = sqr(self.theta);
        let mut acc = Vector::ZERO;
        let mut stack = vec![0_usize];
        while let Some(index) = stack.pop() {
            match &nodes[index] {
                KdNode::Leaf { .. } => {
                    for &j in self.tree.leaf_indices(index) {
                        if Some(j) != skip {
                            acc += point_acceleration(
                                r,
                                &points[j],
                                self.masses[j],
                                eps,
                                self.gravity_constant,
                            );
                        }
                    }
                }
                KdNode::Inner {
                    bbox, left, right, ..
                } => {
                    let multipole = &self.multipoles[index];
                    let size = bbox.size();
                    let extent = size.x().max(size.y()).max(size.z());
                    let dist_sqr = (*r - multipole.center).length_squared();
                    if !bbox.contains(r) && sqr(extent) < theta_sqr * dist_sqr {
                        acc += multipole.acceleration(r, self.gravity_constant);
                    } else {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }
        acc
    }
}

/// Mutual gravity of particles and attractors.
///
/// Adds the pull of every attractor to the particle accelerations and overwrites the
/// acceleration of each attractor with the pull of all particles and other attractors.
pub fn attractor_gravity(
    scheduler: &dyn Scheduler,
    storage: &mut Storage,
    gravity_constant: Float,
    softening: Float,
) -> Result<()> {
    if storage.attractors().is_empty() {
        return Ok(());
    }
    let eps = sqr(softening);
    let attractors = storage.attractors().to_vec();
    let r = storage.get::<Vector>(QuantityId::Position)?.to_vec();
    let m = storage.get::<Float>(QuantityId::Mass)?.to_vec();

    let mut acc = vec![Vector::ZERO; r.len()];
    parallel_for_each_mut(scheduler, &mut acc, scheduler.recommended_granularity(), |i, a| {
        *a = attractors
            .iter()
            .map(|att| point_acceleration(&r[i], &att.position, att.mass, eps, gravity_constant))
            .sum();
    });
    let dv = storage.d2t_mut::<Vector>(QuantityId::Position)?;
    for (d, a) in dv.iter_mut().zip(&acc) {
        *d += *a;
    }

    for (k, attractor) in storage.attractors_mut().iter_mut().enumerate() {
        let from_particles: Vector = r
            .iter()
            .zip(&m)
            .map(|(p, mass)| point_acceleration(&attractor.position, p, *mass, eps, gravity_constant))
            .sum();
        let from_attractors: Vector = attractors
            .iter()
            .enumerate()
            .filter(|(l, _)| *l != k)
            .map(|(_, other)| {
                point_acceleration(&attractor.position, &other.position, other.mass, eps, gravity_constant)
            })
            .sum();
        attractor.acceleration = from_particles + from_attractors;
    }
    Ok(())
}
