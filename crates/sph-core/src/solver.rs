use tracing::debug;

use crate::attractor::apply_interactions;
use crate::config::SolverConfig;
use crate::derivatives::{
    evaluate, PairList, ParticleSnapshot, StressForce, VelocityDivergence, VelocityGradient,
};
use crate::error::{DomainError, Result};
use crate::finders::{FinderFlags, KdTree, NeighborFinder};
use crate::forces::gravity::{add_gravity, attractor_gravity, create_gravity, Gravity};
use crate::geometry::Vector;
use crate::kernel::{LutKernel, SymmetrizedKernel};
use crate::math::Float;
use crate::quantity::{Order, QuantityId};
use crate::scheduler::Scheduler;
use crate::storage::Storage;

/// Evaluates the SPH equations with symmetric pair accumulation.
///
/// One call of [`SymmetricSolver::integrate`] fills the highest derivatives of the storage:
/// material `initialize` hooks run first, then the k-d tree is rebuilt, the pair accumulators
/// and gravity are added and finally the material `finalize` hooks run. The caller zeroes the
/// derivatives beforehand and advances the storage afterwards.
pub struct SymmetricSolver {
    config: SolverConfig,
    finder: KdTree,
    kernel: SymmetrizedKernel<LutKernel>,
    gravity: Option<Box<dyn Gravity>>,
}

impl SymmetricSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            finder: KdTree::new(config.finder),
            kernel: SymmetrizedKernel::new(LutKernel::from_kind(config.kernel)),
            gravity: create_gravity(config.gravity, config.gravity_constant, config.finder),
            config,
        }
    }

    /// Replaces the gravity solver selected by the configuration.
    pub fn with_gravity(mut self, gravity: Box<dyn Gravity>) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Finder of the last evaluation.
    pub fn finder(&self) -> &KdTree {
        &self.finder
    }

    /// Inserts the quantities filled by the solver.
    pub fn create(&self, storage: &mut Storage) -> Result<()> {
        storage.insert_or_raise(QuantityId::NeighborCount, Order::Zero, 0_usize)?;
        Ok(())
    }

    pub fn integrate(&mut self, scheduler: &dyn Scheduler, storage: &mut Storage) -> Result<()> {
        let materials = storage.materials().to_vec();
        for view in &materials {
            view.material.initialize(scheduler, storage, view.range)?;
        }

        self.finder.build(
            scheduler,
            storage.get::<Vector>(QuantityId::Position)?,
            FinderFlags::MAKE_RANK,
        );
        let pairs = PairList::build(scheduler, &self.finder, &self.kernel);
        let snapshot = ParticleSnapshot::from_storage(storage)?;
        if snapshot.densities.is_some() {
            evaluate(scheduler, &pairs, &VelocityDivergence::new(&snapshot)?, storage)?;
            evaluate(scheduler, &pairs, &VelocityGradient::new(&snapshot)?, storage)?;
        }
        if snapshot.pressures.is_some() {
            let force = StressForce::new(&snapshot, self.config.av_alpha, self.config.av_beta)?;
            evaluate(scheduler, &pairs, &force, storage)?;
        }
        if let Ok(counts) = storage.get_mut::<usize>(QuantityId::NeighborCount) {
            counts.fill(0);
            for pair in pairs.pairs() {
                counts[pair.i] += 1;
                counts[pair.j] += 1;
            }
        }
        debug!(
            particles = pairs.particle_count(),
            pairs = pairs.len(),
            "evaluated pair derivatives"
        );

        if let Some(gravity) = self.gravity.as_mut() {
            gravity.build(scheduler, storage)?;
            add_gravity(scheduler, &**gravity, storage)?;
        }
        attractor_gravity(scheduler, storage, self.config.gravity_constant, 0.0)?;

        for view in &materials {
            view.material.finalize(scheduler, storage, view.range)?;
        }
        Ok(())
    }
}

/// Explicit Euler time stepping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EulerExplicit {
    pub dt: Float,
}

impl EulerExplicit {
    pub fn new(dt: Float) -> Self {
        Self { dt }
    }

    /// Zeroes the highest derivatives, evaluates them and advances particles and attractors.
    ///
    /// Fails with [`DomainError::NonFinite`] before advancing when an evaluated derivative is not
    /// finite; positions and velocities are left unchanged in that case.
    pub fn step(
        &self,
        scheduler: &dyn Scheduler,
        solver: &mut SymmetricSolver,
        storage: &mut Storage,
    ) -> Result<()> {
        storage.zero_highest_derivatives();
        solver.integrate(scheduler, storage)?;
        if let Some((quantity, index)) = storage.first_non_finite_derivative() {
            return Err(DomainError::NonFinite { quantity, index }.into());
        }
        storage.advance(self.dt);
        for attractor in storage.attractors_mut() {
            attractor.advance(self.dt);
        }
        apply_interactions(storage)?;
        Ok(())
    }
}
