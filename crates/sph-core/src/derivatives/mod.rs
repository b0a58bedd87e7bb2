//! Per-pair SPH accumulators.
//!
//! Every interacting pair is found once, from the particle of higher rank, and each
//! [`PairDerivative`] adds the contribution of the pair to both particles. Accumulation runs in
//! parallel over chunks of pairs; every worker owns a full-size scratch accumulator and the
//! scratch values are summed once all pairs are processed, so no two threads ever write the same
//! slot.

pub mod equations;

pub use equations::{StressForce, VelocityDivergence, VelocityGradient};

use crate::error::{Result, StorageError};
use crate::finders::{NeighborFinder, NeighborRecord};
use crate::geometry::{TracelessTensor, Vector};
use crate::kernel::{Kernel, SymmetrizedKernel};
use crate::math::Float;
use crate::quantity::QuantityId;
use crate::scheduler::{parallel_for, Scheduler, ThreadLocal};
use crate::storage::Storage;

/// Interacting pair; `grad` is the symmetrized kernel gradient with respect to `r_i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pair {
    pub i: usize,
    pub j: usize,
    pub grad: Vector,
}

/// All pairs of particles within the kernel support, each listed once.
#[derive(Clone, Debug, Default)]
pub struct PairList {
    pairs: Vec<Pair>,
    particle_count: usize,
}

impl PairList {
    /// Collects pairs from lower-rank queries of a finder built with
    /// [`FinderFlags::MAKE_RANK`](crate::finders::FinderFlags::MAKE_RANK).
    ///
    /// With ranks ordered by smoothing length, the lower-rank neighbor never has the larger `h`,
    /// so a query with the support of particle `i` covers the support of the pair.
    pub fn build<K: Kernel>(
        scheduler: &dyn Scheduler,
        finder: &dyn NeighborFinder,
        kernel: &SymmetrizedKernel<K>,
    ) -> Self {
        let points = finder.points();
        let locals = ThreadLocal::new(scheduler, || (Vec::<NeighborRecord>::new(), Vec::<Pair>::new()));
        let granularity = scheduler.recommended_granularity();
        parallel_for(scheduler, 0, points.len(), granularity, |i| {
            locals.with(scheduler, |(neighbors, pairs)| {
                let radius = kernel.kernel().radius() * points[i].h();
                finder.find_lower_rank(i, radius, neighbors);
                for n in neighbors.iter() {
                    let grad = kernel.grad(&points[i], &points[n.index]);
                    pairs.push(Pair {
                        i,
                        j: n.index,
                        grad,
                    });
                }
            });
        });
        let mut pairs: Vec<Pair> = locals.into_values().flat_map(|(_, pairs)| pairs).collect();
        pairs.sort_unstable_by_key(|p| (p.i, p.j));
        Self {
            pairs,
            particle_count: points.len(),
        }
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }
}

/// Derivative accumulated symmetrically over particle pairs.
pub trait PairDerivative: Send + Sync {
    type Accumulator: Send;

    /// Zeroed accumulator covering all particles.
    fn accumulator(&self, particle_count: usize) -> Self::Accumulator;

    /// Adds the contribution of the pair to both particles.
    fn eval_pair(&self, pair: &Pair, acc: &mut Self::Accumulator);

    fn merge(&self, into: &mut Self::Accumulator, from: Self::Accumulator);

    /// Writes the accumulated values into the storage.
    fn store(&self, acc: Self::Accumulator, storage: &mut Storage) -> Result<()>;
}

/// Accumulates `derivative` over all pairs, using per-thread scratch accumulators.
pub fn accumulate<D: PairDerivative>(
    scheduler: &dyn Scheduler,
    pairs: &PairList,
    derivative: &D,
) -> D::Accumulator {
    let n = pairs.particle_count();
    let locals = ThreadLocal::new(scheduler, || derivative.accumulator(n));
    let list = pairs.pairs();
    scheduler.parallel_for_chunks(0, list.len(), scheduler.recommended_granularity(), &|from, to| {
        locals.with(scheduler, |acc| {
            for pair in &list[from..to] {
                derivative.eval_pair(pair, acc);
            }
        });
    });
    let mut values = locals.into_values();
    let mut total = values.next().unwrap_or_else(|| derivative.accumulator(n));
    for acc in values {
        derivative.merge(&mut total, acc);
    }
    total
}

/// Accumulates `derivative` and stores the result.
pub fn evaluate<D: PairDerivative>(
    scheduler: &dyn Scheduler,
    pairs: &PairList,
    derivative: &D,
    storage: &mut Storage,
) -> Result<()> {
    let acc = accumulate(scheduler, pairs, derivative);
    derivative.store(acc, storage)
}

/// Copy of the particle state read by the accumulators.
///
/// Derivatives borrow the snapshot while the storage stays free to receive the results.
#[derive(Clone, Debug, Default)]
pub struct ParticleSnapshot {
    pub positions: Vec<Vector>,
    pub velocities: Vec<Vector>,
    pub masses: Vec<Float>,
    pub densities: Option<Vec<Float>>,
    pub pressures: Option<Vec<Float>>,
    pub sound_speeds: Option<Vec<Float>>,
    pub stress: Option<Vec<TracelessTensor>>,
}

impl ParticleSnapshot {
    /// Requires positions of second order and masses; other quantities are taken if present.
    pub fn from_storage(storage: &Storage) -> Result<Self> {
        let optional = |id| storage.get::<Float>(id).ok().map(<[Float]>::to_vec);
        Ok(Self {
            positions: storage.get::<Vector>(QuantityId::Position)?.to_vec(),
            velocities: storage.dt::<Vector>(QuantityId::Position)?.to_vec(),
            masses: storage.get::<Float>(QuantityId::Mass)?.to_vec(),
            densities: optional(QuantityId::Density),
            pressures: optional(QuantityId::Pressure),
            sound_speeds: optional(QuantityId::SoundSpeed),
            stress: storage
                .get::<TracelessTensor>(QuantityId::DeviatoricStress)
                .ok()
                .map(<[TracelessTensor]>::to_vec),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub(crate) fn require<'a, T>(values: &'a Option<Vec<T>>, id: QuantityId) -> Result<&'a [T]> {
        values
            .as_deref()
            .ok_or_else(|| StorageError::MissingQuantity(id).into())
    }
}

pub(crate) fn add_slices<T: Copy + std::ops::AddAssign>(into: &mut [T], from: &[T]) {
    for (a, b) in into.iter_mut().zip(from) {
        *a += *b;
    }
}
