pub mod brute_force;
pub mod kdtree;
pub mod uniform_grid;

pub use brute_force::BruteForceFinder;
pub use kdtree::{IterateDirection, KdNode, KdTree};
pub use uniform_grid::UniformGridFinder;

use crate::geometry::Vector;
use crate::math::Float;
use crate::scheduler::Scheduler;

/// Neighbor returned by a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRecord {
    pub index: usize,
    pub distance_sqr: Float,
}

bitflags::bitflags! {
    /// Options of [`NeighborFinder::build`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FinderFlags: u32 {
        /// Ranks particles by smoothing length, ties broken by index.
        const MAKE_RANK = 1;
        /// Uses the particle index as rank.
        const SKIP_RANK = 2;
    }
}

/// Radius search over a set of points.
///
/// All queries clear the output vector first and return the number of neighbors found; a
/// particle `j` is a neighbor if `|r_j - center|² < radius²`. The order of neighbors is
/// unspecified.
pub trait NeighborFinder: Send + Sync {
    /// Builds the search structure; the points are copied.
    fn build(&mut self, scheduler: &dyn Scheduler, points: &[Vector], flags: FinderFlags);

    /// Points of the last build.
    fn points(&self) -> &[Vector];

    /// Rank assigned to each particle by the last build.
    fn rank(&self) -> &[usize];

    /// Finds points within `radius` of `center` for which `accept(index)` holds.
    fn find_filtered(
        &self,
        center: &Vector,
        radius: Float,
        accept: &dyn Fn(usize) -> bool,
        out: &mut Vec<NeighborRecord>,
    ) -> usize;

    /// All points within `radius` of `center`.
    fn find_all_at(&self, center: &Vector, radius: Float, out: &mut Vec<NeighborRecord>) -> usize {
        self.find_filtered(center, radius, &|_| true, out)
    }

    /// All points within `radius` of particle `index`, excluding the particle itself.
    fn find_all(&self, index: usize, radius: Float, out: &mut Vec<NeighborRecord>) -> usize {
        let center = self.points()[index];
        self.find_filtered(&center, radius, &|j| j != index, out)
    }

    /// Neighbors of `index` with lower rank, so that every pair is found from one side only.
    fn find_lower_rank(&self, index: usize, radius: Float, out: &mut Vec<NeighborRecord>) -> usize {
        let center = self.points()[index];
        let rank = self.rank();
        let own = rank[index];
        self.find_filtered(&center, radius, &|j| rank[j] < own, out)
    }
}

/// Ranks of the particles according to the build flags.
pub(crate) fn make_rank(points: &[Vector], flags: FinderFlags) -> Vec<usize> {
    if flags.contains(FinderFlags::SKIP_RANK) || !flags.contains(FinderFlags::MAKE_RANK) {
        return (0..points.len()).collect();
    }
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| points[a].h().total_cmp(&points[b].h()).then(a.cmp(&b)));
    let mut rank = vec![0; points.len()];
    for (k, &i) in order.iter().enumerate() {
        rank[i] = k;
    }
    rank
}
