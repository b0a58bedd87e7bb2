use crate::finders::{make_rank, FinderFlags, NeighborFinder, NeighborRecord};
use crate::geometry::Vector;
use crate::math::{sqr, Float};
use crate::scheduler::Scheduler;

/// O(N) per query; reference for the other finders.
#[derive(Clone, Debug, Default)]
pub struct BruteForceFinder {
    points: Vec<Vector>,
    rank: Vec<usize>,
}

impl BruteForceFinder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NeighborFinder for BruteForceFinder {
    fn build(&mut self, _scheduler: &dyn Scheduler, points: &[Vector], flags: FinderFlags) {
        self.points = points.to_vec();
        self.rank = make_rank(points, flags);
    }

    fn points(&self) -> &[Vector] {
        &self.points
    }

    fn rank(&self) -> &[usize] {
        &self.rank
    }

    fn find_filtered(
        &self,
        center: &Vector,
        radius: Float,
        accept: &dyn Fn(usize) -> bool,
        out: &mut Vec<NeighborRecord>,
    ) -> usize {
        out.clear();
        let radius_sqr = sqr(radius);
        for (index, p) in self.points.iter().enumerate() {
            let distance_sqr = (*p - *center).length_squared();
            if distance_sqr < radius_sqr && accept(index) {
                out.push(NeighborRecord {
                    index,
                    distance_sqr,
                });
            }
        }
        out.len()
    }
}
