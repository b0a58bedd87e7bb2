use crate::finders::{make_rank, FinderFlags, NeighborFinder, NeighborRecord};
use crate::geometry::Vector;
use crate::math::{sqr, Float};
use crate::scheduler::Scheduler;

/// Uniform spatial hash grid.
///
/// Built with a counting sort: count particles per cell -> prefix sum -> scatter. Queries visit
/// every cell overlapping the search sphere, so the radius may exceed the cell size.
#[derive(Clone, Debug)]
pub struct UniformGridFinder {
    inv_cell_size: Float,
    table_size: usize,
    points: Vec<Vector>,
    rank: Vec<usize>,
    /// `cell_start[hash]..cell_start[hash + 1]` are the entries of `sorted_indices` in that slot.
    cell_start: Vec<usize>,
    sorted_indices: Vec<usize>,
}

impl UniformGridFinder {
    /// `cell_size` should be close to the typical query radius.
    pub fn new(cell_size: Float, table_size: usize) -> Self {
        debug_assert!(cell_size > 0.0 && table_size > 0);
        Self {
            inv_cell_size: 1.0 / cell_size,
            table_size,
            points: Vec::new(),
            rank: Vec::new(),
            cell_start: vec![0; table_size + 1],
            sorted_indices: Vec::new(),
        }
    }

    #[inline]
    fn hash_cell(&self, cx: i64, cy: i64, cz: i64) -> usize {
        let h = (cx as u64).wrapping_mul(73_856_093)
            ^ (cy as u64).wrapping_mul(19_349_663)
            ^ (cz as u64).wrapping_mul(83_492_791);
        (h % self.table_size as u64) as usize
    }

    #[inline]
    fn cell_coords(&self, p: &Vector) -> (i64, i64, i64) {
        (
            (p.x() * self.inv_cell_size).floor() as i64,
            (p.y() * self.inv_cell_size).floor() as i64,
            (p.z() * self.inv_cell_size).floor() as i64,
        )
    }
}

impl NeighborFinder for UniformGridFinder {
    fn build(&mut self, _scheduler: &dyn Scheduler, points: &[Vector], flags: FinderFlags) {
        self.points = points.to_vec();
        self.rank = make_rank(points, flags);

        let hashes: Vec<usize> = points
            .iter()
            .map(|p| {
                let (cx, cy, cz) = self.cell_coords(p);
                self.hash_cell(cx, cy, cz)
            })
            .collect();
        let mut cell_count = vec![0_usize; self.table_size];
        for &h in &hashes {
            cell_count[h] += 1;
        }
        self.cell_start[0] = 0;
        for k in 0..self.table_size {
            self.cell_start[k + 1] = self.cell_start[k] + cell_count[k];
        }
        cell_count.fill(0);
        self.sorted_indices = vec![0; points.len()];
        for (i, &h) in hashes.iter().enumerate() {
            self.sorted_indices[self.cell_start[h] + cell_count[h]] = i;
            cell_count[h] += 1;
        }
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
        if self.points.is_empty() {
            return 0;
        }
        let radius_sqr = sqr(radius);
        let lower = self.cell_coords(&(*center - Vector::splat3(radius)));
        let upper = self.cell_coords(&(*center + Vector::splat3(radius)));
        // distinct cells may share a slot of the table
        let mut slots = Vec::new();
        for cx in lower.0..=upper.0 {
            for cy in lower.1..=upper.1 {
                for cz in lower.2..=upper.2 {
                    slots.push(self.hash_cell(cx, cy, cz));
                }
            }
        }
        slots.sort_unstable();
        slots.dedup();
        for h in slots {
            for &j in &self.sorted_indices[self.cell_start[h]..self.cell_start[h + 1]] {
                let distance_sqr = (self.points[j] - *center).length_squared();
                if distance_sqr < radius_sqr && accept(j) {
                    out.push(NeighborRecord {
                        index: j,
                        distance_sqr,
                    });
                }
            }
        }
        out.len()
    }
}
