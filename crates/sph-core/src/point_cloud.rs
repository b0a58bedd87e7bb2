use std::collections::HashMap;

use crate::geometry::Vector;
use crate::math::{sqr, Float};

type Cell = (i64, i64, i64);

/// Location of a point inside a [`PointCloud`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointHandle {
    cell: Cell,
    index: usize,
}

/// Hash grid supporting incremental insertion.
///
/// Unlike the neighbor finders it never needs a rebuild, which makes it suitable for rejecting
/// overlapping proposals while a distribution is being generated.
#[derive(Clone, Debug)]
pub struct PointCloud {
    cell_size: Float,
    cells: HashMap<Cell, Vec<Vector>>,
    count: usize,
}

impl PointCloud {
    pub fn new(cell_size: Float) -> Self {
        debug_assert!(cell_size > 0.0);
        Self {
            cell_size,
            cells: HashMap::new(),
            count: 0,
        }
    }

    fn cell(&self, p: &Vector) -> Cell {
        (
            (p.x() / self.cell_size).floor() as i64,
            (p.y() / self.cell_size).floor() as i64,
            (p.z() / self.cell_size).floor() as i64,
        )
    }

    pub fn push(&mut self, p: Vector) -> PointHandle {
        let cell = self.cell(&p);
        let points = self.cells.entry(cell).or_default();
        points.push(p);
        self.count += 1;
        PointHandle {
            cell,
            index: points.len() - 1,
        }
    }

    pub fn push_all(&mut self, points: impl IntoIterator<Item = Vector>) {
        for p in points {
            self.push(p);
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn point(&self, handle: PointHandle) -> Option<&Vector> {
        self.cells.get(&handle.cell)?.get(handle.index)
    }

    /// All stored points, in no particular order.
    pub fn points(&self) -> Vec<Vector> {
        self.cells.values().flatten().copied().collect()
    }

    fn visit_close(&self, center: &Vector, radius: Float, mut f: impl FnMut(PointHandle)) {
        let reach = (radius / self.cell_size).ceil() as i64;
        let (x, y, z) = self.cell(center);
        let radius_sqr = sqr(radius);
        for cx in x - reach..=x + reach {
            for cy in y - reach..=y + reach {
                for cz in z - reach..=z + reach {
                    let Some(points) = self.cells.get(&(cx, cy, cz)) else {
                        continue;
                    };
                    for (index, p) in points.iter().enumerate() {
                        if (*p - *center).length_squared() < radius_sqr {
                            f(PointHandle {
                                cell: (cx, cy, cz),
                                index,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Handles of all points closer than `radius` to `center`; clears `out` first.
    pub fn find_close_points(&self, center: &Vector, radius: Float, out: &mut Vec<PointHandle>) -> usize {
        out.clear();
        self.visit_close(center, radius, |handle| out.push(handle));
        out.len()
    }

    pub fn close_points_count(&self, center: &Vector, radius: Float) -> usize {
        let mut count = 0;
        self.visit_close(center, radius, |_| count += 1);
        count
    }
}
