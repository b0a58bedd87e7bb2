use crate::geometry::vector::{Vector, X, Z};
use crate::math::Float;

/// Axis-aligned bounding box over the spatial lanes of [`Vector`].
///
/// A default-constructed box is empty (lower > upper) and grows by [`BoundingBox::extend`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    lower: Vector,
    upper: Vector,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            lower: Vector::splat3(Float::INFINITY),
            upper: Vector::splat3(Float::NEG_INFINITY),
        }
    }
}

impl BoundingBox {
    pub fn new(lower: Vector, upper: Vector) -> Self {
        debug_assert!((X..=Z).all(|d| lower[d] <= upper[d]));
        Self {
            lower: lower.clear_h(),
            upper: upper.clear_h(),
        }
    }

    /// Smallest box containing all given points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector>) -> Self {
        let mut bbox = Self::default();
        for p in points {
            bbox.extend(p);
        }
        bbox
    }

    pub fn extend(&mut self, p: &Vector) {
        self.lower = self.lower.min(&p.clear_h());
        self.upper = self.upper.max(&p.clear_h());
    }

    pub fn is_empty(&self) -> bool {
        (X..=Z).any(|d| self.lower[d] > self.upper[d])
    }

    #[inline]
    pub fn lower(&self) -> &Vector {
        &self.lower
    }

    #[inline]
    pub fn upper(&self) -> &Vector {
        &self.upper
    }

    pub fn size(&self) -> Vector {
        if self.is_empty() {
            return Vector::ZERO;
        }
        self.upper - self.lower
    }

    pub fn center(&self) -> Vector {
        (self.lower + self.upper) * 0.5
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Vector) -> bool {
        (X..=Z).all(|d| p[d] >= self.lower[d] && p[d] <= self.upper[d])
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.is_empty() || (self.contains(&other.lower) && self.contains(&other.upper))
    }

    /// Splits the box by a plane perpendicular to `dim` at `position`.
    pub fn split(&self, dim: usize, position: Float) -> (BoundingBox, BoundingBox) {
        debug_assert!(dim <= Z);
        let mut left = *self;
        let mut right = *self;
        left.upper[dim] = position;
        right.lower[dim] = position;
        (left, right)
    }

    /// Per-axis squared distance of a point from the box (zero on axes where it is inside).
    pub fn axis_distance_sqr(&self, p: &Vector) -> Vector {
        let below = self.lower - *p;
        let above = *p - self.upper;
        let d = below.max(&above).max(&Vector::ZERO).clear_h();
        d.mul_elem(&d)
    }

    /// Squared Euclidean distance of a point from the box.
    pub fn distance_sqr(&self, p: &Vector) -> Float {
        self.axis_distance_sqr(p).l1()
    }
}
