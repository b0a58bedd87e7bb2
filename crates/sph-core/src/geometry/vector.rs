use std::ops::{
    Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

use bytemuck::{Pod, Zeroable};
use glam::{DVec3, DVec4};

use crate::math::Float;

/// Lane indices of [`Vector`].
pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;
/// Lane holding the smoothing length (or sphere radius after handoff).
pub const H: usize = 3;

/// Four-lane vector `(x, y, z, h)`.
///
/// Arithmetic acts on all four lanes, so adding two particle positions also adds their
/// smoothing lengths; geometric queries (`length`, `dot`, `cross`) and equality only look at
/// the first three lanes. Pure geometric vectors keep `h == 0`.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Vector(pub DVec4);

impl Vector {
    pub const ZERO: Self = Self(DVec4::ZERO);
    pub const X_AXIS: Self = Self(DVec4::new(1.0, 0.0, 0.0, 0.0));
    pub const Y_AXIS: Self = Self(DVec4::new(0.0, 1.0, 0.0, 0.0));
    pub const Z_AXIS: Self = Self(DVec4::new(0.0, 0.0, 1.0, 0.0));

    #[inline]
    pub const fn new(x: Float, y: Float, z: Float) -> Self {
        Self(DVec4::new(x, y, z, 0.0))
    }

    #[inline]
    pub const fn with_h(x: Float, y: Float, z: Float, h: Float) -> Self {
        Self(DVec4::new(x, y, z, h))
    }

    /// Spatial lanes set to `v`, `h` left at zero.
    #[inline]
    pub const fn splat3(v: Float) -> Self {
        Self(DVec4::new(v, v, v, 0.0))
    }

    #[inline]
    pub fn from_xyz(v: DVec3, h: Float) -> Self {
        Self(v.extend(h))
    }

    #[inline]
    pub fn x(&self) -> Float {
        self.0.x
    }

    #[inline]
    pub fn y(&self) -> Float {
        self.0.y
    }

    #[inline]
    pub fn z(&self) -> Float {
        self.0.z
    }

    #[inline]
    pub fn h(&self) -> Float {
        self.0.w
    }

    #[inline]
    pub fn set_h(&mut self, h: Float) {
        self.0.w = h;
    }

    /// Copy of the vector with the given smoothing length.
    #[inline]
    pub fn with_smoothing_length(mut self, h: Float) -> Self {
        self.0.w = h;
        self
    }

    /// Copy of the vector with the `h` lane zeroed.
    #[inline]
    pub fn clear_h(self) -> Self {
        self.with_smoothing_length(0.0)
    }

    #[inline]
    pub fn xyz(&self) -> DVec3 {
        self.0.truncate()
    }

    #[inline]
    pub fn dot(&self, other: &Self) -> Float {
        self.xyz().dot(other.xyz())
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::from_xyz(self.xyz().cross(other.xyz()), 0.0)
    }

    #[inline]
    pub fn length_squared(&self) -> Float {
        self.xyz().length_squared()
    }

    #[inline]
    pub fn length(&self) -> Float {
        self.xyz().length()
    }

    /// Unit vector in the direction of `self`; the `h` lane is cleared.
    #[inline]
    pub fn normalized(&self) -> Self {
        let len = self.length();
        debug_assert!(len > 0.0, "cannot normalize a zero vector");
        Self::from_xyz(self.xyz() / len, 0.0)
    }

    /// Component-wise minimum over all four lanes.
    #[inline]
    pub fn min(&self, other: &Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Component-wise maximum over all four lanes.
    #[inline]
    pub fn max(&self, other: &Self) -> Self {
        Self(self.0.max(other.0))
    }

    #[inline]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Component-wise product.
    #[inline]
    pub fn mul_elem(&self, other: &Self) -> Self {
        Self(self.0 * other.0)
    }

    /// Largest of the three spatial components.
    #[inline]
    pub fn max_element(&self) -> Float {
        self.xyz().max_element()
    }

    /// Sum of the three spatial components.
    #[inline]
    pub fn l1(&self) -> Float {
        self.x() + self.y() + self.z()
    }

    /// Index of the largest spatial component.
    #[inline]
    pub fn argmax(&self) -> usize {
        let mut idx = X;
        for dim in [Y, Z] {
            if self[dim] > self[idx] {
                idx = dim;
            }
        }
        idx
    }

    /// True if all four lanes are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.xyz() == other.xyz()
    }
}

impl From<DVec3> for Vector {
    fn from(v: DVec3) -> Self {
        Self::from_xyz(v, 0.0)
    }
}

impl From<Vector> for DVec3 {
    fn from(v: Vector) -> Self {
        v.xyz()
    }
}

impl Index<usize> for Vector {
    type Output = Float;

    #[inline]
    fn index(&self, idx: usize) -> &Float {
        &self.0[idx]
    }
}

impl IndexMut<usize> for Vector {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Float {
        &mut self.0[idx]
    }
}

impl Add for Vector {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Vector {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Vector {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<Float> for Vector {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Float) -> Self {
        Self(self.0 * rhs)
    }
}

impl Mul<Vector> for Float {
    type Output = Vector;

    #[inline]
    fn mul(self, rhs: Vector) -> Vector {
        Vector(rhs.0 * self)
    }
}

impl Div<Float> for Vector {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Float) -> Self {
        Self(self.0 / rhs)
    }
}

impl AddAssign for Vector {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Vector {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl MulAssign<Float> for Vector {
    #[inline]
    fn mul_assign(&mut self, rhs: Float) {
        self.0 *= rhs;
    }
}

impl DivAssign<Float> for Vector {
    #[inline]
    fn div_assign(&mut self, rhs: Float) {
        self.0 /= rhs;
    }
}

impl std::iter::Sum for Vector {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + v)
    }
}
