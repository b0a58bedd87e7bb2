use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use bytemuck::{Pod, Zeroable};
use glam::{DMat3, DVec3};

use crate::geometry::vector::Vector;
use crate::math::Float;

/// Symmetric 3x3 tensor stored as diagonal `(xx, yy, zz)` and off-diagonal `(xy, xz, yz)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SymmetricTensor {
    pub diag: DVec3,
    pub off: DVec3,
}

impl SymmetricTensor {
    pub const ZERO: Self = Self {
        diag: DVec3::ZERO,
        off: DVec3::ZERO,
    };

    pub const IDENTITY: Self = Self {
        diag: DVec3::ONE,
        off: DVec3::ZERO,
    };

    #[inline]
    pub const fn new(diag: DVec3, off: DVec3) -> Self {
        Self { diag, off }
    }

    /// Symmetric part of the outer product `a ⊗ b`.
    pub fn symmetric_outer(a: &Vector, b: &Vector) -> Self {
        let (a, b) = (a.xyz(), b.xyz());
        Self {
            diag: a * b,
            off: DVec3::new(
                0.5 * (a.x * b.y + a.y * b.x),
                0.5 * (a.x * b.z + a.z * b.x),
                0.5 * (a.y * b.z + a.z * b.y),
            ),
        }
    }

    #[inline]
    pub fn xx(&self) -> Float {
        self.diag.x
    }

    #[inline]
    pub fn yy(&self) -> Float {
        self.diag.y
    }

    #[inline]
    pub fn zz(&self) -> Float {
        self.diag.z
    }

    #[inline]
    pub fn xy(&self) -> Float {
        self.off.x
    }

    #[inline]
    pub fn xz(&self) -> Float {
        self.off.y
    }

    #[inline]
    pub fn yz(&self) -> Float {
        self.off.z
    }

    #[inline]
    pub fn trace(&self) -> Float {
        self.diag.x + self.diag.y + self.diag.z
    }

    pub fn to_mat3(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.xx(), self.xy(), self.xz()),
            DVec3::new(self.xy(), self.yy(), self.yz()),
            DVec3::new(self.xz(), self.yz(), self.zz()),
        )
    }

    /// Tensor applied to a vector; the `h` lane of the result is zero.
    pub fn apply(&self, v: &Vector) -> Vector {
        Vector::from(self.to_mat3() * v.xyz())
    }

    /// Deviatoric part `A - tr(A)/3 I`.
    pub fn deviatoric(&self) -> TracelessTensor {
        let iso = self.trace() / 3.0;
        TracelessTensor::new(
            self.xx() - iso,
            self.yy() - iso,
            self.xy(),
            self.xz(),
            self.yz(),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.diag.is_finite() && self.off.is_finite()
    }
}

impl Add for SymmetricTensor {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.diag + rhs.diag, self.off + rhs.off)
    }
}

impl Sub for SymmetricTensor {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.diag - rhs.diag, self.off - rhs.off)
    }
}

impl Neg for SymmetricTensor {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.diag, -self.off)
    }
}

impl Mul<Float> for SymmetricTensor {
    type Output = Self;

    fn mul(self, rhs: Float) -> Self {
        Self::new(self.diag * rhs, self.off * rhs)
    }
}

impl AddAssign for SymmetricTensor {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for SymmetricTensor {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// Symmetric tensor with zero trace; `zz` is implied as `-(xx + yy)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TracelessTensor {
    xx: Float,
    yy: Float,
    xy: Float,
    xz: Float,
    yz: Float,
}

impl TracelessTensor {
    pub const ZERO: Self = Self {
        xx: 0.0,
        yy: 0.0,
        xy: 0.0,
        xz: 0.0,
        yz: 0.0,
    };

    pub const fn new(xx: Float, yy: Float, xy: Float, xz: Float, yz: Float) -> Self {
        Self { xx, yy, xy, xz, yz }
    }

    #[inline]
    pub fn xx(&self) -> Float {
        self.xx
    }

    #[inline]
    pub fn yy(&self) -> Float {
        self.yy
    }

    #[inline]
    pub fn zz(&self) -> Float {
        -self.xx - self.yy
    }

    #[inline]
    pub fn xy(&self) -> Float {
        self.xy
    }

    #[inline]
    pub fn xz(&self) -> Float {
        self.xz
    }

    #[inline]
    pub fn yz(&self) -> Float {
        self.yz
    }

    pub fn to_symmetric(&self) -> SymmetricTensor {
        SymmetricTensor::new(
            DVec3::new(self.xx, self.yy, self.zz()),
            DVec3::new(self.xy, self.xz, self.yz),
        )
    }

    pub fn apply(&self, v: &Vector) -> Vector {
        self.to_symmetric().apply(v)
    }

    pub fn is_finite(&self) -> bool {
        [self.xx, self.yy, self.xy, self.xz, self.yz]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl From<TracelessTensor> for SymmetricTensor {
    fn from(t: TracelessTensor) -> Self {
        t.to_symmetric()
    }
}

impl Add for TracelessTensor {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.xx + rhs.xx,
            self.yy + rhs.yy,
            self.xy + rhs.xy,
            self.xz + rhs.xz,
            self.yz + rhs.yz,
        )
    }
}

impl Sub for TracelessTensor {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + rhs * -1.0
    }
}

impl Mul<Float> for TracelessTensor {
    type Output = Self;

    fn mul(self, rhs: Float) -> Self {
        Self::new(
            self.xx * rhs,
            self.yy * rhs,
            self.xy * rhs,
            self.xz * rhs,
            self.yz * rhs,
        )
    }
}

impl AddAssign for TracelessTensor {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
