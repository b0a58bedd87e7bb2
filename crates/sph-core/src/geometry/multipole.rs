use glam::DVec3;

use crate::geometry::tensor::{SymmetricTensor, TracelessTensor};
use crate::geometry::vector::Vector;
use crate::math::Float;

/// Mass multipole expansion up to quadrupole order, taken about the center of mass.
///
/// The dipole vanishes by construction, so only the monopole (total mass) and the traceless
/// quadrupole `Q = Σ m (3 x ⊗ x - |x|² I)` are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Multipole {
    pub mass: Float,
    pub center: Vector,
    pub quadrupole: TracelessTensor,
}

impl Multipole {
    /// Expansion of a set of point masses.
    pub fn from_points(points: impl Iterator<Item = (Vector, Float)> + Clone) -> Self {
        let mut mass = 0.0;
        let mut weighted = DVec3::ZERO;
        for (r, m) in points.clone() {
            mass += m;
            weighted += r.xyz() * m;
        }
        if mass <= 0.0 {
            return Self::default();
        }
        let center = Vector::from(weighted / mass);
        let mut quadrupole = TracelessTensor::ZERO;
        for (r, m) in points {
            quadrupole += Self::point_quadrupole(&(r.clear_h() - center), m);
        }
        Self {
            mass,
            center,
            quadrupole,
        }
    }

    /// Combines two expansions, shifting both quadrupoles to the common center of mass.
    pub fn combine(&self, other: &Self) -> Self {
        let mass = self.mass + other.mass;
        if mass <= 0.0 {
            return Self::default();
        }
        let center = (self.center * self.mass + other.center * other.mass) / mass;
        let quadrupole = self.shifted_quadrupole(&center) + other.shifted_quadrupole(&center);
        Self {
            mass,
            center: center.clear_h(),
            quadrupole,
        }
    }

    fn shifted_quadrupole(&self, new_center: &Vector) -> TracelessTensor {
        if self.mass <= 0.0 {
            return TracelessTensor::ZERO;
        }
        self.quadrupole + Self::point_quadrupole(&(self.center - *new_center), self.mass)
    }

    fn point_quadrupole(d: &Vector, m: Float) -> TracelessTensor {
        let outer = SymmetricTensor::symmetric_outer(d, d) * 3.0;
        let iso = SymmetricTensor::IDENTITY * d.length_squared();
        (outer - iso).deviatoric() * m
    }

    /// Gravitational acceleration at `r` due to this expansion.
    pub fn acceleration(&self, r: &Vector, gravity_constant: Float) -> Vector {
        let d = r.clear_h() - self.center;
        let dist_sqr = d.length_squared();
        if dist_sqr == 0.0 || self.mass <= 0.0 {
            return Vector::ZERO;
        }
        let dist = dist_sqr.sqrt();
        let inv_r3 = 1.0 / (dist_sqr * dist);
        let inv_r5 = inv_r3 / dist_sqr;
        let inv_r7 = inv_r5 / dist_sqr;
        let qd = self.quadrupole.apply(&d);
        let dqd = qd.dot(&d);
        let monopole = d * (-self.mass * inv_r3);
        let quadrupole = qd * inv_r5 - d * (2.5 * dqd * inv_r7);
        (monopole + quadrupole) * gravity_constant
    }
}
