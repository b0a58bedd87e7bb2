/// Floating-point type used by every quantity in the crate.
pub type Float = f64;

pub const PI: Float = std::f64::consts::PI;

/// Physical constants in SI units.
pub mod constants {
    use super::Float;

    /// Gravitational constant [m^3 kg^-1 s^-2].
    pub const GRAVITY: Float = 6.674_08e-11;
}

/// Small value used to reject numerically coincident points.
pub const EPS: Float = 1.0e-12;

#[inline]
pub fn sqr(x: Float) -> Float {
    x * x
}

#[inline]
pub fn cube(x: Float) -> Float {
    x * x * x
}

/// Volume of a sphere with radius `r`.
#[inline]
pub fn sphere_volume(r: Float) -> Float {
    4.0 / 3.0 * PI * cube(r)
}

/// Closed interval `[lower, upper]`; an interval with `lower > upper` is empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    lower: Float,
    upper: Float,
}

impl Interval {
    pub const fn new(lower: Float, upper: Float) -> Self {
        Self { lower, upper }
    }

    pub const fn unbounded() -> Self {
        Self::new(Float::NEG_INFINITY, Float::INFINITY)
    }

    pub fn lower(&self) -> Float {
        self.lower
    }

    pub fn upper(&self) -> Float {
        self.upper
    }

    pub fn size(&self) -> Float {
        self.upper - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    pub fn contains(&self, x: Float) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Nearest value of the interval.
    pub fn clamp(&self, x: Float) -> Float {
        x.max(self.lower).min(self.upper)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::new(Float::INFINITY, Float::NEG_INFINITY)
    }
}
