use crate::geometry::Vector;
use crate::math::{Float, PI};

/// Radial SPH kernel with compact support.
///
/// Implementations work with `q² = |r|² / h²`: `value_impl` returns the dimensionless profile
/// `w(q)` and `grad_impl` returns `w'(q) / q`, so that `W = w / h³` and
/// `∇W = r · grad_impl / h⁵`.
pub trait Kernel: Send + Sync {
    /// Support radius in units of the smoothing length.
    fn radius(&self) -> Float;

    fn value_impl(&self, q_sqr: Float) -> Float;

    fn grad_impl(&self, q_sqr: Float) -> Float;

    #[inline]
    fn value(&self, r: &Vector, h: Float) -> Float {
        let h_inv = 1.0 / h;
        self.value_impl(r.length_squared() * h_inv * h_inv) * h_inv * h_inv * h_inv
    }

    #[inline]
    fn grad(&self, r: &Vector, h: Float) -> Vector {
        let h_inv = 1.0 / h;
        let h_inv_sqr = h_inv * h_inv;
        r.clear_h() * (self.grad_impl(r.length_squared() * h_inv_sqr) * h_inv_sqr * h_inv_sqr * h_inv)
    }
}

/// Kernels that can be selected by configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelKind {
    /// M4 B-spline, support 2h.
    #[default]
    CubicSpline,
    /// Wendland C2, support 2h.
    WendlandC2,
    /// Gaussian truncated at 5h.
    Gaussian,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CubicSpline;

impl Kernel for CubicSpline {
    fn radius(&self) -> Float {
        2.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        let norm = 1.0 / PI;
        if q < 1.0 {
            norm * (1.0 - 1.5 * q_sqr + 0.75 * q_sqr * q)
        } else if q < 2.0 {
            norm * 0.25 * (2.0 - q).powi(3)
        } else {
            0.0
        }
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        let norm = 1.0 / PI;
        if q < 1.0 {
            norm * (-3.0 + 2.25 * q)
        } else if q < 2.0 {
            -norm * 0.75 * (2.0 - q).powi(2) / q
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WendlandC2;

impl Kernel for WendlandC2 {
    fn radius(&self) -> Float {
        2.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        21.0 / (16.0 * PI) * (1.0 - 0.5 * q).powi(4) * (2.0 * q + 1.0)
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        let q = q_sqr.sqrt();
        if q >= 2.0 {
            return 0.0;
        }
        -5.0 * 21.0 / (16.0 * PI) * (1.0 - 0.5 * q).powi(3)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Gaussian;

impl Kernel for Gaussian {
    fn radius(&self) -> Float {
        5.0
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= 25.0 {
            return 0.0;
        }
        PI.powf(-1.5) * (-q_sqr).exp()
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        if q_sqr >= 25.0 {
            return 0.0;
        }
        -2.0 * PI.powf(-1.5) * (-q_sqr).exp()
    }
}

const LUT_RESOLUTION: usize = 40_000;

/// Kernel tabulated on a uniform grid of `q²` and linearly interpolated.
#[derive(Clone, Debug)]
pub struct LutKernel {
    radius: Float,
    q_sqr_to_index: Float,
    values: Vec<Float>,
    grads: Vec<Float>,
}

impl LutKernel {
    pub fn new(kernel: &impl Kernel) -> Self {
        let radius = kernel.radius();
        let radius_sqr = radius * radius;
        let step = radius_sqr / (LUT_RESOLUTION - 1) as Float;
        let samples = |f: &dyn Fn(Float) -> Float| -> Vec<Float> {
            (0..LUT_RESOLUTION).map(|i| f(i as Float * step)).collect()
        };
        let values = samples(&|q| kernel.value_impl(q));
        // the cubic spline gradient has a finite limit at zero, sample it slightly off-center
        let grads = samples(&|q| kernel.grad_impl(q.max(0.5 * step)));
        Self {
            radius,
            q_sqr_to_index: 1.0 / step,
            values,
            grads,
        }
    }

    pub fn from_kind(kind: KernelKind) -> Self {
        match kind {
            KernelKind::CubicSpline => Self::new(&CubicSpline),
            KernelKind::WendlandC2 => Self::new(&WendlandC2),
            KernelKind::Gaussian => Self::new(&Gaussian),
        }
    }

    #[inline]
    fn interpolate(&self, table: &[Float], q_sqr: Float) -> Float {
        let x = q_sqr * self.q_sqr_to_index;
        let i = x as usize;
        if i + 1 >= table.len() {
            return 0.0;
        }
        let t = x - i as Float;
        table[i] * (1.0 - t) + table[i + 1] * t
    }
}

impl Kernel for LutKernel {
    fn radius(&self) -> Float {
        self.radius
    }

    fn value_impl(&self, q_sqr: Float) -> Float {
        self.interpolate(&self.values, q_sqr)
    }

    fn grad_impl(&self, q_sqr: Float) -> Float {
        self.interpolate(&self.grads, q_sqr)
    }
}

/// Kernel of a particle pair, averaged over the smoothing lengths of both particles.
#[derive(Clone, Debug)]
pub struct SymmetrizedKernel<K: Kernel> {
    kernel: K,
}

impl<K: Kernel> SymmetrizedKernel<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Support radius of the pair, `radius · max(h_i, h_j)`.
    pub fn radius(&self, ri: &Vector, rj: &Vector) -> Float {
        self.kernel.radius() * ri.h().max(rj.h())
    }

    pub fn value(&self, ri: &Vector, rj: &Vector) -> Float {
        let r = *ri - *rj;
        0.5 * (self.kernel.value(&r, ri.h()) + self.kernel.value(&r, rj.h()))
    }

    /// Gradient with respect to `r_i`.
    pub fn grad(&self, ri: &Vector, rj: &Vector) -> Vector {
        let r = *ri - *rj;
        (self.kernel.grad(&r, ri.h()) + self.kernel.grad(&r, rj.h())) * 0.5
    }
}
