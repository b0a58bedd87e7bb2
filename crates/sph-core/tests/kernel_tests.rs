use approx::assert_relative_eq;
use sph_core::kernel::{CubicSpline, Gaussian, Kernel, KernelKind, LutKernel, SymmetrizedKernel, WendlandC2};
use sph_core::math::PI;
use sph_core::Vector;

fn kernels() -> Vec<(&'static str, Box<dyn Kernel>)> {
    vec![
        ("cubic spline", Box::new(CubicSpline)),
        ("wendland", Box::new(WendlandC2)),
        ("gaussian", Box::new(Gaussian)),
    ]
}

/// `4π ∫ w(q) q² dq` over the support, Simpson's rule.
fn integral(kernel: &dyn Kernel) -> f64 {
    let steps = 20_000;
    let dq = kernel.radius() / steps as f64;
    let f = |q: f64| 4.0 * PI * q * q * kernel.value_impl(q * q);
    let mut sum = f(0.0) + f(kernel.radius());
    for k in 1..steps {
        let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(k as f64 * dq);
    }
    sum * dq / 3.0
}

#[test]
fn test_kernels_are_normalized() {
    for (name, kernel) in kernels() {
        let total = integral(kernel.as_ref());
        assert!((total - 1.0).abs() < 1e-4, "{} integrates to {}", name, total);
    }
}

#[test]
fn test_gradient_is_derivative_of_value() {
    let eps = 1e-6;
    for (name, kernel) in kernels() {
        for k in 1..40 {
            let q = k as f64 * kernel.radius() / 41.0;
            let numeric = (kernel.value_impl(sqr(q + eps)) - kernel.value_impl(sqr(q - eps))) / (2.0 * eps);
            let analytic = kernel.grad_impl(q * q) * q;
            assert!(
                (numeric - analytic).abs() < 1e-5,
                "{} at q = {}: numeric {}, analytic {}",
                name,
                q,
                numeric,
                analytic
            );
        }
    }
}

fn sqr(x: f64) -> f64 {
    x * x
}

#[test]
fn test_compact_support() {
    for (name, kernel) in kernels() {
        let r = Vector::new(kernel.radius() * 0.5 + 1e-9, 0.0, 0.0);
        assert_eq!(kernel.value(&r, 0.5), 0.0, "{}", name);
        assert_eq!(kernel.grad(&r, 0.5), Vector::ZERO, "{}", name);
    }
}

#[test]
fn test_scaling_with_smoothing_length() {
    let kernel = CubicSpline;
    let r = Vector::new(0.3, 0.2, -0.1);
    let h = 0.7;
    assert_relative_eq!(
        kernel.value(&r, h),
        kernel.value(&(r * (1.0 / h)), 1.0) / (h * h * h),
        max_relative = 1e-12
    );
    // gradient points towards the center
    assert!(kernel.grad(&r, h).dot(&r) < 0.0);
}

#[test]
fn test_lookup_table_matches_exact() {
    for kind in [KernelKind::CubicSpline, KernelKind::WendlandC2, KernelKind::Gaussian] {
        let lut = LutKernel::from_kind(kind);
        let exact: Box<dyn Kernel> = match kind {
            KernelKind::CubicSpline => Box::new(CubicSpline),
            KernelKind::WendlandC2 => Box::new(WendlandC2),
            KernelKind::Gaussian => Box::new(Gaussian),
        };
        assert_eq!(lut.radius(), exact.radius());
        for k in 1..200 {
            let q_sqr = k as f64 * sqr(exact.radius()) / 201.0;
            assert!(
                (lut.value_impl(q_sqr) - exact.value_impl(q_sqr)).abs() < 1e-5,
                "{:?} value at q² = {}",
                kind,
                q_sqr
            );
            assert!(
                (lut.grad_impl(q_sqr) - exact.grad_impl(q_sqr)).abs() < 1e-3,
                "{:?} gradient at q² = {}",
                kind,
                q_sqr
            );
        }
    }
}

#[test]
fn test_symmetrized_kernel() {
    let kernel = SymmetrizedKernel::new(CubicSpline);
    let ri = Vector::with_h(0.0, 0.0, 0.0, 0.5);
    let rj = Vector::with_h(0.4, 0.3, 0.0, 1.0);
    assert_eq!(kernel.radius(&ri, &rj), 2.0);
    assert_relative_eq!(kernel.value(&ri, &rj), kernel.value(&rj, &ri));
    let gi = kernel.grad(&ri, &rj);
    let gj = kernel.grad(&rj, &ri);
    assert_relative_eq!(gi.x(), -gj.x(), epsilon = 1e-14);
    assert_relative_eq!(gi.y(), -gj.y(), epsilon = 1e-14);
    // the smaller kernel already vanishes, the larger one alone contributes
    let far = Vector::with_h(1.2, 0.0, 0.0, 1.0);
    assert_relative_eq!(
        kernel.value(&ri, &far),
        0.5 * CubicSpline.value(&(ri - far), 1.0),
        max_relative = 1e-12
    );
}
