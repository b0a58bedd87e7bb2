mod common;

use approx::assert_relative_eq;
use sph_core::{BoundingBox, Multipole, Vector};

fn cluster() -> Vec<(Vector, f64)> {
    common::random_box(200, 1.0, (0.01, 0.02), 8)
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let elongated = Vector::new(3.0 * r.x(), r.y(), r.z());
            (elongated - Vector::new(1.5, 0.5, 0.5), 1.0 + (i % 5) as f64)
        })
        .collect()
}

fn direct(points: &[(Vector, f64)], r: &Vector) -> Vector {
    points
        .iter()
        .map(|(p, m)| {
            let d = *p - *r;
            d * (*m / d.length().powi(3))
        })
        .sum()
}

#[test]
fn test_quadrupole_improves_far_field() {
    let points = cluster();
    let multipole = Multipole::from_points(points.iter().copied());
    let monopole = Multipole {
        quadrupole: Default::default(),
        ..multipole
    };
    for r in [
        Vector::new(8.0, 0.0, 0.0),
        Vector::new(-4.0, 6.0, 2.0),
        Vector::new(1.0, -1.0, -8.0),
    ] {
        let exact = direct(&points, &r);
        let error_q = (multipole.acceleration(&r, 1.0) - exact).length() / exact.length();
        let error_m = (monopole.acceleration(&r, 1.0) - exact).length() / exact.length();
        assert!(error_q < 5e-3, "quadrupole error {} at {:?}", error_q, r);
        assert!(error_q < 0.2 * error_m, "quadrupole {} vs monopole {}", error_q, error_m);
    }
}

#[test]
fn test_combined_expansion_equals_direct() {
    let points = cluster();
    let (a, b) = points.split_at(70);
    let combined = Multipole::from_points(a.iter().copied())
        .combine(&Multipole::from_points(b.iter().copied()));
    let direct = Multipole::from_points(points.iter().copied());

    assert_relative_eq!(combined.mass, direct.mass, max_relative = 1e-12);
    assert!((combined.center - direct.center).length() < 1e-12);
    let probe = Vector::new(0.3, -0.7, 1.1);
    let (qc, qd) = (combined.quadrupole.apply(&probe), direct.quadrupole.apply(&probe));
    assert!((qc - qd).length() < 1e-9 * qd.length().max(1.0));

    let with_empty = direct.combine(&Multipole::default());
    assert_eq!(with_empty.mass, direct.mass);
    assert!((with_empty.center - direct.center).length() < 1e-12);
}

#[test]
fn test_bounding_box() {
    let mut bbox = BoundingBox::default();
    assert!(bbox.is_empty());
    assert_eq!(bbox.size(), Vector::ZERO);
    bbox.extend(&Vector::with_h(1.0, -1.0, 0.0, 5.0));
    bbox.extend(&Vector::new(-2.0, 3.0, 0.5));
    assert!(!bbox.is_empty());
    assert_eq!(bbox.size(), Vector::new(3.0, 4.0, 0.5));
    // smoothing lengths do not widen the box
    assert_eq!(bbox.lower().h(), 0.0);
    assert!(bbox.contains(&Vector::new(1.0, 3.0, 0.5)));
    assert!(!bbox.contains(&Vector::new(1.1, 0.0, 0.0)));
    assert_eq!(bbox.distance_sqr(&Vector::new(3.0, 0.0, 0.0)), 4.0);

    let (left, right) = bbox.split(0, 0.0);
    assert_eq!(left.upper().x(), 0.0);
    assert_eq!(right.lower().x(), 0.0);
    assert!(bbox.contains_box(&left) && bbox.contains_box(&right));
}

#[test]
fn test_vector_smoothing_length_lane() {
    let a = Vector::with_h(3.0, 4.0, 0.0, 2.0);
    assert_eq!(a.length(), 5.0);
    assert_eq!(a, Vector::new(3.0, 4.0, 0.0));
    assert_eq!(a.normalized().h(), 0.0);
    assert_eq!((a * 2.0).x(), 6.0);
    assert_eq!(a.dot(&Vector::with_h(1.0, 1.0, 1.0, 100.0)), 7.0);
}
