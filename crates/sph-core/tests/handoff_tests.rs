mod common;

use std::cell::Cell;
use std::sync::Arc;

use approx::assert_relative_eq;
use sph_core::handoff::{
    flag_surface_particles, handoff, merge_overlapping_spheres, smoothed_to_solid_handoff,
};
use sph_core::materials::NullMaterial;
use sph_core::math::PI;
use sph_core::settings::{BodySettings, BodySettingsId};
use sph_core::{
    Attractor, Error, FinderConfig, FinderFlags, HandoffConfig, HandoffRadius, KdTree,
    MergeConfig, NeighborFinder, Order, QuantityId, SequentialScheduler, Storage, StorageError,
    Vector,
};

/// Smoothed particles of a unit sphere with unit density in hexagonal packing.
fn packed_sphere() -> Storage {
    let (points, a) = common::hexagonal_sphere(1000, 1.0);
    let n = points.len();
    let points = points
        .into_iter()
        .map(|r| r.with_smoothing_length(1.3 * a))
        .collect();
    let mut storage = common::body(points, 4.0 / 3.0 * PI / n as f64);
    storage
        .insert(QuantityId::Density, Order::First, 1.0)
        .unwrap();
    storage
}

fn merge_config() -> MergeConfig {
    MergeConfig {
        gravity_constant: 1.0,
        iterations: 3,
        ..MergeConfig::default()
    }
}

#[test]
fn test_equal_volume_radius() {
    let input = packed_sphere();
    let n = input.particle_count();
    let spheres = smoothed_to_solid_handoff(&input, &HandoffConfig::default()).unwrap();
    assert_eq!(spheres.particle_count(), n);
    assert_eq!(spheres.material_count(), 1);
    let r = spheres.get::<Vector>(QuantityId::Position).unwrap();
    // sphere volumes add up to the volume of the body
    for p in r {
        assert_relative_eq!(p.h(), (1.0 / n as f64).cbrt(), max_relative = 1e-12);
    }
    assert!(spheres.get::<f64>(QuantityId::Density).is_err());
    assert_relative_eq!(spheres.total_mass().unwrap(), 4.0 / 3.0 * PI, max_relative = 1e-12);
}

#[test]
fn test_equal_volume_requires_density() {
    let input = common::body(vec![Vector::with_h(0.0, 0.0, 0.0, 1.0)], 1.0);
    assert!(matches!(
        smoothed_to_solid_handoff(&input, &HandoffConfig::default()),
        Err(Error::Storage(StorageError::MissingQuantity(QuantityId::Density)))
    ));
}

#[test]
fn test_smoothing_length_radius_and_attractors() {
    let mut input = common::body(vec![Vector::with_h(1.0, 2.0, 3.0, 0.9)], 1.0);
    input.dt_mut::<Vector>(QuantityId::Position).unwrap()[0] = Vector::new(0.0, -1.0, 0.0);
    input.add_attractor(Attractor::new(Vector::ZERO, Vector::ZERO, 0.5, 10.0));
    let config = HandoffConfig {
        radius: HandoffRadius::SmoothingLength,
        ..HandoffConfig::default()
    };
    let spheres = smoothed_to_solid_handoff(&input, &config).unwrap();
    let r = spheres.get::<Vector>(QuantityId::Position).unwrap()[0];
    assert_eq!(r, Vector::new(1.0, 2.0, 3.0));
    assert_relative_eq!(r.h(), 0.3, max_relative = 1e-12);
    assert_eq!(
        spheres.dt::<Vector>(QuantityId::Position).unwrap()[0],
        Vector::new(0.0, -1.0, 0.0)
    );
    assert_eq!(spheres.attractors(), input.attractors());
}

#[test]
fn test_sublimated_particles_are_removed() {
    let mut params = BodySettings::empty();
    params.set(BodySettingsId::TillotsonSublimation, 10.0);
    let points: Vec<Vector> = (0..4)
        .map(|i| Vector::with_h(i as f64, 0.0, 0.0, 0.3))
        .collect();
    let mut hot = Storage::with_material(Arc::new(NullMaterial::new(params)));
    hot.insert_values(QuantityId::Position, Order::Second, points.clone())
        .unwrap();
    hot.insert(QuantityId::Mass, Order::Zero, 1.0).unwrap();
    hot.insert_values(QuantityId::Energy, Order::First, vec![5.0, 20.0, 5.0, 30.0])
        .unwrap();

    // a material without a sublimation limit keeps all of its particles
    let mut cold = common::body(points, 2.0);
    cold.insert(QuantityId::Energy, Order::First, 100.0).unwrap();
    let mut input = hot;
    input.merge(cold).unwrap();

    let config = HandoffConfig {
        radius: HandoffRadius::SmoothingLength,
        ..HandoffConfig::default()
    };
    let spheres = smoothed_to_solid_handoff(&input, &config).unwrap();
    assert_eq!(spheres.particle_count(), 6);
    assert_relative_eq!(spheres.total_mass().unwrap(), 10.0);
    let x: Vec<f64> = spheres
        .get::<Vector>(QuantityId::Position)
        .unwrap()
        .iter()
        .map(|r| r.x())
        .collect();
    assert_eq!(x, vec![0.0, 2.0, 0.0, 1.0, 2.0, 3.0]);

    let kept = smoothed_to_solid_handoff(
        &input,
        &HandoffConfig {
            remove_sublimated: false,
            ..config
        },
    )
    .unwrap();
    assert_eq!(kept.particle_count(), 8);
}

#[test]
fn test_surface_of_uniform_sphere() {
    let points = common::uniform_sphere(10_000, Vector::ZERO, 1.0, 0.2, 17);
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    let surface = flag_surface_particles(&SequentialScheduler, &tree, 0.4);

    let fraction = |select: &dyn Fn(f64) -> bool, flagged: bool| {
        let selected: Vec<usize> = (0..points.len())
            .filter(|&i| select(points[i].length()))
            .collect();
        assert!(!selected.is_empty());
        let count = selected.iter().filter(|&&i| surface[i] == flagged).count();
        count as f64 / selected.len() as f64
    };
    let outer = fraction(&|r| r > 0.9, true);
    let inner = fraction(&|r| r < 0.5, false);
    assert!(outer > 0.7, "only {} of the outer shell flagged", outer);
    assert!(inner > 0.95, "only {} of the interior unflagged", inner);
}

#[test]
fn test_isolated_sphere_is_not_surface() {
    let points = [Vector::with_h(0.0, 0.0, 0.0, 1.0)];
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    assert_eq!(flag_surface_particles(&SequentialScheduler, &tree, 0.4), vec![false]);
}

#[test]
fn test_merging_keeps_surface_and_mass() {
    common::init_logging();
    let input = packed_sphere();
    let n = input.particle_count();
    let (spheres, outcome) = handoff(
        &SequentialScheduler,
        &input,
        &HandoffConfig::default(),
        &merge_config(),
        || false,
    )
    .unwrap();

    assert!(!outcome.is_interrupted());
    let report = outcome.report();
    assert_eq!(report.iterations, 3);
    assert!(
        report.surface_count > n / 20 && report.surface_count < n / 4,
        "{} of {} spheres on the surface",
        report.surface_count,
        n
    );
    assert!(report.merged > 0);
    assert_eq!(spheres.particle_count(), n - report.merged);
    assert!(spheres.particle_count() >= report.surface_count);
    assert_relative_eq!(
        spheres.total_mass().unwrap(),
        input.total_mass().unwrap(),
        max_relative = 1e-12
    );
    assert!(spheres.get::<Vector>(QuantityId::AngularFrequency).is_ok());
    assert!(spheres.is_valid().is_ok());
}

#[test]
fn test_merging_conserves_volume() {
    let input = packed_sphere();
    let mut spheres = smoothed_to_solid_handoff(&input, &HandoffConfig::default()).unwrap();
    let volume = |s: &Storage| -> f64 {
        s.get::<Vector>(QuantityId::Position)
            .unwrap()
            .iter()
            .map(|r| r.h().powi(3))
            .sum()
    };
    let before = volume(&spheres);
    merge_overlapping_spheres(&SequentialScheduler, &mut spheres, &merge_config(), || false)
        .unwrap();
    assert_relative_eq!(volume(&spheres), before, max_relative = 1e-10);
}

#[test]
fn test_immediate_abort() {
    let input = packed_sphere();
    let mut spheres = smoothed_to_solid_handoff(&input, &HandoffConfig::default()).unwrap();
    let n = spheres.particle_count();
    let outcome =
        merge_overlapping_spheres(&SequentialScheduler, &mut spheres, &merge_config(), || true)
            .unwrap();
    assert!(outcome.is_interrupted());
    assert_eq!(outcome.report().iterations, 0);
    assert_eq!(outcome.report().merged, 0);
    assert!(outcome.report().surface_count > 0);
    assert_eq!(spheres.particle_count(), n);
}

#[test]
fn test_abort_keeps_finished_merges() {
    let input = packed_sphere();
    let mut spheres = smoothed_to_solid_handoff(&input, &HandoffConfig::default()).unwrap();
    let n = spheres.particle_count();
    let polls = Cell::new(0);
    let outcome = merge_overlapping_spheres(
        &SequentialScheduler,
        &mut spheres,
        &merge_config(),
        || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        },
    )
    .unwrap();
    assert!(outcome.is_interrupted());
    let report = outcome.report();
    assert!(report.iterations >= 1 && report.iterations < 3);
    assert!(report.merged > 0);
    assert_eq!(spheres.particle_count(), n - report.merged);
    assert!(spheres.is_valid().is_ok());
}

/// Pairs of spheres whose centers are closer than the sum of their radii.
fn overlapping_pairs(storage: &Storage) -> Vec<(usize, usize)> {
    let r = storage.get::<Vector>(QuantityId::Position).unwrap();
    let mut pairs = Vec::new();
    for i in 0..r.len() {
        for j in i + 1..r.len() {
            if (r[i] - r[j]).length() < r[i].h() + r[j].h() {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Merging without surface spheres; the weighted normal never exceeds one.
fn interior_merge_config(min_component_size: usize) -> MergeConfig {
    MergeConfig {
        surfaceness_threshold: 2.0,
        min_component_size,
        iterations: 2,
        gravity_constant: 1.0,
        ..MergeConfig::default()
    }
}

#[test]
fn test_bound_pair_merges_into_one_sphere() {
    let points = vec![
        Vector::with_h(0.0, 0.0, 0.0, 0.6),
        Vector::with_h(1.0, 0.0, 0.0, 0.6),
    ];
    let mut spheres = common::body(points, 1.0);
    assert_eq!(overlapping_pairs(&spheres), vec![(0, 1)]);
    let outcome = merge_overlapping_spheres(
        &SequentialScheduler,
        &mut spheres,
        &interior_merge_config(2),
        || false,
    )
    .unwrap();

    assert_eq!(outcome.report().surface_count, 0);
    assert_eq!(outcome.report().merged, 1);
    assert_eq!(spheres.particle_count(), 1);
    let r = spheres.get::<Vector>(QuantityId::Position).unwrap()[0];
    assert_eq!(r, Vector::new(0.5, 0.0, 0.0));
    assert_relative_eq!(r.h(), (2.0 * 0.216_f64).cbrt(), max_relative = 1e-12);
    assert_eq!(spheres.get::<f64>(QuantityId::Mass).unwrap(), &[2.0]);
    assert!(overlapping_pairs(&spheres).is_empty());
}

#[test]
fn test_unbound_pair_keeps_overlapping() {
    let points = vec![
        Vector::with_h(0.0, 0.0, 0.0, 0.6),
        Vector::with_h(1.0, 0.0, 0.0, 0.6),
    ];
    let mut spheres = common::body(points, 1.0);
    spheres.dt_mut::<Vector>(QuantityId::Position).unwrap()[0] = Vector::new(10.0, 0.0, 0.0);
    let outcome = merge_overlapping_spheres(
        &SequentialScheduler,
        &mut spheres,
        &interior_merge_config(2),
        || false,
    )
    .unwrap();

    assert_eq!(outcome.report().merged, 0);
    assert_eq!(spheres.particle_count(), 2);
    // rejected mergers are the only overlaps left behind
    assert_eq!(overlapping_pairs(&spheres), vec![(0, 1)]);
}

#[test]
fn test_bound_cluster_leaves_no_overlap() {
    let d = 0.6;
    let mut points = vec![Vector::with_h(0.0, 0.0, 0.0, 0.5)];
    for axis in [Vector::X_AXIS, Vector::Y_AXIS, Vector::Z_AXIS] {
        for sign in [1.0, -1.0] {
            points.push((axis * (sign * d)).with_smoothing_length(0.5));
        }
    }
    let mut spheres = common::body(points.clone(), 1.0);
    assert!(overlapping_pairs(&spheres).len() > 6);
    let outcome = merge_overlapping_spheres(
        &SequentialScheduler,
        &mut spheres,
        &interior_merge_config(4),
        || false,
    )
    .unwrap();

    assert!(!outcome.is_interrupted());
    assert_eq!(outcome.report().merged, 6);
    assert_eq!(spheres.particle_count(), 1);
    assert!(overlapping_pairs(&spheres).is_empty());

    let body = spheres.get::<Vector>(QuantityId::Position).unwrap()[0];
    assert!(body.length() < 1e-12, "merged body moved to {:?}", body);
    assert_relative_eq!(body.h(), 0.5 * 7.0_f64.cbrt(), max_relative = 1e-12);
    assert_relative_eq!(spheres.total_mass().unwrap(), 7.0);
    // the merged body covers the centers of all absorbed spheres
    for p in &points {
        assert!((*p - body).length() < body.h());
    }
}
