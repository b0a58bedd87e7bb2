mod common;

use sph_core::components::{
    find_components, find_storage_components, AllConnected, ComponentFlags, SameFlag,
};
use sph_core::{
    FinderConfig, FinderFlags, KdTree, NeighborFinder, QuantityId, SequentialScheduler, Vector,
};

fn two_spheres() -> Vec<Vector> {
    let mut points = common::uniform_sphere(100, Vector::ZERO, 1.0, 1.0, 1);
    points.extend(common::uniform_sphere(
        100,
        Vector::new(10.0, 0.0, 0.0),
        1.0,
        1.0,
        2,
    ));
    points
}

#[test]
fn test_separated_spheres() {
    let points = two_spheres();
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    let components = find_components(&tree, 2.0, &AllConnected);
    assert_eq!(components.count, 2);
    assert_eq!(components.sizes(), vec![100, 100]);
    assert!(components.indices[..100].iter().all(|&c| c == 0));
    assert_eq!(components.members(1), (100..200).collect::<Vec<_>>());
}

#[test]
fn test_flags_split_components() {
    let points = common::uniform_sphere(50, Vector::ZERO, 1.0, 1.0, 3);
    let flags: Vec<usize> = (0..points.len()).map(|i| i % 2).collect();
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    let components = find_components(&tree, 2.0, &SameFlag(&flags));
    assert_eq!(components.count, 2);
    assert_eq!(components.sizes(), vec![25, 25]);
}

#[test]
fn test_sort_by_mass() {
    let mut storage = common::body(two_spheres(), 1.0);
    storage.get_mut::<f64>(QuantityId::Mass).unwrap()[150] = 50.0;
    let components = find_storage_components(
        &SequentialScheduler,
        &storage,
        2.0,
        ComponentFlags::SORT_BY_MASS,
        1.0,
    )
    .unwrap();
    assert_eq!(components.count, 2);
    assert_eq!(components.indices[150], 0);
    assert_eq!(components.indices[0], 1);
}

#[test]
fn test_escape_velocity_connects_bound_particles() {
    let points = vec![
        Vector::with_h(0.0, 0.0, 0.0, 0.1),
        Vector::with_h(1.5, 0.0, 0.0, 0.1),
    ];
    let mut storage = common::body(points, 1.0);
    let scheduler = SequentialScheduler;

    let plain =
        find_storage_components(&scheduler, &storage, 2.0, ComponentFlags::empty(), 1.0).unwrap();
    assert_eq!(plain.count, 2);
    let bound =
        find_storage_components(&scheduler, &storage, 2.0, ComponentFlags::ESCAPE_VELOCITY, 1.0)
            .unwrap();
    assert_eq!(bound.count, 1);

    storage.dt_mut::<Vector>(QuantityId::Position).unwrap()[1] = Vector::new(10.0, 0.0, 0.0);
    let unbound =
        find_storage_components(&scheduler, &storage, 2.0, ComponentFlags::ESCAPE_VELOCITY, 1.0)
            .unwrap();
    assert_eq!(unbound.count, 2);
}
