mod common;

use std::collections::BTreeSet;

use proptest::prelude::*;
use sph_core::finders::IterateDirection;
#[cfg(feature = "parallel")]
use sph_core::scheduler::RayonScheduler;
use sph_core::{
    BruteForceFinder, FinderConfig, FinderFlags, KdTree, NeighborFinder, NeighborRecord,
    SequentialScheduler, UniformGridFinder, Vector,
};

fn finders(leaf_size: usize) -> Vec<(&'static str, Box<dyn NeighborFinder>)> {
    vec![
        (
            "kdtree",
            Box::new(KdTree::new(FinderConfig {
                leaf_size,
                ..FinderConfig::default()
            })),
        ),
        ("brute force", Box::new(BruteForceFinder::new())),
        ("uniform grid", Box::new(UniformGridFinder::new(0.3, 4093))),
    ]
}

fn points_strategy() -> impl Strategy<Value = Vec<Vector>> {
    prop::collection::vec(
        (0.0..2.0_f64, 0.0..2.0_f64, 0.0..2.0_f64, 0.05..0.3_f64),
        1..250,
    )
    .prop_map(|v| {
        v.into_iter()
            .map(|(x, y, z, h)| Vector::with_h(x, y, z, h))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_find_all_matches_brute_force(
        points in points_strategy(),
        radius in 0.01..1.0_f64,
        leaf_size in 1_usize..30,
    ) {
        let mut out = Vec::new();
        for (name, mut finder) in finders(leaf_size) {
            finder.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
            for i in 0..points.len() {
                finder.find_all(i, radius, &mut out);
                let mut expected = common::brute_force(&points, &points[i], radius);
                expected.retain(|&j| j != i);
                prop_assert_eq!(common::sorted_indices(&out), expected, "{} particle {}", name, i);
                for n in &out {
                    let d = (points[n.index] - points[i]).length_squared();
                    prop_assert!((n.distance_sqr - d).abs() <= 1e-6 * d.max(1e-12));
                }
            }
        }
    }

    #[test]
    fn test_lower_rank_pairs_are_complete(points in points_strategy(), radius in 0.01..1.0_f64) {
        for (name, mut finder) in finders(5) {
            finder.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
            let mut out = Vec::new();
            let mut pairs = vec![BTreeSet::new(); points.len()];
            for i in 0..points.len() {
                finder.find_lower_rank(i, radius, &mut out);
                for n in &out {
                    prop_assert!(finder.rank()[n.index] < finder.rank()[i]);
                    pairs[i].insert(n.index);
                    pairs[n.index].insert(i);
                }
            }
            for i in 0..points.len() {
                pairs[i].insert(i);
                finder.find_all_at(&points[i], radius, &mut out);
                let all: BTreeSet<usize> = out.iter().map(|n| n.index).collect();
                prop_assert_eq!(&pairs[i], &all, "{} particle {}", name, i);
            }
        }
    }
}

#[test]
fn test_hexagonal_packing_round_trip() {
    let (points, _) = common::hexagonal_sphere(1000, 1.0);
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    tree.sanity_check().unwrap();

    let mut out = Vec::new();
    for i in 0..points.len() {
        tree.find_all_at(&points[i], 0.7, &mut out);
        assert_eq!(
            common::sorted_indices(&out),
            common::brute_force(&points, &points[i], 0.7),
            "neighbors of particle {}",
            i
        );
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_build_matches_sequential() {
    let points = common::random_box(5000, 10.0, (0.1, 0.5), 7);
    let config = FinderConfig {
        leaf_size: 10,
        max_parallel_depth: 8,
    };
    let mut sequential = KdTree::new(config);
    sequential.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
    let mut parallel = KdTree::new(config);
    let scheduler = RayonScheduler::with_threads(4).unwrap();
    parallel.build(&scheduler, &points, FinderFlags::MAKE_RANK);

    parallel.sanity_check().unwrap();
    assert!(parallel == sequential, "trees built by different schedulers differ");

    let (mut a, mut b) = (Vec::new(), Vec::new());
    for i in (0..points.len()).step_by(37) {
        sequential.find_all(i, 0.8, &mut a);
        parallel.find_all(i, 0.8, &mut b);
        assert_eq!(common::sorted_indices(&a), common::sorted_indices(&b));
    }
}

#[test]
fn test_empty_build() {
    let mut out = vec![NeighborRecord {
        index: 3,
        distance_sqr: 1.0,
    }];
    for (name, mut finder) in finders(25) {
        finder.build(&SequentialScheduler, &[], FinderFlags::MAKE_RANK);
        let found = finder.find_all_at(&Vector::ZERO, 10.0, &mut out);
        assert_eq!(found, 0, "{} found neighbors in an empty set", name);
        assert!(out.is_empty());
    }
}

#[test]
fn test_single_distant_particle() {
    let points = [Vector::with_h(1e10, -1e10, 1e10, 1.0)];
    let mut tree = KdTree::new(FinderConfig::default());
    tree.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
    tree.sanity_check().unwrap();
    let mut out = Vec::new();
    assert_eq!(tree.find_all_at(&points[0], 1.0, &mut out), 1);
    assert_eq!(out[0].index, 0);
}

#[test]
fn test_coincident_particles() {
    let points = vec![Vector::with_h(0.5, 0.5, 0.5, 0.1); 100];
    let mut tree = KdTree::new(FinderConfig {
        leaf_size: 4,
        ..FinderConfig::default()
    });
    tree.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
    tree.sanity_check().unwrap();
    let mut out = Vec::new();
    assert_eq!(tree.find_all(17, 0.01, &mut out), 99);
}

#[test]
fn test_radius_is_exclusive() {
    let points = [Vector::new(0.0, 0.0, 0.0), Vector::new(1.0, 0.0, 0.0)];
    let mut out = Vec::new();
    for (name, mut finder) in finders(1) {
        finder.build(&SequentialScheduler, &points, FinderFlags::MAKE_RANK);
        assert_eq!(finder.find_all(0, 1.0, &mut out), 0, "{}", name);
        assert_eq!(finder.find_all(0, 1.0 + 1e-9, &mut out), 1, "{}", name);
    }
}

#[test]
fn test_bottom_up_visits_children_first() {
    let points = common::random_box(300, 1.0, (0.01, 0.02), 3);
    let mut tree = KdTree::new(FinderConfig {
        leaf_size: 8,
        ..FinderConfig::default()
    });
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    let mut visited = vec![false; tree.node_count()];
    let mut leaf_particles = 0;
    tree.iterate(IterateDirection::BottomUp, |index, node, left, right| {
        if let (Some(left), Some(right)) = (left, right) {
            assert!(visited[left] && visited[right], "node {} visited before children", index);
        } else {
            assert!(node.is_leaf());
            leaf_particles += tree.leaf_indices(index).len();
        }
        visited[index] = true;
    });
    assert_eq!(leaf_particles, points.len());
}

#[test]
fn test_top_down_visits_parents_first() {
    let points = common::random_box(300, 1.0, (0.01, 0.02), 5);
    let mut tree = KdTree::new(FinderConfig {
        leaf_size: 8,
        ..FinderConfig::default()
    });
    tree.build(&SequentialScheduler, &points, FinderFlags::SKIP_RANK);
    let mut visited = vec![false; tree.node_count()];
    let mut reached = vec![false; tree.node_count()];
    reached[0] = true;
    tree.iterate(IterateDirection::TopDown, |index, _, left, right| {
        assert!(reached[index], "node {} visited before its parent", index);
        if let (Some(left), Some(right)) = (left, right) {
            assert!(!visited[left] && !visited[right], "children of node {} visited first", index);
            reached[left] = true;
            reached[right] = true;
        }
        visited[index] = true;
    });
    assert!(visited.iter().all(|&v| v), "some nodes were not visited");
}
