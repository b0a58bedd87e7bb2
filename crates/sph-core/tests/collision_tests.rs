use approx::assert_relative_eq;
use sph_core::collision::{
    commit_verdict, CollisionHandler, CollisionVerdict, ElasticBounceHandler, MergedBody,
    MergingHandler, PerfectMergingHandler, SphereState,
};
use sph_core::Vector;

fn pair(vi: Vector, vj: Vector) -> SphereState {
    SphereState {
        positions: vec![
            Vector::with_h(0.0, 0.0, 0.0, 0.6),
            Vector::with_h(1.0, 0.0, 0.0, 0.6),
        ],
        velocities: vec![vi, vj],
        masses: vec![1.0, 1.0],
        angular_frequencies: vec![Vector::ZERO; 2],
    }
}

#[test]
fn test_bound_spheres_merge() {
    let mut state = pair(Vector::ZERO, Vector::ZERO);
    let handler = MergingHandler::new(1.0, 1.0, 1.0);
    let verdict = handler.collide(&state, 0, 1);
    let CollisionVerdict::Merge { into, removed, body } = verdict else {
        panic!("expected a merger, got {:?}", verdict);
    };
    assert_eq!((into, removed), (0, 1));
    assert_eq!(body.mass, 2.0);
    assert_eq!(body.position, Vector::new(0.5, 0.0, 0.0));
    assert_relative_eq!(body.position.h(), 0.432_f64.cbrt(), max_relative = 1e-12);
    assert_eq!(body.angular_frequency, Vector::ZERO);

    assert_eq!(commit_verdict(&mut state, &verdict), Some(1));
    assert_eq!(state.masses[0], 2.0);
    assert_eq!(state.positions[0].x(), 0.5);
}

#[test]
fn test_fast_spheres_do_not_merge() {
    let mut state = pair(Vector::new(10.0, 0.0, 0.0), Vector::ZERO);
    let handler = MergingHandler::new(1.0, 1.0, 1.0);
    assert!(!handler.is_bound(&state, 0, 1));
    let verdict = handler.collide(&state, 0, 1);
    assert_eq!(verdict, CollisionVerdict::None);
    let before = state.clone();
    assert_eq!(commit_verdict(&mut state, &verdict), None);
    assert_eq!(state, before);
}

#[test]
fn test_merger_conserves_angular_momentum() {
    let state = pair(Vector::new(0.0, 1.0, 0.0), Vector::new(0.0, -1.0, 0.0));
    let body = MergedBody::of(&state, 0, 1);
    assert_eq!(body.velocity, Vector::ZERO);
    let inertia = 0.4 * body.mass * body.position.h() * body.position.h();
    // orbital angular momentum about the center of mass is (0, 0, -1)
    assert_relative_eq!(body.angular_frequency.z() * inertia, -1.0, max_relative = 1e-12);
    assert_eq!(body.angular_frequency.x(), 0.0);

    // a strict rotation limit rejects the spinning body
    let handler = MergingHandler::new(0.0, 1e6, 1.0);
    assert!(handler.is_bound(&state, 0, 1));
    assert!(!handler.is_rotationally_stable(&body));
    assert_eq!(handler.collide(&state, 0, 1), CollisionVerdict::None);
}

#[test]
fn test_perfect_merging_ignores_velocities() {
    let state = pair(Vector::new(100.0, 0.0, 0.0), Vector::ZERO);
    match PerfectMergingHandler.collide(&state, 1, 0) {
        CollisionVerdict::Merge { into, removed, body } => {
            assert_eq!((into, removed), (1, 0));
            assert_eq!(body.velocity, Vector::new(50.0, 0.0, 0.0));
        }
        other => panic!("expected a merger, got {:?}", other),
    }
}

#[test]
fn test_elastic_bounce() {
    let mut state = pair(Vector::new(1.0, 0.0, 0.0), Vector::new(-1.0, 0.5, 0.0));
    let handler = ElasticBounceHandler::default();
    let verdict = handler.collide(&state, 0, 1);
    assert_eq!(commit_verdict(&mut state, &verdict), None);
    // normal component halved and reversed, tangential one kept
    assert_relative_eq!(state.velocities[0].x(), -0.5, max_relative = 1e-12);
    assert_relative_eq!(state.velocities[1].x(), 0.5, max_relative = 1e-12);
    assert_relative_eq!(state.velocities[0].y(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(state.velocities[1].y(), 0.5, max_relative = 1e-12);

    // now separating
    assert_eq!(handler.collide(&state, 0, 1), CollisionVerdict::None);
}
