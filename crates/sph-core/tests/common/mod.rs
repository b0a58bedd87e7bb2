#![allow(dead_code)]

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sph_core::materials::NullMaterial;
use sph_core::math::{Float, PI};
use sph_core::{NeighborRecord, Order, QuantityId, Storage, Vector};

/// Hexagonal close packing of roughly `n` points inside a sphere of radius `radius`.
///
/// Points carry `h = 0`; the lattice spacing is returned alongside.
pub fn hexagonal_sphere(n: usize, radius: Float) -> (Vec<Vector>, Float) {
    let a = (Float::sqrt(2.0) * 4.0 / 3.0 * PI * radius.powi(3) / n as Float).cbrt();
    let m = (radius / a).ceil() as i64 + 2;
    let mut points = Vec::new();
    for k in -2 * m..=2 * m {
        for j in -2 * m..=2 * m {
            for i in -2 * m..=2 * m {
                let x = (2 * i + (j + k).rem_euclid(2)) as Float * a / 2.0;
                let y = Float::sqrt(3.0) * (j as Float + k.rem_euclid(2) as Float / 3.0) * a / 2.0;
                let z = 2.0 * Float::sqrt(6.0) / 3.0 * k as Float * a / 2.0;
                if x * x + y * y + z * z < radius * radius {
                    points.push(Vector::new(x, y, z));
                }
            }
        }
    }
    (points, a)
}

/// `n` points uniformly distributed inside a sphere, all with smoothing length `h`.
pub fn uniform_sphere(n: usize, center: Vector, radius: Float, h: Float, seed: u64) -> Vec<Vector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(n);
    while points.len() < n {
        let p = Vector::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if p.length_squared() < 1.0 {
            points.push((center + p * radius).with_smoothing_length(h));
        }
    }
    points
}

/// Points uniformly distributed in a box, with random smoothing lengths in `h_range`.
pub fn random_box(n: usize, size: Float, h_range: (Float, Float), seed: u64) -> Vec<Vector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vector::with_h(
                rng.gen_range(0.0..size),
                rng.gen_range(0.0..size),
                rng.gen_range(0.0..size),
                rng.gen_range(h_range.0..h_range.1),
            )
        })
        .collect()
}

/// Indices of points strictly closer than `radius` to `center`, ascending.
pub fn brute_force(points: &[Vector], center: &Vector, radius: Float) -> Vec<usize> {
    (0..points.len())
        .filter(|&j| (points[j] - *center).length_squared() < radius * radius)
        .collect()
}

pub fn sorted_indices(records: &[NeighborRecord]) -> Vec<usize> {
    let mut indices: Vec<usize> = records.iter().map(|n| n.index).collect();
    indices.sort_unstable();
    indices
}

/// Storage of particles at rest with the given masses and a single null material.
pub fn body(points: Vec<Vector>, mass: Float) -> Storage {
    let mut storage = Storage::with_material(Arc::new(NullMaterial::default()));
    storage
        .insert_values(QuantityId::Position, Order::Second, points)
        .unwrap();
    storage.insert(QuantityId::Mass, Order::Zero, mass).unwrap();
    storage
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
