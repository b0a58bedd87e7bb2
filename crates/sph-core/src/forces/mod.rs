pub mod gravity;

pub use gravity::{
    add_gravity, attractor_gravity, create_gravity, BarnesHut, BruteForceGravity, Gravity,
    SphericalGravity,
};
