//! Core of a smoothed particle hydrodynamics and N-body engine for collisions of astrophysical
//! bodies: particle storage partitioned into materials, neighbor search, per-pair SPH
//! accumulators, gravity, and the handoff of smoothed particles to solid spheres.

pub mod attractor;
pub mod collision;
pub mod components;
pub mod config;
pub mod derivatives;
pub mod error;
pub mod finders;
pub mod forces;
pub mod geometry;
pub mod handoff;
pub mod kernel;
pub mod materials;
pub mod math;
pub mod point_cloud;
pub mod quantity;
pub mod records;
pub mod scheduler;
pub mod settings;
pub mod solver;
pub mod storage;

pub use attractor::{Attractor, AttractorInteraction};
pub use config::{FinderConfig, GravityKind, HandoffConfig, HandoffRadius, MergeConfig, SolverConfig};
pub use error::{DomainError, Error, FinderError, Result, SettingsError, StorageError};
pub use finders::{BruteForceFinder, FinderFlags, KdTree, NeighborFinder, NeighborRecord, UniformGridFinder};
pub use geometry::{BoundingBox, Multipole, SymmetricTensor, TracelessTensor, Vector};
pub use math::Float;
pub use quantity::{BufferFlags, Order, Quantity, QuantityId, ValueKind};
pub use scheduler::{default_scheduler, Scheduler, SequentialScheduler};
pub use storage::{IndexRange, IndicesFlags, MaterialView, Storage};
