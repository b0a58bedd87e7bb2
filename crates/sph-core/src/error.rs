use thiserror::Error;

use crate::quantity::{Order, QuantityId, ValueKind};

/// Schema and bookkeeping errors of the particle storage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("quantity {0:?} is already stored")]
    DuplicateQuantity(QuantityId),
    #[error("quantity {0:?} is not stored")]
    MissingQuantity(QuantityId),
    #[error("quantity {id:?} holds {actual:?} values, requested {expected:?}")]
    WrongType {
        id: QuantityId,
        expected: ValueKind,
        actual: ValueKind,
    },
    #[error("quantity {id:?} has order {actual:?}, requested derivative of order {requested:?}")]
    WrongOrder {
        id: QuantityId,
        requested: Order,
        actual: Order,
    },
    #[error("particle index {index} out of range for {count} particles")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("storages hold different quantities")]
    SchemaMismatch,
    #[error("buffer of {actual} values does not match {expected} particles")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("operation requires a non-empty storage")]
    EmptyStorage,
    #[error("material ranges do not partition the particles: {0}")]
    InvalidMaterialRange(String),
}

/// Failures of the k-d tree consistency check.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FinderError {
    #[error("leaf node {0} holds no particles")]
    EmptyLeaf(usize),
    #[error("particle {index} lies outside of the bounding box of node {node}")]
    PointOutsideBox { node: usize, index: usize },
    #[error("particle {0} is referenced by more than one leaf")]
    RepeatedIndex(usize),
    #[error("expected {expected} nodes, visited {actual}")]
    NodeCount { expected: usize, actual: usize },
    #[error("node {0} has an invalid child")]
    InvalidChild(usize),
}

/// Recoverable problems of the simulation state itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("non-finite value of {quantity:?} at particle {index}")]
    NonFinite { quantity: QuantityId, index: usize },
    #[error("cluster contains no particles")]
    EmptyCluster,
    #[error("equation of state failed: {0}")]
    Eos(String),
}

/// Lookup failures of the settings maps.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("setting {0} is not set")]
    Missing(String),
    #[error("setting {name} holds a {actual} value, requested {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Finder(#[from] FinderError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
