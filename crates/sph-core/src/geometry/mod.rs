pub mod bbox;
pub mod multipole;
pub mod tensor;
pub mod vector;

pub use bbox::BoundingBox;
pub use multipole::Multipole;
pub use tensor::{SymmetricTensor, TracelessTensor};
pub use vector::{Vector, H, X, Y, Z};
