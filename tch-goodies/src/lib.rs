//! Tensor helpers for box geometry.

mod common;
pub mod box_ops;
pub mod compound_tensor;
pub mod tensor;
pub mod utils;

pub use box_ops::*;
pub use compound_tensor::*;
pub use tensor::*;
pub use utils::*;
