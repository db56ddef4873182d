//! Label assignment and loss functions for anchor-free YOLO detectors.

mod common;
pub mod loss;
pub mod profiling;
