//! Label assignment and loss function building blocks.

mod assigner;
mod bce_with_logit_loss;
mod classification_loss;
mod config;
mod criterion;
mod cross_entropy;
mod dfl;
mod focal_loss;
mod misc;
mod process_group;
mod regression_loss;

pub use assigner::*;
pub use bce_with_logit_loss::*;
pub use classification_loss::*;
pub use config::*;
pub use criterion::*;
pub use cross_entropy::*;
pub use dfl::*;
pub use focal_loss::*;
pub use misc::*;
pub use process_group::*;
pub use regression_loss::*;
