//! Evaluation and training loops around a [`MotionModel`](crate::model::MotionModel).
//!
//! - `EvaluationDriver` - Sweep over batches, export every agent of interest
//! - `evaluate_and_export` - Configured sweep from samples to the predictions file
//! - `TrainingDriver` - Epoch loop with warmup + cosine schedule and checkpoints

mod eval;
mod train;

pub use eval::{evaluate_and_export, EvaluationDriver, EvaluationSettings};
pub use train::{EpochSummary, TrainingDriver, TrainingReport, TrainingSettings};
