//! # motion-eval-rs - Motion Prediction Evaluation Export
//!
//! Converts multi-agent, multi-modal trajectory predictions into the flat
//! per-(timestamp, track id) record set consumed by a motion prediction
//! benchmark's metrics stage.
//!
//! ## Features
//!
//! - 2D rigid transforms as 3x3 homogeneous matrices
//! - Ego-frame to agent-relative trajectory conversion
//! - Slot-to-ground-truth identity matching with an explicit duplicate policy
//! - Stationary imputation for agents the model had no slot for
//! - Append-only accumulation, softmax normalization and CSV export
//! - Evaluation and training drivers around an opaque model
//!
//! ## Example
//!
//! ```rust,ignore
//! use motion_eval_rs::{Config, EvaluationDriver};
//!
//! let config = Config::load("config.yaml")?;
//! let mut driver = EvaluationDriver::new(config.eval_settings()?, model);
//! let snapshot = driver.run(batches)?;
//! snapshot.write_csv_file("predictions.csv")?;
//! ```

// Internal helpers (tensor <-> point matrix conversions)
pub(crate) mod internal;

// Public modules
pub mod transform;
pub mod sample;
pub mod frames;
pub mod matching;
pub mod impute;
pub mod model;
pub mod pipeline;
pub mod export;
pub mod schedule;
pub mod loader;
pub mod driver;
pub mod config;
pub mod utils;

// Optional modules
#[cfg(feature = "python")]
pub mod python;

// Re-exports for convenience
pub use config::Config;
pub use driver::{evaluate_and_export, EvaluationDriver, EvaluationSettings, TrainingDriver, TrainingReport, TrainingSettings};
pub use export::{EvaluationAccumulator, ExportRecord, ExportSnapshot, PredictionRecord};
pub use matching::{match_sample, DuplicatePolicy, MatchResult};
pub use model::{ForwardOutput, ForwardRequest, LossTerms, ModelShape, MotionModel, TrainableModel};
pub use loader::PrefetchLoader;
pub use pipeline::{BatchExport, BatchExporter, BatchStats};
pub use schedule::WarmupCosineSchedule;
pub use sample::{AgentSlot, Batch, Pose, Sample, TrackId};
pub use transform::{transform_points, CoordinateTransformation, MaskedPoints, RigidTransform};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur in the evaluation export pipeline
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid input: {0}")]
        InvalidInput(String),

        #[error("Invalid shape for {name}: expected {expected}, got {got}")]
        ShapeMismatch {
            name: String,
            expected: String,
            got: String,
        },

        #[error("Coverage mismatch: expected {expected} records, got {actual}")]
        CoverageMismatch { expected: usize, actual: usize },

        #[error("Track id {track_id} occupies more than one slot in sample at timestamp {timestamp}")]
        DuplicateIdentity { timestamp: i64, track_id: i64 },

        #[error("Track id {track_id} is listed twice among the agents of interest at timestamp {timestamp}")]
        DuplicateInterest { timestamp: i64, track_id: i64 },

        #[error("Duplicate record for timestamp {timestamp}, track id {track_id}")]
        DuplicateRecord { timestamp: i64, track_id: i64 },

        #[error("Model failure: {0}")]
        ModelFailure(String),

        #[error("Data loader failure: {0}")]
        LoaderFailure(String),

        #[error("Malformed predictions file: {0}")]
        FormatError(String),

        #[error("Config parse error: {0}")]
        ConfigParse(#[from] serde_yaml::Error),

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Result type for evaluation export operations
    pub type Result<T> = std::result::Result<T, Error>;
}
