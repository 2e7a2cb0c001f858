//! YAML configuration.
//!
//! ```yaml
//! model:
//!   max_agents: 64
//!   num_candidates: 6
//!   future_len: 80
//!   history_len: 11
//! train:
//!   epochs: 30
//!   max_steps_per_epoch: 1000
//!   checkpoint_every: 5
//!   learning_rate: 0.001
//!   checkpoint_dir: checkpoints
//! eval:
//!   batch_size: 16
//!   duplicate_policy: keep_first
//!   output_path: predictions.csv
//!   prefetch: 2
//! ```
//!
//! Every field is optional and falls back to the values above.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::driver::{EvaluationSettings, TrainingSettings};
use crate::matching::DuplicatePolicy;
use crate::model::ModelShape;
use crate::{Error, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model: ModelShape,
    pub train: TrainConfig,
    pub eval: EvalConfig,
}

/// `train` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub epochs: usize,
    pub max_steps_per_epoch: usize,
    pub checkpoint_every: usize,
    pub learning_rate: f64,
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            max_steps_per_epoch: 1000,
            checkpoint_every: 5,
            learning_rate: 1e-3,
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

/// `eval` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub batch_size: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub output_path: PathBuf,
    /// Capacity of the prefetch channel, in batches.
    pub prefetch: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            duplicate_policy: DuplicatePolicy::KeepFirst,
            output_path: PathBuf::from("predictions.csv"),
            prefetch: 2,
        }
    }
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::IoError(std::io::Error::new(
                e.kind(),
                format!("failed to read config file {}: {}", path.display(), e),
            ))
        })?;
        let config = Self::from_yaml_str(&contents)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero counts and non-positive learning rates.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("model.max_agents", self.model.max_agents),
            ("model.num_candidates", self.model.num_candidates),
            ("model.future_len", self.model.future_len),
            ("model.history_len", self.model.history_len),
            ("train.epochs", self.train.epochs),
            ("train.max_steps_per_epoch", self.train.max_steps_per_epoch),
            ("train.checkpoint_every", self.train.checkpoint_every),
            ("eval.batch_size", self.eval.batch_size),
            ("eval.prefetch", self.eval.prefetch),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfig(format!("{} must be positive", name)));
        }

        let lr = self.train.learning_rate;
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "train.learning_rate must be positive, got {}",
                lr
            )));
        }
        Ok(())
    }

    pub fn eval_settings(&self) -> Result<EvaluationSettings> {
        self.validate()?;
        Ok(EvaluationSettings {
            shape: self.model,
            policy: self.eval.duplicate_policy,
        })
    }

    pub fn training_settings(&self) -> Result<TrainingSettings> {
        self.validate()?;
        Ok(TrainingSettings {
            shape: self.model,
            epochs: self.train.epochs,
            max_steps_per_epoch: self.train.max_steps_per_epoch,
            checkpoint_every: self.train.checkpoint_every,
            learning_rate: self.train.learning_rate,
            checkpoint_dir: self.train.checkpoint_dir.clone(),
        })
    }
}
