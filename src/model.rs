//! Typed boundary between the pipeline and the external prediction model.
//!
//! The model is reached only through [`MotionModel`] (inference) and
//! [`TrainableModel`] (optimization and checkpoints). Requests and outputs
//! are plain `ndarray` tensors with fixed, validated shapes.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, Array3, Array4, Array5};
use serde::{Deserialize, Serialize};

use crate::internal::tensor::shape_string;
use crate::sample::Batch;
use crate::{Error, Result};

/// Fixed tensor dimensions shared by the model and the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelShape {
    /// Agent slots per sample (A).
    pub max_agents: usize,
    /// Candidate trajectories per slot (K).
    pub num_candidates: usize,
    /// Future timesteps per trajectory (T).
    pub future_len: usize,
    /// Historical timesteps per slot (H).
    pub history_len: usize,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            max_agents: 64,
            num_candidates: 6,
            future_len: 80,
            history_len: 11,
        }
    }
}

/// Model input for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    /// `[B]`
    pub timestamps: Array1<i64>,
    /// World-from-agent matrices, `[B, 3, 3]`.
    pub ego_transforms: Array3<f64>,
    /// `[B]`
    pub ego_yaws: Array1<f64>,
    /// Local-frame history positions, `[B, A, H, 2]`.
    pub agent_positions: Array4<f64>,
    /// `[B, A, H]`
    pub agent_yaws: Array3<f64>,
    /// `[B, A, H]`
    pub availability: Array3<bool>,
    /// Raw track ids, 0 for empty slots, `[B, A]`.
    pub track_ids: Array2<i64>,
}

impl ForwardRequest {
    /// Pack `batch` into tensors of the given shape.
    ///
    /// Every sample must have exactly `max_agents` slots, each with
    /// `history_len` timesteps.
    pub fn from_batch(batch: &Batch, shape: &ModelShape) -> Result<Self> {
        let b = batch.len();
        let a = shape.max_agents;
        let h = shape.history_len;

        let mut request = Self {
            timestamps: Array1::zeros(b),
            ego_transforms: Array3::zeros((b, 3, 3)),
            ego_yaws: Array1::zeros(b),
            agent_positions: Array4::zeros((b, a, h, 2)),
            agent_yaws: Array3::zeros((b, a, h)),
            availability: Array3::from_elem((b, a, h), false),
            track_ids: Array2::zeros((b, a)),
        };

        for (bi, sample) in batch.samples.iter().enumerate() {
            sample.validate()?;
            if sample.slots.len() != a {
                return Err(Error::ShapeMismatch {
                    name: format!("slots of sample at timestamp {}", sample.timestamp),
                    expected: a.to_string(),
                    got: sample.slots.len().to_string(),
                });
            }

            request.timestamps[bi] = sample.timestamp;
            request.ego_yaws[bi] = sample.ego_yaw;
            let matrix = sample.world_from_agent.matrix();
            for r in 0..3 {
                for c in 0..3 {
                    request.ego_transforms[[bi, r, c]] = matrix[(r, c)];
                }
            }

            for (ai, slot) in sample.slots.iter().enumerate() {
                if slot.history_len() != h {
                    return Err(Error::ShapeMismatch {
                        name: format!(
                            "history of slot {} in sample at timestamp {}",
                            ai, sample.timestamp
                        ),
                        expected: h.to_string(),
                        got: slot.history_len().to_string(),
                    });
                }

                request.track_ids[[bi, ai]] = slot.track_id.map_or(0, |id| id.raw());
                for ti in 0..h {
                    let [x, y] = slot.history_positions[ti];
                    request.agent_positions[[bi, ai, ti, 0]] = x;
                    request.agent_positions[[bi, ai, ti, 1]] = y;
                    request.agent_yaws[[bi, ai, ti]] = slot.history_yaws[ti];
                    request.availability[[bi, ai, ti]] = slot.history_availability[ti];
                }
            }
        }

        Ok(request)
    }

    pub fn batch_size(&self) -> usize {
        self.timestamps.len()
    }
}

/// Named scalar loss terms reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossTerms(BTreeMap<String, f64>);

impl LossTerms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Sum of all terms.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.0.values().all(|v| v.is_finite())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for LossTerms {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Model output for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOutput {
    /// Ego-frame positions, `[B, A, K, T, 2]`.
    pub positions: Array5<f64>,
    /// Ego-frame yaws, `[B, A, K, T, 1]`.
    pub yaws: Array5<f64>,
    /// Unnormalized candidate scores, `[B, A, K]`.
    pub logits: Array3<f64>,
    pub losses: LossTerms,
}

impl ForwardOutput {
    /// All-zero output of the expected shape.
    pub fn zeros(batch_size: usize, shape: &ModelShape) -> Self {
        let dims = (
            batch_size,
            shape.max_agents,
            shape.num_candidates,
            shape.future_len,
        );
        Self {
            positions: Array5::zeros((dims.0, dims.1, dims.2, dims.3, 2)),
            yaws: Array5::zeros((dims.0, dims.1, dims.2, dims.3, 1)),
            logits: Array3::zeros((dims.0, dims.1, dims.2)),
            losses: LossTerms::new(),
        }
    }

    /// Check tensor shapes against `batch_size` and `shape`, and that losses
    /// are finite.
    pub fn validate(&self, batch_size: usize, shape: &ModelShape) -> Result<()> {
        let (b, a, k, t) = (
            batch_size,
            shape.max_agents,
            shape.num_candidates,
            shape.future_len,
        );

        check_shape("positions", self.positions.shape(), &[b, a, k, t, 2])?;
        check_shape("yaws", self.yaws.shape(), &[b, a, k, t, 1])?;
        check_shape("logits", self.logits.shape(), &[b, a, k])?;

        if let Some((name, value)) = self.losses.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::ModelFailure(format!(
                "loss term '{}' is not finite ({})",
                name, value
            )));
        }
        Ok(())
    }
}

fn check_shape(name: &str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(Error::ShapeMismatch {
            name: name.to_string(),
            expected: shape_string(expected),
            got: shape_string(got),
        });
    }
    Ok(())
}

/// Inference side of the prediction model.
pub trait MotionModel {
    /// Predict trajectories for every slot of every sample in the request.
    fn forward(&mut self, request: &ForwardRequest) -> Result<ForwardOutput>;
}

/// A model that can also be optimized and checkpointed.
pub trait TrainableModel: MotionModel {
    /// Take one optimization step on `losses` with the given learning rate.
    fn optimize(&mut self, losses: &LossTerms, learning_rate: f64) -> Result<()>;

    /// Persist the model state to `path`.
    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}

impl<M: MotionModel + ?Sized> MotionModel for Box<M> {
    fn forward(&mut self, request: &ForwardRequest) -> Result<ForwardOutput> {
        (**self).forward(request)
    }
}
