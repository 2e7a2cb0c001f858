//! Placeholder predictions for agents the model had no slot for.

use ndarray::Array3;

use crate::export::{PredictionRecord, RecordOrigin};
use crate::sample::TrackId;

/// Synthesizes stationary, uniform-confidence records.
///
/// Every coordinate is zero (the agent stays at its anchor) and every
/// candidate gets the same logit, so after softmax each candidate has
/// probability exactly `1 / K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Imputer {
    num_candidates: usize,
    future_len: usize,
}

impl Imputer {
    pub fn new(num_candidates: usize, future_len: usize) -> Self {
        Self {
            num_candidates,
            future_len,
        }
    }

    /// Build the placeholder record for `track_id` at `timestamp`.
    pub fn impute(&self, timestamp: i64, track_id: TrackId) -> PredictionRecord {
        PredictionRecord {
            timestamp,
            track_id,
            coords: Array3::zeros((self.num_candidates, self.future_len, 2)),
            logits: vec![0.0; self.num_candidates],
            origin: RecordOrigin::Imputed,
        }
    }

    /// Placeholder records for every id in `missing`.
    pub fn impute_all(&self, timestamp: i64, missing: &[TrackId]) -> Vec<PredictionRecord> {
        missing.iter().map(|&id| self.impute(timestamp, id)).collect()
    }
}
