//! Record types flowing through the exporter.

use ndarray::Array3;

use crate::sample::TrackId;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOrigin {
    /// Converted from a matched model slot.
    Predicted,
    /// Stationary placeholder for an agent without a slot.
    Imputed,
}

/// An accumulated record, before confidence normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: i64,
    pub track_id: TrackId,
    /// Agent-relative offsets, `[K, T, 2]`.
    pub coords: Array3<f64>,
    /// Unnormalized confidence per candidate, `[K]`.
    pub logits: Vec<f64>,
    pub origin: RecordOrigin,
}

impl PredictionRecord {
    /// Sort and uniqueness key.
    pub fn key(&self) -> (i64, TrackId) {
        (self.timestamp, self.track_id)
    }
}

/// A finalized record as written to the interchange format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub timestamp: i64,
    pub track_id: TrackId,
    /// Agent-relative offsets, `[K, T, 2]`.
    pub coords: Array3<f64>,
    /// Probability per candidate, sums to 1.
    pub confidences: Vec<f64>,
}

impl ExportRecord {
    pub fn key(&self) -> (i64, TrackId) {
        (self.timestamp, self.track_id)
    }

    pub fn num_candidates(&self) -> usize {
        self.coords.dim().0
    }

    pub fn future_len(&self) -> usize {
        self.coords.dim().1
    }
}
