//! Append-only accumulation of evaluation records across a sweep.

use tracing::{debug, info};

use super::{ExportRecord, ExportSnapshot, PredictionRecord, RecordOrigin};
use crate::internal::tensor::shape_string;
use crate::pipeline::BatchExport;
use crate::utils::{all_finite, softmax};
use crate::{Error, Result};

/// Accumulator for evaluation records.
///
/// Collects per-batch records during a sweep together with the size of the
/// ground-truth population they are meant to cover. `finalize` checks
/// coverage, normalizes confidences and freezes the result.
#[derive(Debug)]
pub struct EvaluationAccumulator {
    /// Number of candidate trajectories per record (K).
    num_candidates: usize,

    /// Number of future timesteps per trajectory (T).
    future_len: usize,

    /// Records in arrival order.
    records: Vec<PredictionRecord>,

    /// Expected population size (non-padding agents of interest seen so far).
    expected: usize,

    /// Duplicate-identity anomalies reported by the pipeline.
    duplicate_anomalies: usize,

    /// Number of batches appended.
    batches: usize,
}

impl EvaluationAccumulator {
    /// Create a new accumulator for K candidates of T timesteps.
    pub fn new(num_candidates: usize, future_len: usize) -> Self {
        Self {
            num_candidates,
            future_len,
            records: Vec::new(),
            expected: 0,
            duplicate_anomalies: 0,
            batches: 0,
        }
    }

    /// Append a single record.
    pub fn append(&mut self, record: PredictionRecord) -> Result<()> {
        let expected_dim = (self.num_candidates, self.future_len, 2);
        if record.coords.dim() != expected_dim {
            return Err(Error::ShapeMismatch {
                name: format!("coords of track {}", record.track_id),
                expected: shape_string(&[self.num_candidates, self.future_len, 2]),
                got: shape_string(record.coords.shape()),
            });
        }
        if record.logits.len() != self.num_candidates {
            return Err(Error::ShapeMismatch {
                name: format!("logits of track {}", record.track_id),
                expected: shape_string(&[self.num_candidates]),
                got: shape_string(&[record.logits.len()]),
            });
        }
        if !all_finite(&record.logits) || !all_finite(record.coords.iter()) {
            return Err(Error::InvalidInput(format!(
                "record for track {} at timestamp {} contains non-finite values",
                record.track_id, record.timestamp
            )));
        }

        self.records.push(record);
        Ok(())
    }

    /// Add `count` agents of interest to the expected population.
    pub fn expect(&mut self, count: usize) {
        self.expected += count;
    }

    /// Append everything one batch produced.
    pub fn extend(&mut self, batch: BatchExport) -> Result<()> {
        self.expect(batch.expected);
        self.duplicate_anomalies += batch.stats.duplicate_anomalies;
        for record in batch.records {
            self.append(record)?;
        }
        self.batches += 1;
        Ok(())
    }

    /// Absorb another accumulator with the same record shape.
    pub fn merge(&mut self, other: EvaluationAccumulator) -> Result<()> {
        if (other.num_candidates, other.future_len) != (self.num_candidates, self.future_len) {
            return Err(Error::ShapeMismatch {
                name: "merged accumulator".to_string(),
                expected: format!("K={}, T={}", self.num_candidates, self.future_len),
                got: format!("K={}, T={}", other.num_candidates, other.future_len),
            });
        }

        self.expected += other.expected;
        self.duplicate_anomalies += other.duplicate_anomalies;
        self.batches += other.batches;
        self.records.extend(other.records);
        Ok(())
    }

    /// Get all records in arrival order.
    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    /// Get the number of records accumulated.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the expected population size.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Count records by origin.
    pub fn count_origin(&self, origin: RecordOrigin) -> usize {
        self.records.iter().filter(|r| r.origin == origin).count()
    }

    pub fn num_predicted(&self) -> usize {
        self.count_origin(RecordOrigin::Predicted)
    }

    pub fn num_imputed(&self) -> usize {
        self.count_origin(RecordOrigin::Imputed)
    }

    pub fn num_duplicate_anomalies(&self) -> usize {
        self.duplicate_anomalies
    }

    pub fn num_batches(&self) -> usize {
        self.batches
    }

    /// Freeze the accumulated records into an export snapshot.
    ///
    /// Fails with `CoverageMismatch` when the record count differs from the
    /// expected population and with `DuplicateRecord` when a
    /// `(timestamp, track_id)` pair occurs twice. Confidences are the
    /// softmax of each record's logits; records are sorted by
    /// `(timestamp, track_id)`.
    pub fn finalize(mut self) -> Result<ExportSnapshot> {
        if self.records.len() != self.expected {
            return Err(Error::CoverageMismatch {
                expected: self.expected,
                actual: self.records.len(),
            });
        }

        self.records.sort_by(|a, b| a.key().cmp(&b.key()));
        if let Some(pair) = self
            .records
            .windows(2)
            .find(|pair| pair[0].key() == pair[1].key())
        {
            return Err(Error::DuplicateRecord {
                timestamp: pair[0].timestamp,
                track_id: pair[0].track_id.raw(),
            });
        }

        let predicted = self.num_predicted();
        let imputed = self.num_imputed();
        info!(
            records = self.records.len(),
            predicted,
            imputed,
            duplicate_anomalies = self.duplicate_anomalies,
            batches = self.batches,
            "Finalized evaluation records"
        );

        let records: Vec<ExportRecord> = self
            .records
            .into_iter()
            .map(|record| ExportRecord {
                timestamp: record.timestamp,
                track_id: record.track_id,
                confidences: softmax(&record.logits),
                coords: record.coords,
            })
            .collect();
        debug!(num_candidates = self.num_candidates, future_len = self.future_len, "Export snapshot frozen");

        Ok(ExportSnapshot::new(self.num_candidates, self.future_len, records))
    }
}
