//! Per-batch export: match, convert, impute.

use ndarray::Axis;
use tracing::{debug, warn};

use crate::export::{PredictionRecord, RecordOrigin};
use crate::frames::{slot_anchor, to_agent_relative};
use crate::impute::Imputer;
use crate::matching::{match_sample, DuplicatePolicy};
use crate::model::{ForwardOutput, ModelShape};
use crate::sample::{Batch, Sample};
use crate::utils::warn_once;
use crate::{Error, Result};

/// Counters for one exported batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub samples: usize,
    pub predicted: usize,
    pub imputed: usize,
    /// Duplicate track ids tolerated under `DuplicatePolicy::KeepFirst`.
    pub duplicate_anomalies: usize,
    /// Selected slots without an available anchor (imputed instead).
    pub unanchored: usize,
}

impl BatchStats {
    pub fn add(&mut self, other: &BatchStats) {
        self.samples += other.samples;
        self.predicted += other.predicted;
        self.imputed += other.imputed;
        self.duplicate_anomalies += other.duplicate_anomalies;
        self.unanchored += other.unanchored;
    }
}

/// Records produced from one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchExport {
    pub records: Vec<PredictionRecord>,
    /// Agents of interest in the batch; equals `records.len()` on success.
    pub expected: usize,
    pub stats: BatchStats,
}

/// Turns one batch of model output into export records.
#[derive(Debug, Clone)]
pub struct BatchExporter {
    shape: ModelShape,
    policy: DuplicatePolicy,
    imputer: Imputer,
}

impl BatchExporter {
    pub fn new(shape: ModelShape, policy: DuplicatePolicy) -> Self {
        Self {
            shape,
            policy,
            imputer: Imputer::new(shape.num_candidates, shape.future_len),
        }
    }

    pub fn shape(&self) -> &ModelShape {
        &self.shape
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Export every agent of interest in `batch`.
    ///
    /// Selected slots contribute their predictions re-expressed relative to
    /// their anchor; agents of interest without a slot are imputed.
    pub fn export(&self, batch: &Batch, output: &ForwardOutput) -> Result<BatchExport> {
        output.validate(batch.len(), &self.shape)?;

        let mut export = BatchExport::default();
        for (bi, sample) in batch.samples.iter().enumerate() {
            self.export_sample(bi, sample, output, &mut export)?;
        }

        debug!(
            samples = export.stats.samples,
            predicted = export.stats.predicted,
            imputed = export.stats.imputed,
            duplicate_anomalies = export.stats.duplicate_anomalies,
            "Exported batch"
        );
        Ok(export)
    }

    fn export_sample(
        &self,
        bi: usize,
        sample: &Sample,
        output: &ForwardOutput,
        export: &mut BatchExport,
    ) -> Result<()> {
        if sample.slots.len() != self.shape.max_agents {
            return Err(Error::ShapeMismatch {
                name: format!("slots of sample at timestamp {}", sample.timestamp),
                expected: self.shape.max_agents.to_string(),
                got: sample.slots.len().to_string(),
            });
        }

        let slot_ids = sample.slot_ids();
        let matched = match_sample(sample.timestamp, &slot_ids, &sample.agents_of_interest, self.policy)?;
        for id in &matched.duplicates {
            warn!(
                timestamp = sample.timestamp,
                track_id = id.raw(),
                "Track id occupies more than one slot, keeping the first"
            );
        }

        let positions = output.positions.index_axis(Axis(0), bi);
        let yaws = output.yaws.index_axis(Axis(0), bi);
        let logits = output.logits.index_axis(Axis(0), bi);

        for i in matched.selected_slots() {
            let Some(track_id) = slot_ids[i] else { continue };

            match slot_anchor(sample, i)? {
                Some(anchor) => {
                    let converted = to_agent_relative(
                        sample,
                        &anchor,
                        positions.index_axis(Axis(0), i),
                        yaws.index_axis(Axis(0), i),
                    )?;
                    export.records.push(PredictionRecord {
                        timestamp: sample.timestamp,
                        track_id,
                        coords: converted.coords,
                        logits: logits.index_axis(Axis(0), i).to_vec(),
                        origin: RecordOrigin::Predicted,
                    });
                    export.stats.predicted += 1;
                }
                None => {
                    warn_once("selected slot has no available anchor; imputing its agent");
                    debug!(timestamp = sample.timestamp, track_id = track_id.raw(), "Unanchored slot imputed");
                    export.records.push(self.imputer.impute(sample.timestamp, track_id));
                    export.stats.unanchored += 1;
                    export.stats.imputed += 1;
                }
            }
        }

        let missing = matched.missing_ids(&sample.agents_of_interest);
        export.stats.imputed += missing.len();
        export
            .records
            .extend(self.imputer.impute_all(sample.timestamp, &missing));

        export.expected += sample.interest_count();
        export.stats.duplicate_anomalies += matched.duplicates.len();
        export.stats.samples += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{AgentSlot, Pose, TrackId};
    use approx::assert_relative_eq;
    use ndarray::s;
    use std::f64::consts::FRAC_PI_2;

    fn id(raw: i64) -> TrackId {
        TrackId::from_raw(raw).unwrap()
    }

    fn shape(max_agents: usize) -> ModelShape {
        ModelShape {
            max_agents,
            num_candidates: 2,
            future_len: 3,
            history_len: 1,
        }
    }

    fn slot(raw: i64, position: [f64; 2]) -> AgentSlot {
        match TrackId::from_raw(raw) {
            Some(track) => AgentSlot::anchored(track, Pose::new(position, 0.0)),
            None => AgentSlot::empty(1),
        }
    }

    fn sample(timestamp: i64, slots: Vec<AgentSlot>, interest: &[i64]) -> Sample {
        Sample::new(
            timestamp,
            Pose::new([10.0, 0.0], FRAC_PI_2),
            slots,
            interest.iter().map(|&r| TrackId::from_raw(r)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_selected_and_missing_scenario() {
        let batch = Batch::new(vec![sample(
            50,
            vec![slot(5, [0.0, 0.0]), slot(0, [0.0, 0.0]), slot(7, [1.0, 0.0])],
            &[7, 9],
        )]);
        let exporter = BatchExporter::new(shape(3), DuplicatePolicy::KeepFirst);
        let mut output = ForwardOutput::zeros(1, exporter.shape());
        // Slot 2 predicts (2, 0) in the ego frame for every point
        output.positions.slice_mut(s![0, 2, .., .., 0]).fill(2.0);

        let export = exporter.export(&batch, &output).unwrap();
        assert_eq!(export.expected, 2);
        assert_eq!(export.records.len(), 2);
        assert_eq!(export.stats.predicted, 1);
        assert_eq!(export.stats.imputed, 1);

        let predicted = &export.records[0];
        assert_eq!(predicted.track_id, id(7));
        assert_eq!(predicted.origin, RecordOrigin::Predicted);
        for v in predicted.coords.index_axis(Axis(2), 0).iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
        for v in predicted.coords.index_axis(Axis(2), 1).iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-12);
        }

        let imputed = &export.records[1];
        assert_eq!(imputed.track_id, id(9));
        assert_eq!(imputed.origin, RecordOrigin::Imputed);
    }

    #[test]
    fn test_unanchored_selected_slot_is_imputed() {
        let mut unanchored = AgentSlot::empty(1);
        unanchored.track_id = Some(id(3));
        let batch = Batch::new(vec![sample(1, vec![unanchored], &[3])]);
        let exporter = BatchExporter::new(shape(1), DuplicatePolicy::KeepFirst);

        let export = exporter
            .export(&batch, &ForwardOutput::zeros(1, exporter.shape()))
            .unwrap();
        assert_eq!(export.records.len(), 1);
        assert_eq!(export.records[0].origin, RecordOrigin::Imputed);
        assert_eq!(export.stats.unanchored, 1);
        assert_eq!(export.expected, 1);
    }

    #[test]
    fn test_duplicates_counted_under_keep_first() {
        let batch = Batch::new(vec![sample(
            1,
            vec![slot(4, [0.0, 0.0]), slot(4, [1.0, 1.0])],
            &[4],
        )]);
        let exporter = BatchExporter::new(shape(2), DuplicatePolicy::KeepFirst);
        let export = exporter
            .export(&batch, &ForwardOutput::zeros(1, exporter.shape()))
            .unwrap();

        assert_eq!(export.records.len(), 1);
        assert_eq!(export.stats.duplicate_anomalies, 1);
    }

    #[test]
    fn test_duplicates_rejected() {
        let batch = Batch::new(vec![sample(
            1,
            vec![slot(4, [0.0, 0.0]), slot(4, [1.0, 1.0])],
            &[4],
        )]);
        let exporter = BatchExporter::new(shape(2), DuplicatePolicy::Reject);
        assert!(matches!(
            exporter.export(&batch, &ForwardOutput::zeros(1, exporter.shape())),
            Err(Error::DuplicateIdentity { timestamp: 1, track_id: 4 })
        ));
    }

    #[test]
    fn test_output_shape_is_validated() {
        let batch = Batch::new(vec![sample(1, vec![slot(1, [0.0, 0.0])], &[1])]);
        let exporter = BatchExporter::new(shape(1), DuplicatePolicy::KeepFirst);
        let output = ForwardOutput::zeros(2, exporter.shape());
        assert!(matches!(
            exporter.export(&batch, &output),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_unselected_slot_with_non_finite_anchor_is_ignored() {
        let batch = Batch::new(vec![sample(
            1,
            vec![slot(1, [0.0, 0.0]), slot(2, [f64::NAN, 0.0])],
            &[1],
        )]);
        let exporter = BatchExporter::new(shape(2), DuplicatePolicy::KeepFirst);

        let export = exporter
            .export(&batch, &ForwardOutput::zeros(1, exporter.shape()))
            .unwrap();
        assert_eq!(export.records.len(), 1);
        assert_eq!(export.records[0].track_id, id(1));
        assert_eq!(export.stats.predicted, 1);
    }

    #[test]
    fn test_selected_slot_with_non_finite_anchor_is_rejected() {
        let batch = Batch::new(vec![sample(1, vec![slot(1, [f64::NAN, 0.0])], &[1])]);
        let exporter = BatchExporter::new(shape(1), DuplicatePolicy::KeepFirst);
        assert!(matches!(
            exporter.export(&batch, &ForwardOutput::zeros(1, exporter.shape())),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unselected_slots_with_bad_predictions_are_ignored() {
        let batch = Batch::new(vec![sample(
            1,
            vec![slot(1, [0.0, 0.0]), slot(2, [0.0, 0.0])],
            &[1],
        )]);
        let exporter = BatchExporter::new(shape(2), DuplicatePolicy::KeepFirst);
        let mut output = ForwardOutput::zeros(1, exporter.shape());
        output.positions.slice_mut(s![0, 1, .., .., ..]).fill(f64::NAN);

        let export = exporter.export(&batch, &output).unwrap();
        assert_eq!(export.records.len(), 1);
        assert_eq!(export.records[0].track_id, id(1));
    }
}
