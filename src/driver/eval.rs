use std::time::Instant;

use tracing::{debug, info};

use crate::config::Config;
use crate::export::{EvaluationAccumulator, ExportSnapshot};
use crate::loader::PrefetchLoader;
use crate::matching::DuplicatePolicy;
use crate::model::{ForwardRequest, ModelShape, MotionModel};
use crate::pipeline::{BatchExporter, BatchStats};
use crate::sample::{into_batches, Batch, Sample};
use crate::Result;

/// Settings for an evaluation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationSettings {
    pub shape: ModelShape,
    pub policy: DuplicatePolicy,
}

/// Runs a model over every batch and collects the export records.
///
/// The accumulator lives only for the duration of [`run`](Self::run), so
/// concurrent sweeps never share state.
pub struct EvaluationDriver<M: MotionModel> {
    model: M,
    exporter: BatchExporter,
}

impl<M: MotionModel> EvaluationDriver<M> {
    pub fn new(settings: EvaluationSettings, model: M) -> Self {
        Self {
            model,
            exporter: BatchExporter::new(settings.shape, settings.policy),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Evaluate every batch and freeze the result.
    ///
    /// Any loader, model or pipeline error aborts the sweep.
    pub fn run<I>(&mut self, batches: I) -> Result<ExportSnapshot>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        let shape = *self.exporter.shape();
        let mut accumulator = EvaluationAccumulator::new(shape.num_candidates, shape.future_len);
        let started = Instant::now();
        info!(
            max_agents = shape.max_agents,
            num_candidates = shape.num_candidates,
            future_len = shape.future_len,
            "Starting evaluation sweep"
        );

        let mut totals = BatchStats::default();
        for (index, batch) in batches.into_iter().enumerate() {
            let batch = batch?;
            let stats = self.evaluate_batch(&batch, &mut accumulator)?;
            debug!(batch = index, samples = stats.samples, records = accumulator.len(), "Evaluated batch");
            totals.add(&stats);
        }

        info!(
            samples = totals.samples,
            predicted = totals.predicted,
            imputed = totals.imputed,
            unanchored = totals.unanchored,
            duplicate_anomalies = totals.duplicate_anomalies,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation sweep complete"
        );
        accumulator.finalize()
    }

    /// Run one batch through the model and the pipeline into `accumulator`.
    pub fn evaluate_batch(
        &mut self,
        batch: &Batch,
        accumulator: &mut EvaluationAccumulator,
    ) -> Result<BatchStats> {
        if batch.is_empty() {
            return Ok(BatchStats::default());
        }

        let request = ForwardRequest::from_batch(batch, self.exporter.shape())?;
        let output = self.model.forward(&request)?;
        let export = self.exporter.export(batch, &output)?;
        let stats = export.stats;
        accumulator.extend(export)?;
        Ok(stats)
    }
}

/// Evaluate `samples` as configured and write the predictions file.
///
/// Samples are grouped into `eval.batch_size` batches, prefetched through a
/// channel of `eval.prefetch` batches, and the snapshot is written to
/// `eval.output_path`.
pub fn evaluate_and_export<M: MotionModel>(
    config: &Config,
    model: M,
    samples: Vec<Sample>,
) -> Result<ExportSnapshot> {
    let settings = config.eval_settings()?;
    let batches = into_batches(samples, config.eval.batch_size)?;
    let loader = PrefetchLoader::spawn(batches.into_iter().map(Ok), config.eval.prefetch)?;

    let mut driver = EvaluationDriver::new(settings, model);
    let snapshot = driver.run(loader)?;
    snapshot.write_csv_file(&config.eval.output_path)?;
    Ok(snapshot)
}
