use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::model::{ForwardRequest, LossTerms, ModelShape, TrainableModel};
use crate::sample::Batch;
use crate::schedule::WarmupCosineSchedule;
use crate::{Error, Result};

/// Settings for the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub shape: ModelShape,
    pub epochs: usize,
    /// Steps per epoch are capped at this many batches.
    pub max_steps_per_epoch: usize,
    /// Write a checkpoint every this many epochs (and after the last one).
    pub checkpoint_every: usize,
    /// Base learning rate, scaled by the schedule.
    pub learning_rate: f64,
    pub checkpoint_dir: PathBuf,
}

/// Mean losses and bookkeeping for one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    pub steps: usize,
    pub mean_losses: LossTerms,
    /// Learning rate used for the last step of the epoch.
    pub last_learning_rate: f64,
}

/// Result of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    pub checkpoints: Vec<PathBuf>,
    pub total_steps: usize,
}

/// Epoch loop around a [`TrainableModel`].
pub struct TrainingDriver<M: TrainableModel> {
    model: M,
    settings: TrainingSettings,
    schedule: WarmupCosineSchedule,
}

impl<M: TrainableModel> TrainingDriver<M> {
    pub fn new(settings: TrainingSettings, model: M) -> Result<Self> {
        if settings.epochs == 0 || settings.max_steps_per_epoch == 0 || settings.checkpoint_every == 0 {
            return Err(Error::InvalidConfig(
                "epochs, max_steps_per_epoch and checkpoint_every must be positive".to_string(),
            ));
        }
        if !(settings.learning_rate.is_finite() && settings.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                settings.learning_rate
            )));
        }

        let schedule = WarmupCosineSchedule::from_epochs(settings.epochs, settings.max_steps_per_epoch);
        Ok(Self {
            model,
            settings,
            schedule,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn schedule(&self) -> &WarmupCosineSchedule {
        &self.schedule
    }

    /// Path of the checkpoint written after `epoch` (1-based).
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.settings.checkpoint_dir.join(format!("epoch_{}.ckpt", epoch))
    }

    /// Train for the configured number of epochs.
    ///
    /// `epoch_batches(epoch)` supplies the batches of a 0-based epoch; at
    /// most `max_steps_per_epoch` of them are consumed.
    pub fn run<F, I>(&mut self, mut epoch_batches: F) -> Result<TrainingReport>
    where
        F: FnMut(usize) -> I,
        I: IntoIterator<Item = Result<Batch>>,
    {
        info!(
            epochs = self.settings.epochs,
            max_steps_per_epoch = self.settings.max_steps_per_epoch,
            warmup_steps = self.schedule.warmup_steps(),
            total_steps = self.schedule.total_steps(),
            "Starting training"
        );

        let mut report = TrainingReport::default();
        for epoch in 0..self.settings.epochs {
            let summary = self.run_epoch(epoch, epoch_batches(epoch), &mut report.total_steps)?;
            info!(
                epoch = summary.epoch,
                steps = summary.steps,
                loss = summary.mean_losses.total(),
                learning_rate = summary.last_learning_rate,
                "Epoch complete"
            );

            let number = epoch + 1;
            if number % self.settings.checkpoint_every == 0 || number == self.settings.epochs {
                report.checkpoints.push(self.write_checkpoint(number)?);
            }
            report.epochs.push(summary);
        }

        info!(steps = report.total_steps, checkpoints = report.checkpoints.len(), "Training complete");
        Ok(report)
    }

    fn run_epoch<I>(&mut self, epoch: usize, batches: I, global_step: &mut usize) -> Result<EpochSummary>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut steps = 0;
        let mut last_learning_rate = 0.0;

        for batch in batches.into_iter().take(self.settings.max_steps_per_epoch) {
            let batch = batch?;
            let learning_rate = self.schedule.learning_rate(self.settings.learning_rate, *global_step);

            let request = ForwardRequest::from_batch(&batch, &self.settings.shape)?;
            let output = self.model.forward(&request)?;
            output.validate(batch.len(), &self.settings.shape)?;
            self.model.optimize(&output.losses, learning_rate)?;

            for (name, value) in output.losses.iter() {
                let entry = sums.entry(name.to_string()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
            debug!(epoch, step = steps, learning_rate, loss = output.losses.total(), "Training step");

            steps += 1;
            *global_step += 1;
            last_learning_rate = learning_rate;
        }

        let mean_losses = sums
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f64))
            .collect();

        Ok(EpochSummary {
            epoch: epoch + 1,
            steps,
            mean_losses,
            last_learning_rate,
        })
    }

    fn write_checkpoint(&self, epoch: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.settings.checkpoint_dir).map_err(|e| {
            Error::IoError(std::io::Error::new(
                e.kind(),
                format!("failed to create checkpoint folder: {}", e),
            ))
        })?;

        let path = self.checkpoint_path(epoch);
        self.model.save_checkpoint(&path)?;
        info!(epoch, path = %path.display(), "Saved checkpoint");
        Ok(path)
    }
}
