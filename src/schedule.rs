//! Learning-rate schedule: linear warmup followed by cosine decay.

use std::f64::consts::PI;

/// Warmup + cosine learning-rate multiplier.
///
/// `rate(step)` ramps linearly from 0 to 1 over `warmup_steps`, then decays
/// along a half cosine to 0 at `total_steps`. Steps past the end stay at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupCosineSchedule {
    warmup_steps: usize,
    total_steps: usize,
}

impl WarmupCosineSchedule {
    pub fn new(warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            warmup_steps: warmup_steps.min(total_steps),
            total_steps,
        }
    }

    /// Warmup over the first fifth of the epochs.
    pub fn from_epochs(epochs: usize, steps_per_epoch: usize) -> Self {
        Self::new((epochs / 5) * steps_per_epoch, epochs * steps_per_epoch)
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Multiplier for the base learning rate at `step`.
    pub fn rate(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return step as f64 / self.warmup_steps as f64;
        }
        let decay_steps = self.total_steps - self.warmup_steps;
        if decay_steps == 0 {
            return 0.0;
        }
        let progress = (step - self.warmup_steps).min(decay_steps) as f64 / decay_steps as f64;
        0.5 * (1.0 + (PI * progress).cos())
    }

    /// `base_rate * rate(step)`.
    pub fn learning_rate(&self, base_rate: f64, step: usize) -> f64 {
        base_rate * self.rate(step)
    }
}
