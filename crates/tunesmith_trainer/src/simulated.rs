//! Simulated trainer for development and tests.
//!
//! Walks a fixed number of epochs, reports progress at the start of
//! each, and produces deterministic metrics that improve with epoch
//! count. The adapter artifact is an empty directory laid out the way a
//! real adapter checkpoint would be.

use crate::{ProgressFn, TrainRequest, Trainer, TrainerError, TrainerOutcome};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};
use tunesmith_protocol::JobProgress;

pub struct SimulatedTrainer {
    epochs: u32,
    epoch_duration: Duration,
    /// Fail any run whose config_ref contains this marker.
    fail_marker: Option<String>,
}

impl SimulatedTrainer {
    pub fn new(epochs: u32, epoch_duration: Duration) -> Self {
        Self {
            epochs: epochs.max(1),
            epoch_duration,
            fail_marker: None,
        }
    }

    /// Make runs fail when `config_ref` contains `marker` (test knob).
    pub fn failing_when(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }
}

impl Default for SimulatedTrainer {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

impl Trainer for SimulatedTrainer {
    fn run(
        &self,
        request: TrainRequest,
        progress: ProgressFn,
    ) -> Result<TrainerOutcome, TrainerError> {
        info!("Simulating {} training: {}", request.kind, request.job_id);

        if let Some(marker) = &self.fail_marker {
            if request.config_ref.contains(marker.as_str()) {
                warn!("Simulated failure for job {}", request.job_id);
                return Err(TrainerError::Training(format!(
                    "simulated failure ({})",
                    request.config_ref
                )));
            }
        }

        for epoch in 1..=self.epochs {
            // Progress is reported at epoch start so percent stays below
            // 100 until the run actually completes.
            progress(JobProgress {
                current_epoch: epoch,
                total_epochs: self.epochs,
                percent: f64::from(epoch - 1) / f64::from(self.epochs) * 100.0,
            });
            std::thread::sleep(self.epoch_duration);
        }

        let adapter_dir = request
            .output_dir
            .join(request.job_id.as_ref())
            .join("adapter_model");
        std::fs::create_dir_all(&adapter_dir)?;

        let epochs = f64::from(self.epochs);
        let metrics = HashMap::from([
            ("final_loss".to_string(), (0.5 - epochs * 0.1).max(0.2)),
            ("perplexity".to_string(), (15.0 - epochs * 2.0).max(8.0)),
            ("accuracy".to_string(), (0.7 + epochs * 0.05).min(0.9)),
            ("epochs_completed".to_string(), epochs),
        ]);

        Ok(TrainerOutcome {
            artifact_ref: adapter_dir.display().to_string(),
            metrics,
        })
    }
}
