//! External-process trainer.
//!
//! Spawns a training command and reads a JSON receipt from its stdout:
//!
//! ```json
//! {"status": "SUCCESS", "artifact_ref": "...", "metrics": {"final_loss": 0.2}}
//! {"status": "FAILED", "error_message": "..."}
//! ```
//!
//! Progress reporting is not wired through the process boundary; the
//! callback is accepted and ignored.

use crate::{ProgressFn, TrainRequest, Trainer, TrainerError, TrainerOutcome};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct TrainReceipt {
    status: String,
    #[serde(default)]
    artifact_ref: Option<String>,
    #[serde(default)]
    metrics: HashMap<String, f64>,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct ProcessTrainer {
    command: PathBuf,
}

impl ProcessTrainer {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Trainer for ProcessTrainer {
    fn run(
        &self,
        request: TrainRequest,
        _progress: ProgressFn,
    ) -> Result<TrainerOutcome, TrainerError> {
        info!(
            "Launching trainer process {} for job {}",
            self.command.display(),
            request.job_id
        );

        let mut command = Command::new(&self.command);
        command
            .arg("--kind")
            .arg(request.kind.to_string())
            .arg("--config")
            .arg(&request.config_ref)
            .arg("--output-dir")
            .arg(&request.output_dir);
        if let Some(dataset) = &request.dataset_ref {
            command.arg("--dataset").arg(dataset);
        }

        let output = command.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Trainer process exited with {}: {}", output.status, stderr);
            return Err(TrainerError::Training(format!(
                "trainer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let receipt: TrainReceipt = serde_json::from_slice(&output.stdout).map_err(|e| {
            TrainerError::Training(format!("invalid trainer receipt: {}", e))
        })?;

        match receipt.status.as_str() {
            "SUCCESS" => {
                let artifact_ref = receipt.artifact_ref.ok_or_else(|| {
                    TrainerError::Training("receipt missing artifact_ref".to_string())
                })?;
                Ok(TrainerOutcome {
                    artifact_ref,
                    metrics: receipt.metrics,
                })
            }
            _ => Err(TrainerError::Training(
                receipt
                    .error_message
                    .unwrap_or_else(|| "trainer reported failure".to_string()),
            )),
        }
    }
}
