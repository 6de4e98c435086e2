//! Trainer interface and implementations.
//!
//! The worker pool depends only on the [`Trainer`] trait; which
//! implementation backs it is an injection decision made at startup.
//! A trainer run is a blocking call: callers are expected to isolate it
//! (the pool uses `spawn_blocking`) so other workers keep running.

pub mod process;
pub mod simulated;

pub use process::ProcessTrainer;
pub use simulated::SimulatedTrainer;

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tunesmith_protocol::{JobId, JobProgress, TrainerKind};

/// Errors raised by a trainer invocation.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// The configuration reference could not be resolved.
    #[error("config not resolvable: {0}")]
    Config(String),

    /// The dataset reference could not be resolved or was rejected.
    #[error("dataset not usable: {0}")]
    Dataset(String),

    /// Training itself failed.
    #[error("training failed: {0}")]
    Training(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything a trainer needs for one run.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub job_id: JobId,
    pub kind: TrainerKind,
    pub config_ref: String,
    pub dataset_ref: Option<String>,
    /// Root directory for produced adapters; the trainer creates a
    /// job-scoped subdirectory underneath.
    pub output_dir: PathBuf,
}

/// Result of a successful trainer run.
#[derive(Debug, Clone)]
pub struct TrainerOutcome {
    /// Reference to the produced adapter.
    pub artifact_ref: String,
    pub metrics: HashMap<String, f64>,
}

/// Callback through which a trainer reports per-epoch progress.
pub type ProgressFn = Box<dyn Fn(JobProgress) + Send + Sync>;

/// A blocking training subroutine.
pub trait Trainer: Send + Sync {
    fn run(&self, request: TrainRequest, progress: ProgressFn)
        -> Result<TrainerOutcome, TrainerError>;
}
