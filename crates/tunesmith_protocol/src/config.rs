//! Orchestrator configuration.
//!
//! Values come from defaults, the environment (`TUNESMITH_*`), or the
//! binary's flags. Out-of-range values fail at startup via `validate()`.

use crate::defaults;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {option}: {reason}")]
    OutOfRange { option: &'static str, reason: String },

    #[error("failed to parse {var}={value}: {reason}")]
    Parse {
        var: String,
        value: String,
        reason: String,
    },
}

/// Canonical orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker pool size; at least 1.
    pub max_concurrent_jobs: usize,
    /// How long stop() waits for in-flight workers.
    pub worker_grace_period: Duration,
    /// Bounded timeout for one subscriber send.
    pub subscriber_send_timeout: Duration,
    /// Records buffered per exporter flush.
    pub pipeline_batch_size: usize,
    /// Cap on trainer dataset input files (bytes).
    pub max_file_size: u64,
    /// Default minimum quality score when a query does not set one.
    pub quality_threshold: f64,
    /// Whether dataset builds drop near-duplicate documents.
    pub dedup_enabled: bool,
    /// Whether dataset builds run content/safety heuristics on documents.
    pub content_filter_enabled: bool,
    /// Root directory for dataset export files.
    pub export_root: PathBuf,
    /// Root directory for trainer outputs.
    pub output_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::DEFAULT_MAX_CONCURRENT_JOBS,
            worker_grace_period: Duration::from_secs(defaults::DEFAULT_WORKER_GRACE_PERIOD_SECS),
            subscriber_send_timeout: Duration::from_millis(
                defaults::DEFAULT_SUBSCRIBER_SEND_TIMEOUT_MS,
            ),
            pipeline_batch_size: defaults::DEFAULT_PIPELINE_BATCH_SIZE,
            max_file_size: defaults::DEFAULT_MAX_FILE_SIZE,
            quality_threshold: defaults::DEFAULT_QUALITY_THRESHOLD,
            dedup_enabled: true,
            content_filter_enabled: false,
            export_root: PathBuf::from(defaults::DEFAULT_EXPORT_ROOT),
            output_root: PathBuf::from(defaults::DEFAULT_OUTPUT_ROOT),
        }
    }
}

impl OrchestratorConfig {
    /// Build a configuration from `TUNESMITH_*` environment variables,
    /// starting from defaults. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_env("TUNESMITH_MAX_CONCURRENT_JOBS")? {
            config.max_concurrent_jobs = v;
        }
        if let Some(v) = read_env("TUNESMITH_WORKER_GRACE_PERIOD_SECS")? {
            config.worker_grace_period = Duration::from_secs(v);
        }
        if let Some(v) = read_env("TUNESMITH_SUBSCRIBER_SEND_TIMEOUT_MS")? {
            config.subscriber_send_timeout = Duration::from_millis(v);
        }
        if let Some(v) = read_env("TUNESMITH_PIPELINE_BATCH_SIZE")? {
            config.pipeline_batch_size = v;
        }
        if let Some(v) = read_env("TUNESMITH_MAX_FILE_SIZE")? {
            config.max_file_size = v;
        }
        if let Some(v) = read_env("TUNESMITH_QUALITY_THRESHOLD")? {
            config.quality_threshold = v;
        }
        if let Some(v) = read_env("TUNESMITH_DEDUP_ENABLED")? {
            config.dedup_enabled = v;
        }
        if let Some(v) = read_env("TUNESMITH_CONTENT_FILTER_ENABLED")? {
            config.content_filter_enabled = v;
        }
        if let Ok(path) = std::env::var("TUNESMITH_EXPORT_ROOT") {
            config.export_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("TUNESMITH_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs < 1 {
            return Err(ConfigError::OutOfRange {
                option: "max_concurrent_jobs",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.pipeline_batch_size < defaults::MIN_PIPELINE_BATCH_SIZE
            || self.pipeline_batch_size > defaults::MAX_PIPELINE_BATCH_SIZE
        {
            return Err(ConfigError::OutOfRange {
                option: "pipeline_batch_size",
                reason: format!(
                    "must be in {}..={}",
                    defaults::MIN_PIPELINE_BATCH_SIZE,
                    defaults::MAX_PIPELINE_BATCH_SIZE
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::OutOfRange {
                option: "quality_threshold",
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::OutOfRange {
                option: "max_file_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.worker_grace_period.is_zero() {
            return Err(ConfigError::OutOfRange {
                option: "worker_grace_period",
                reason: "must be > 0".to_string(),
            });
        }
        if self.subscriber_send_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                option: "subscriber_send_timeout",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                var: var.to_string(),
                value,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
