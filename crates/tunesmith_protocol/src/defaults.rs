//! Canonical default values shared across the orchestrator.

/// Default number of concurrently running training jobs.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Default grace period for workers to finish on stop() (seconds).
pub const DEFAULT_WORKER_GRACE_PERIOD_SECS: u64 = 5;

/// Default bounded timeout for one subscriber send (milliseconds).
pub const DEFAULT_SUBSCRIBER_SEND_TIMEOUT_MS: u64 = 500;

/// Default number of records buffered per exporter flush.
pub const DEFAULT_PIPELINE_BATCH_SIZE: usize = 100;
/// Accepted pipeline batch size range.
pub const MIN_PIPELINE_BATCH_SIZE: usize = 10;
pub const MAX_PIPELINE_BATCH_SIZE: usize = 1000;

/// Default cap on trainer dataset input files (bytes).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Default minimum quality score for dataset documents.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.5;

/// Hard cap on list operation page sizes.
pub const MAX_LIST_LIMIT: usize = 1000;
/// Default list page size when the caller does not specify one.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Admission queue capacity; submit backpressures once full.
pub const JOB_QUEUE_CAPACITY: usize = 256;

/// Per-subscriber event buffer; overflow disconnects the subscriber.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// How often an idle worker re-checks the shutdown signal (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 250;

/// Staging depth of the search source channel, in batches.
pub const SOURCE_CHANNEL_CAPACITY: usize = 2;

/// Default root directory for dataset export files.
pub const DEFAULT_EXPORT_ROOT: &str = "data/datasets";

/// Default root directory for trainer outputs (adapters).
pub const DEFAULT_OUTPUT_ROOT: &str = "models/training_outputs";
