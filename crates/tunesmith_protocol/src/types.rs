//! Core data model: jobs, datasets, documents, progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Create a new random dataset ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DatasetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trainer variant selected by a job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerKind {
    Lora,
    Qlora,
    Continuous,
}

impl fmt::Display for TrainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lora => "lora",
            Self::Qlora => "qlora",
            Self::Continuous => "continuous",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TrainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lora" => Ok(Self::Lora),
            "qlora" => Ok(Self::Qlora),
            "continuous" => Ok(Self::Continuous),
            other => Err(format!("unknown trainer kind: {}", other)),
        }
    }
}

/// Job lifecycle state.
///
/// Transitions are monotone:
///
/// ```text
/// Pending -> Queued -> Running -> Completed
///    |          |         |
///    |          +---------|----> Cancelled (pre-run only)
///    +--------------------+----> Failed (from Running)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Check whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    /// Completed, Failed and Cancelled accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// Training progress, updated only while a job is Running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_epoch: u32,
    pub total_epochs: u32,
    /// Percent complete in [0, 100]. Reaches 100 exactly at completion.
    pub percent: f64,
}

/// One trainer invocation tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: TrainerKind,
    pub state: JobState,
    /// Opaque reference to the training configuration, resolved by the trainer.
    pub config_ref: String,
    /// Opaque reference to the training dataset, resolved by the trainer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_ref: Option<String>,
    /// Informational; dispatch order is FIFO regardless of priority.
    pub priority: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    /// Populated on successful completion.
    pub metrics: HashMap<String, f64>,
    /// Opaque reference to the produced adapter; populated on Completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    /// Populated on Failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Index of the worker that is or was executing this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<usize>,
}

impl Job {
    /// Create a new Pending job.
    pub fn new(
        kind: TrainerKind,
        config_ref: impl Into<String>,
        dataset_ref: Option<String>,
        priority: i32,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            kind,
            state: JobState::Pending,
            config_ref: config_ref.into(),
            dataset_ref,
            priority,
            tags,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            metrics: HashMap::new(),
            artifact_ref: None,
            error: None,
            worker_id: None,
        }
    }

    /// Stamp the Queued transition.
    pub fn mark_queued(&mut self) {
        self.state = JobState::Queued;
    }

    /// Stamp the Running transition.
    pub fn mark_running(&mut self, worker_id: usize) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id);
    }

    /// Stamp successful completion.
    pub fn mark_completed(&mut self, artifact_ref: String, metrics: HashMap<String, f64>) {
        self.state = JobState::Completed;
        self.completed_at = Some(Utc::now());
        self.artifact_ref = Some(artifact_ref);
        self.metrics = metrics;
        self.progress.percent = 100.0;
        if self.progress.total_epochs > 0 {
            self.progress.current_epoch = self.progress.total_epochs;
        }
    }

    /// Stamp trainer failure.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Stamp pre-run cancellation.
    pub fn mark_cancelled(&mut self) {
        self.state = JobState::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// Dataset build lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DatasetState {
    /// Check whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: DatasetState) -> bool {
        use DatasetState::*;
        matches!(
            (self, to),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Aggregate statistics of a completed dataset build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub document_count: u64,
    pub total_tokens: u64,
    pub avg_quality_score: f64,
}

/// One search-driven dataset build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: DatasetId,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub state: DatasetState,
    pub query: SearchQuery,
    /// Populated on Completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DatasetStats>,
    /// Format -> produced file. Only populated for fully committed exports.
    pub export_paths: HashMap<ExportFormat, PathBuf>,
    /// Populated on Failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatasetRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
        query: SearchQuery,
    ) -> Self {
        Self {
            id: DatasetId::new(),
            name: name.into(),
            description: description.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            state: DatasetState::Pending,
            query,
            stats: None,
            export_paths: HashMap::new(),
            error: None,
        }
    }
}

/// Search modality requested from the hybrid-search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Vector,
    Graph,
    Relational,
}

/// Search specification driving a dataset build.
///
/// The backend returns documents already ranked; `weights` blend the
/// requested search kinds and are passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_text: String,
    pub top_k: usize,
    #[serde(default)]
    pub filters: HashMap<String, String>,
    /// Minimum quality score; falls back to the configured threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality_score: Option<f64>,
    #[serde(default)]
    pub search_kinds: Vec<SearchKind>,
    #[serde(default)]
    pub weights: HashMap<SearchKind, f64>,
}

impl SearchQuery {
    pub fn new(query_text: impl Into<String>, top_k: usize) -> Self {
        Self {
            query_text: query_text.into(),
            top_k,
            filters: HashMap::new(),
            min_quality_score: None,
            search_kinds: vec![SearchKind::Vector, SearchKind::Graph],
            weights: HashMap::new(),
        }
    }
}

/// A ranked document produced by the search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document_id: String,
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Relevance score assigned by the backend's ranking.
    pub score: f64,
    pub quality_score: f64,
    /// Token count if the backend provides one; estimated otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

impl ScoredDocument {
    /// Convert into the on-disk training-record shape.
    pub fn to_training_record(&self) -> TrainingRecord {
        TrainingRecord {
            text: self.content.clone(),
            document_id: self.document_id.clone(),
            source: self.source.clone(),
            quality_score: self.quality_score,
            relevance_score: self.score,
            metadata: self.metadata.clone(),
        }
    }

    /// Backend-provided token count, or a whitespace-token estimate.
    pub fn token_count_or_estimate(&self) -> u64 {
        self.token_count
            .unwrap_or_else(|| self.content.split_whitespace().count() as u64)
    }
}

/// One row of an exported training file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub text: String,
    pub document_id: String,
    pub source: String,
    pub quality_score: f64,
    pub relevance_score: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Export file format for dataset builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Jsonl,
    Json,
    Csv,
    Parquet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}

/// Immutable description of one job state transition, fanned out to
/// subscribers by the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, f64>>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Snapshot a job into an event. Metrics are carried only once present.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            state: job.state,
            progress: job.progress.clone(),
            metrics: if job.metrics.is_empty() {
                None
            } else {
                Some(job.metrics.clone())
            },
            timestamp: Utc::now(),
        }
    }
}

/// Dataset-build counterpart of [`ProgressEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEvent {
    pub dataset_id: DatasetId,
    pub state: DatasetState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DatasetEvent {
    pub fn from_record(record: &DatasetRecord) -> Self {
        Self {
            dataset_id: record.id.clone(),
            state: record.state,
            document_count: record.stats.as_ref().map(|s| s.document_count),
            error: record.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Request-scoped identity resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl Identity {
    /// Fixed identity used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            email: "anonymous@local".to_string(),
            roles: vec!["trainer".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_transitions() {
        use JobState::*;

        assert!(Pending.can_transition(Queued));
        assert!(Pending.can_transition(Cancelled));
        assert!(Queued.can_transition(Running));
        assert!(Queued.can_transition(Cancelled));
        assert!(Running.can_transition(Completed));
        assert!(Running.can_transition(Failed));

        // No back-transitions or skips.
        assert!(!Pending.can_transition(Running));
        assert!(!Queued.can_transition(Pending));
        assert!(!Running.can_transition(Cancelled));
        assert!(!Completed.can_transition(Running));
        assert!(!Failed.can_transition(Queued));
        assert!(!Cancelled.can_transition(Queued));
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Queued.is_terminal());
    }

    #[test]
    fn test_completed_job_invariants() {
        let mut job = Job::new(TrainerKind::Lora, "cfg/a", None, 0, vec![]);
        job.mark_queued();
        job.mark_running(0);
        job.mark_completed("adapters/a".to_string(), HashMap::from([("loss".into(), 0.2)]));

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress.percent, 100.0);
        assert!(job.artifact_ref.is_some());
        assert!(job.error.is_none());
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }

    #[test]
    fn test_trainer_kind_round_trip() {
        for kind in [TrainerKind::Lora, TrainerKind::Qlora, TrainerKind::Continuous] {
            assert_eq!(kind.to_string().parse::<TrainerKind>().unwrap(), kind);
        }
        assert!("dpo".parse::<TrainerKind>().is_err());
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("parquet".parse::<ExportFormat>().unwrap(), ExportFormat::Parquet);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_token_count_fallback() {
        let doc = ScoredDocument {
            document_id: "d1".into(),
            content: "three word estimate".into(),
            source: String::new(),
            metadata: HashMap::new(),
            score: 0.9,
            quality_score: 0.8,
            token_count: None,
        };
        assert_eq!(doc.token_count_or_estimate(), 3);

        let doc = ScoredDocument {
            token_count: Some(42),
            ..doc
        };
        assert_eq!(doc.token_count_or_estimate(), 42);
    }

    #[test]
    fn test_progress_event_serialization() {
        let job = Job::new(TrainerKind::Qlora, "cfg/b", Some("data/b.jsonl".into()), 1, vec![]);
        let event = ProgressEvent::from_job(&job);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["state"], "pending");
        assert_eq!(json["job_id"], job.id.to_string());
        // Empty metrics are omitted, not serialized as {}.
        assert!(json.get("metrics").is_none());
    }
}
