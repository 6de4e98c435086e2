//! Shared types for the Tunesmith training-job orchestration service.
//!
//! Everything that crosses a component boundary lives here: job and
//! dataset records, progress events, search/query shapes, the
//! request/response DTOs of the orchestration API, configuration, and
//! the canonical defaults. All types use serde with snake_case enum
//! tagging so they serialize the same way on every surface.

pub mod api_types;
pub mod config;
pub mod defaults;
pub mod error;
pub mod types;

pub use api_types::{
    CancelJobResponse, CreateDatasetRequest, DatasetListResponse, JobTotals, ListJobsResponse,
    SubmitJobRequest,
};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::ApiError;
pub use types::{
    DatasetEvent, DatasetId, DatasetRecord, DatasetState, DatasetStats, ExportFormat, Identity,
    Job, JobId, JobProgress, JobState, ProgressEvent, ScoredDocument, SearchKind, SearchQuery,
    TrainerKind, TrainingRecord,
};
