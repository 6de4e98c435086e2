//! Request/response shapes of the orchestration API.
//!
//! Transport-agnostic: the same DTOs serve an HTTP layer, the CLI, or
//! tests. All types use serde with strict snake_case tagging.

use crate::types::{
    DatasetRecord, ExportFormat, Job, JobState, SearchQuery, TrainerKind,
};
use serde::{Deserialize, Serialize};

/// Submit Job inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: TrainerKind,
    pub config_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_ref: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Cancel Job output: whether the cancel took effect, and where the job
/// actually is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub cancelled: bool,
    pub current_state: JobState,
}

/// Per-state job counts across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTotals {
    pub pending: u64,
    pub queued: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl JobTotals {
    /// Bump the counter for one state.
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Queued => self.queued += 1,
            JobState::Running => self.running += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::Cancelled => self.cancelled += 1,
        }
    }
}

/// List Jobs output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub totals: JobTotals,
}

/// Create Dataset inputs. `created_by` comes from the resolved identity,
/// not from the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatasetRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: SearchQuery,
    pub export_formats: Vec<ExportFormat>,
}

/// List Datasets output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetListResponse {
    pub datasets: Vec<DatasetRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_defaults() {
        let json = r#"{"kind": "lora", "config_ref": "cfg/base.yaml"}"#;
        let req: SubmitJobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.kind, TrainerKind::Lora);
        assert_eq!(req.priority, 0);
        assert!(req.tags.is_empty());
        assert!(req.dataset_ref.is_none());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"kind": "full_finetune", "config_ref": "cfg/base.yaml"}"#;
        assert!(serde_json::from_str::<SubmitJobRequest>(json).is_err());
    }

    #[test]
    fn test_totals_record() {
        let mut totals = JobTotals::default();
        totals.record(JobState::Running);
        totals.record(JobState::Running);
        totals.record(JobState::Failed);
        assert_eq!(totals.running, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.completed, 0);
    }
}
