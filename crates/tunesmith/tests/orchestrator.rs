//! Orchestration API tests: validation, delegation, idempotence, and
//! the end-to-end paths through the assembled service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tunesmith::{AnonymousIdentity, Orchestrator};
use tunesmith_dataset::StaticBackend;
use tunesmith_protocol::api_types::{CreateDatasetRequest, SubmitJobRequest};
use tunesmith_protocol::{
    ApiError, DatasetState, ExportFormat, JobState, OrchestratorConfig, ScoredDocument,
    SearchQuery, TrainerKind,
};
use tunesmith_trainer::SimulatedTrainer;

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    _dirs: (TempDir, TempDir),
}

fn fixture(corpus: Vec<ScoredDocument>) -> Fixture {
    let export_root = TempDir::new().unwrap();
    let output_root = TempDir::new().unwrap();
    let config = OrchestratorConfig {
        max_concurrent_jobs: 2,
        export_root: export_root.path().to_path_buf(),
        output_root: output_root.path().to_path_buf(),
        worker_grace_period: Duration::from_millis(500),
        ..Default::default()
    };
    let orchestrator = Orchestrator::bootstrap(
        config,
        Arc::new(SimulatedTrainer::new(2, Duration::from_millis(10))),
        Arc::new(StaticBackend::new(corpus)),
        Arc::new(AnonymousIdentity),
    )
    .unwrap();
    Fixture {
        orchestrator,
        _dirs: (export_root, output_root),
    }
}

fn submit_request(config_ref: &str) -> SubmitJobRequest {
    SubmitJobRequest {
        kind: TrainerKind::Lora,
        config_ref: config_ref.to_string(),
        dataset_ref: None,
        priority: 1,
        tags: vec!["test".to_string()],
    }
}

fn corpus(n: usize) -> Vec<ScoredDocument> {
    (0..n)
        .map(|i| ScoredDocument {
            document_id: format!("d{}", i),
            content: format!("document body {}", i),
            source: "themis".to_string(),
            metadata: HashMap::new(),
            score: 1.0 - i as f64 * 0.001,
            quality_score: 0.9,
            token_count: None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_job_end_to_end() {
    let fx = fixture(Vec::new());
    fx.orchestrator.start().unwrap();

    let job = fx
        .orchestrator
        .submit_job(submit_request("cfg/base.yaml"))
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Queued);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let current = fx.orchestrator.get_job(&job.id).unwrap();
        if current.state == JobState::Completed {
            assert_eq!(current.progress.percent, 100.0);
            assert!(current.artifact_ref.is_some());
            break;
        }
        assert!(Instant::now() < deadline, "job did not complete");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let listing = fx.orchestrator.list_jobs(None, None).unwrap();
    assert_eq!(listing.jobs.len(), 1);
    assert_eq!(listing.totals.completed, 1);

    fx.orchestrator.stop().await;
}

#[tokio::test]
async fn submit_job_validation() {
    let fx = fixture(Vec::new());

    let err = fx
        .orchestrator
        .submit_job(submit_request("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = fx
        .orchestrator
        .submit_job(SubmitJobRequest {
            dataset_ref: Some(String::new()),
            ..submit_request("cfg/base.yaml")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let fx = fixture(Vec::new());
    let id = tunesmith_protocol::JobId::new();

    assert!(matches!(
        fx.orchestrator.get_job(&id),
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        fx.orchestrator.cancel_job(&id).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_limit_is_validated() {
    let fx = fixture(Vec::new());

    assert!(matches!(
        fx.orchestrator.list_jobs(None, Some(1001)),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        fx.orchestrator.list_jobs(None, Some(0)),
        Err(ApiError::Validation(_))
    ));
    assert!(fx.orchestrator.list_jobs(None, Some(1000)).is_ok());
}

#[tokio::test]
async fn cancel_pending_job_before_start() {
    let fx = fixture(Vec::new());
    // Pool not started: the job stays Queued and is cancellable.

    let job = fx
        .orchestrator
        .submit_job(submit_request("cfg/base.yaml"))
        .await
        .unwrap();

    let response = fx.orchestrator.cancel_job(&job.id).await.unwrap();
    assert!(response.cancelled);
    assert_eq!(response.current_state, JobState::Cancelled);

    // Cancelling again reports not-cancellable, state unchanged.
    let again = fx.orchestrator.cancel_job(&job.id).await.unwrap();
    assert!(!again.cancelled);
    assert_eq!(again.current_state, JobState::Cancelled);
}

#[tokio::test]
async fn listing_filters_by_state_and_reports_totals() {
    let fx = fixture(Vec::new());

    let queued = fx
        .orchestrator
        .submit_job(submit_request("cfg/base.yaml"))
        .await
        .unwrap();
    let cancelled = fx
        .orchestrator
        .submit_job(submit_request("cfg/other.yaml"))
        .await
        .unwrap();
    fx.orchestrator.cancel_job(&cancelled.id).await.unwrap();

    let listing = fx
        .orchestrator
        .list_jobs(Some(JobState::Queued), None)
        .unwrap();
    assert_eq!(listing.jobs.len(), 1);
    assert_eq!(listing.jobs[0].id, queued.id);
    // Totals always cover the whole store, not the filtered page.
    assert_eq!(listing.totals.queued, 1);
    assert_eq!(listing.totals.cancelled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_after_stop_is_rejected() {
    let fx = fixture(Vec::new());
    fx.orchestrator.start().unwrap();
    fx.orchestrator.stop().await;

    let err = fx
        .orchestrator
        .submit_job(submit_request("cfg/base.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ShuttingDown));
}

#[tokio::test]
async fn create_dataset_validation() {
    let fx = fixture(Vec::new());

    let valid = CreateDatasetRequest {
        name: "corpus".to_string(),
        description: String::new(),
        query: SearchQuery::new("query", 10),
        export_formats: vec![ExportFormat::Jsonl],
    };

    let bad_name = CreateDatasetRequest {
        name: " ".to_string(),
        ..valid.clone()
    };
    assert!(matches!(
        fx.orchestrator.create_dataset(bad_name, None),
        Err(ApiError::Validation(_))
    ));

    let bad_query = CreateDatasetRequest {
        query: SearchQuery::new("", 10),
        ..valid.clone()
    };
    assert!(matches!(
        fx.orchestrator.create_dataset(bad_query, None),
        Err(ApiError::Validation(_))
    ));

    let bad_top_k = CreateDatasetRequest {
        query: SearchQuery::new("query", 0),
        ..valid.clone()
    };
    assert!(matches!(
        fx.orchestrator.create_dataset(bad_top_k, None),
        Err(ApiError::Validation(_))
    ));

    let bad_quality = CreateDatasetRequest {
        query: SearchQuery {
            min_quality_score: Some(1.5),
            ..SearchQuery::new("query", 10)
        },
        ..valid.clone()
    };
    assert!(matches!(
        fx.orchestrator.create_dataset(bad_quality, None),
        Err(ApiError::Validation(_))
    ));

    let no_formats = CreateDatasetRequest {
        export_formats: Vec::new(),
        ..valid
    };
    assert!(matches!(
        fx.orchestrator.create_dataset(no_formats, None),
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn create_dataset_runs_in_background() {
    let fx = fixture(corpus(50));
    let mut events = fx.orchestrator.subscribe_datasets();

    let record = fx
        .orchestrator
        .create_dataset(
            CreateDatasetRequest {
                name: "bg-build".to_string(),
                description: "background".to_string(),
                query: SearchQuery::new("query", 50),
                // Repeated formats collapse to one export.
                export_formats: vec![ExportFormat::Jsonl, ExportFormat::Jsonl],
            },
            None,
        )
        .unwrap();
    // The call returned immediately with a Pending snapshot.
    assert_eq!(record.state, DatasetState::Pending);
    assert_eq!(record.created_by, "anonymous@local");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), events.events.recv()).await
        else {
            assert!(Instant::now() < deadline, "no terminal dataset event");
            continue;
        };
        if event.dataset_id == record.id && event.state.is_terminal() {
            break;
        }
    }

    let done = fx.orchestrator.get_dataset(&record.id).unwrap();
    assert_eq!(done.state, DatasetState::Completed);
    assert_eq!(done.stats.unwrap().document_count, 50);
    assert_eq!(done.export_paths.len(), 1);

    let listing = fx
        .orchestrator
        .list_datasets(Some(DatasetState::Completed), None)
        .unwrap();
    assert_eq!(listing.datasets.len(), 1);
}
