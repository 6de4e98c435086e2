//! Orchestration API - the thin public surface over the components.
//!
//! Every operation is parameter validation, delegation, result shaping.
//! The facade receives all of its collaborators at construction; there
//! is no global state to register or swap.

use crate::identity::IdentityProvider;
use std::sync::Arc;
use tracing::info;
use tunesmith_dataset::{DatasetService, DatasetStore, SearchBackend};
use tunesmith_jobs::{
    JobStore, PoolConfig, PoolError, SubscriberId, Subscription, SubscriptionHub, WorkerPool,
};
use tunesmith_protocol::api_types::{
    CancelJobResponse, CreateDatasetRequest, DatasetListResponse, ListJobsResponse,
    SubmitJobRequest,
};
use tunesmith_protocol::{
    defaults, ApiError, ConfigError, DatasetEvent, DatasetId, DatasetRecord, DatasetState, Job,
    JobId, JobState, OrchestratorConfig, ProgressEvent,
};
use tunesmith_trainer::Trainer;

pub struct Orchestrator {
    store: Arc<JobStore>,
    pool: Arc<WorkerPool>,
    job_hub: Arc<SubscriptionHub<ProgressEvent>>,
    dataset_hub: Arc<SubscriptionHub<DatasetEvent>>,
    datasets: Arc<DatasetService>,
    identity: Arc<dyn IdentityProvider>,
}

impl Orchestrator {
    /// Assemble the service from its injected collaborators.
    pub fn new(
        store: Arc<JobStore>,
        pool: Arc<WorkerPool>,
        job_hub: Arc<SubscriptionHub<ProgressEvent>>,
        dataset_hub: Arc<SubscriptionHub<DatasetEvent>>,
        datasets: Arc<DatasetService>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            pool,
            job_hub,
            dataset_hub,
            datasets,
            identity,
        }
    }

    /// Build the whole component graph from a validated configuration
    /// plus the injected trainer, search backend and identity provider.
    pub fn bootstrap(
        config: OrchestratorConfig,
        trainer: Arc<dyn Trainer>,
        backend: Arc<dyn SearchBackend>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let store = Arc::new(JobStore::new());
        let job_hub = Arc::new(SubscriptionHub::new(config.subscriber_send_timeout));
        let dataset_hub = Arc::new(SubscriptionHub::new(config.subscriber_send_timeout));
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&store),
            Arc::clone(&job_hub),
            trainer,
            PoolConfig::from(&config),
        ));
        let datasets = Arc::new(DatasetService::new(
            Arc::new(DatasetStore::new()),
            backend,
            Arc::clone(&dataset_hub),
            &config,
        ));

        info!(
            "Orchestrator assembled (max_concurrent_jobs={})",
            config.max_concurrent_jobs
        );
        Ok(Arc::new(Self::new(
            store,
            pool,
            job_hub,
            dataset_hub,
            datasets,
            identity,
        )))
    }

    /// Start the worker pool.
    pub fn start(&self) -> Result<(), ApiError> {
        self.pool.start().map_err(map_pool_error)
    }

    /// Stop the worker pool, waiting out the grace period.
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Validate and submit a training job; returns the Queued snapshot.
    pub async fn submit_job(&self, request: SubmitJobRequest) -> Result<Job, ApiError> {
        if request.config_ref.trim().is_empty() {
            return Err(ApiError::validation(
                "invalid_reference: config_ref must not be empty",
            ));
        }
        if let Some(dataset_ref) = &request.dataset_ref {
            if dataset_ref.trim().is_empty() {
                return Err(ApiError::validation(
                    "invalid_reference: dataset_ref must not be empty",
                ));
            }
        }

        let job = self.store.create(
            request.kind,
            request.config_ref,
            request.dataset_ref,
            request.priority,
            request.tags,
        );
        self.pool.submit(&job.id).await.map_err(map_pool_error)
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, ApiError> {
        self.store
            .get(id)
            .ok_or_else(|| ApiError::not_found(format!("job {}", id)))
    }

    pub fn list_jobs(
        &self,
        state: Option<JobState>,
        limit: Option<usize>,
    ) -> Result<ListJobsResponse, ApiError> {
        let limit = validate_limit(limit)?;
        Ok(ListJobsResponse {
            jobs: self.store.list(state, limit),
            totals: self.store.totals(),
        })
    }

    pub async fn cancel_job(&self, id: &JobId) -> Result<CancelJobResponse, ApiError> {
        self.pool.cancel(id).await.map_err(map_pool_error)
    }

    /// Open a live-tail subscription to job progress events.
    pub fn subscribe_jobs(&self) -> Subscription<ProgressEvent> {
        self.job_hub.register()
    }

    pub fn unsubscribe_jobs(&self, id: SubscriberId) -> bool {
        self.job_hub.unregister(id)
    }

    // ------------------------------------------------------------------
    // Datasets
    // ------------------------------------------------------------------

    /// Validate the request, create a Pending record, and launch the
    /// build as a background task. Returns the Pending snapshot.
    pub fn create_dataset(
        &self,
        request: CreateDatasetRequest,
        token: Option<&str>,
    ) -> Result<DatasetRecord, ApiError> {
        validate_dataset_request(&request)?;

        let identity = self.identity.resolve(token);
        let record = self.datasets.create(
            request.name,
            request.description,
            identity.email,
            request.query,
        );

        // Keep request order, drop repeated formats.
        let mut formats = Vec::with_capacity(request.export_formats.len());
        for format in request.export_formats {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }

        let datasets = Arc::clone(&self.datasets);
        let id = record.id.clone();
        tokio::spawn(async move {
            datasets.process(&id, &formats).await;
        });

        Ok(record)
    }

    pub fn get_dataset(&self, id: &DatasetId) -> Result<DatasetRecord, ApiError> {
        self.datasets
            .get(id)
            .ok_or_else(|| ApiError::not_found(format!("dataset {}", id)))
    }

    pub fn list_datasets(
        &self,
        state: Option<DatasetState>,
        limit: Option<usize>,
    ) -> Result<DatasetListResponse, ApiError> {
        let limit = validate_limit(limit)?;
        Ok(DatasetListResponse {
            datasets: self.datasets.list(state, limit),
        })
    }

    /// Open a live-tail subscription to dataset build events.
    pub fn subscribe_datasets(&self) -> Subscription<DatasetEvent> {
        self.dataset_hub.register()
    }
}

fn validate_limit(limit: Option<usize>) -> Result<usize, ApiError> {
    let limit = limit.unwrap_or(defaults::DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > defaults::MAX_LIST_LIMIT {
        return Err(ApiError::validation(format!(
            "limit must be in 1..={}",
            defaults::MAX_LIST_LIMIT
        )));
    }
    Ok(limit)
}

fn validate_dataset_request(request: &CreateDatasetRequest) -> Result<(), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("invalid_query: name must not be empty"));
    }
    if request.query.query_text.trim().is_empty() {
        return Err(ApiError::validation(
            "invalid_query: query_text must not be empty",
        ));
    }
    if request.query.top_k == 0 {
        return Err(ApiError::validation("invalid_query: top_k must be >= 1"));
    }
    if let Some(min_quality) = request.query.min_quality_score {
        if !(0.0..=1.0).contains(&min_quality) {
            return Err(ApiError::validation(
                "invalid_query: min_quality_score must be in [0, 1]",
            ));
        }
    }
    if request.query.weights.values().any(|w| *w < 0.0) {
        return Err(ApiError::validation(
            "invalid_query: weights must be non-negative",
        ));
    }
    if request.export_formats.is_empty() {
        return Err(ApiError::validation(
            "unsupported_format: at least one export format is required",
        ));
    }
    Ok(())
}

fn map_pool_error(err: PoolError) -> ApiError {
    match err {
        PoolError::NotFound(id) => ApiError::not_found(format!("job {}", id)),
        PoolError::NotPending { id, state } => {
            ApiError::state_conflict(format!("job {} is {}", id, state))
        }
        PoolError::ShuttingDown | PoolError::AlreadyStopped => ApiError::ShuttingDown,
    }
}
