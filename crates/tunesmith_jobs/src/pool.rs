//! Worker Pool - bounded concurrent execution of training jobs.
//!
//! Up to `max_concurrent` workers drain a FIFO admission queue. Each
//! worker is a tokio task; the blocking trainer invocation runs under
//! `spawn_blocking`, with per-epoch progress forwarded back to the
//! worker through a channel so state updates and event publishes stay
//! on the async side.
//!
//! Cancellation covers Pending and Queued jobs only. A queued job that
//! was cancelled is discarded at pickup. In-flight trainer invocations
//! are never terminated: `stop()` waits up to the grace period per
//! worker and then abandons stragglers, leaving their jobs Running.

use crate::hub::SubscriptionHub;
use crate::metrics::METRICS;
use crate::store::{JobStore, StoreError};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tunesmith_protocol::api_types::CancelJobResponse;
use tunesmith_protocol::{
    defaults, Job, JobId, JobProgress, JobState, OrchestratorConfig, ProgressEvent,
};
use tunesmith_trainer::{TrainRequest, Trainer};

/// Signal checked by workers between queue polls.
///
/// Uses an AtomicBool internally. Clone is cheap and shares state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Errors raised by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is {state}, expected pending")]
    NotPending { id: JobId, state: JobState },

    #[error("worker pool is shutting down")]
    ShuttingDown,

    #[error("worker pool was stopped and cannot be restarted")]
    AlreadyStopped,
}

/// Pool configuration, extracted from the orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    /// How long stop() waits for each in-flight worker.
    pub grace_period: Duration,
    /// Root directory handed to trainers for adapter output.
    pub output_dir: PathBuf,
    /// Jobs whose dataset file exceeds this are failed before dispatch.
    pub max_dataset_bytes: u64,
}

impl From<&OrchestratorConfig> for PoolConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_jobs,
            grace_period: config.worker_grace_period,
            output_dir: config.output_root.clone(),
            max_dataset_bytes: config.max_file_size,
        }
    }
}

/// A queued job reference plus its admission timestamp.
struct QueueItem {
    job_id: JobId,
    admitted_at: DateTime<Utc>,
}

/// Bounded pool of concurrent training workers.
pub struct WorkerPool {
    store: Arc<JobStore>,
    hub: Arc<SubscriptionHub<ProgressEvent>>,
    trainer: Arc<dyn Trainer>,
    config: PoolConfig,
    queue_tx: mpsc::Sender<QueueItem>,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    shutdown: ShutdownToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        store: Arc<JobStore>,
        hub: Arc<SubscriptionHub<ProgressEvent>>,
        trainer: Arc<dyn Trainer>,
        config: PoolConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(defaults::JOB_QUEUE_CAPACITY);
        Self {
            store,
            hub,
            trainer,
            config,
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            shutdown: ShutdownToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the worker tasks. Idempotent while running; fails once the
    /// pool has been stopped.
    pub fn start(&self) -> Result<(), PoolError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyStopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut workers = self.workers.lock().expect("worker handle lock poisoned");
        for worker_id in 0..self.config.max_concurrent {
            let store = Arc::clone(&self.store);
            let hub = Arc::clone(&self.hub);
            let trainer = Arc::clone(&self.trainer);
            let queue_rx = Arc::clone(&self.queue_rx);
            let shutdown = self.shutdown.clone();
            let config = self.config.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, store, hub, trainer, queue_rx, shutdown, config).await;
            }));
        }
        info!("Started {} workers", self.config.max_concurrent);
        Ok(())
    }

    /// Signal workers to exit after their current job and wait up to the
    /// grace period for each. Stragglers are abandoned, not killed.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            if tokio::time::timeout(self.config.grace_period, handle)
                .await
                .is_err()
            {
                warn!("Worker did not finish within grace period; abandoning");
            }
        }
        info!("Worker pool stopped");
    }

    /// Admit a Pending job to the queue. The transition to Queued is
    /// linearized by the store; the queue send backpressures once the
    /// admission queue is full.
    pub async fn submit(&self, job_id: &JobId) -> Result<Job, PoolError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }

        let job = match self
            .store
            .transition(job_id, JobState::Pending, |j| j.mark_queued())
        {
            Ok(job) => job,
            Err(StoreError::NotFound(id)) => return Err(PoolError::NotFound(id)),
            Err(StoreError::UnexpectedState { id, actual, .. }) => {
                return Err(PoolError::NotPending { id, state: actual })
            }
            Err(StoreError::IllegalTransition { id, from, .. }) => {
                return Err(PoolError::NotPending { id, state: from })
            }
        };
        self.hub.publish(&ProgressEvent::from_job(&job)).await;

        let item = QueueItem {
            job_id: job_id.clone(),
            admitted_at: Utc::now(),
        };
        if self.queue_tx.send(item).await.is_err() {
            // Queue closed: shutdown raced the admission.
            return Err(PoolError::ShuttingDown);
        }
        METRICS.inc_jobs_submitted();
        info!("Job queued: {}", job_id);
        Ok(job)
    }

    /// Cancel a Pending or Queued job. Running and terminal jobs are not
    /// cancellable; the response carries the state actually observed.
    pub async fn cancel(&self, job_id: &JobId) -> Result<CancelJobResponse, PoolError> {
        for expected in [JobState::Pending, JobState::Queued] {
            match self
                .store
                .transition(job_id, expected, |j| j.mark_cancelled())
            {
                Ok(updated) => {
                    self.hub.publish(&ProgressEvent::from_job(&updated)).await;
                    METRICS.inc_jobs_cancelled();
                    info!("Job cancelled: {}", job_id);
                    return Ok(CancelJobResponse {
                        cancelled: true,
                        current_state: updated.state,
                    });
                }
                Err(StoreError::UnexpectedState { .. }) => continue,
                Err(StoreError::NotFound(id)) => return Err(PoolError::NotFound(id)),
                Err(StoreError::IllegalTransition { from, .. }) => {
                    return Ok(CancelJobResponse {
                        cancelled: false,
                        current_state: from,
                    })
                }
            }
        }

        // Neither Pending nor Queued: not cancellable.
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| PoolError::NotFound(job_id.clone()))?;
        Ok(CancelJobResponse {
            cancelled: false,
            current_state: job.state,
        })
    }
}

/// One worker: poll the queue with a bounded wait, run jobs, repeat
/// until shutdown. Worker-internal errors fail the affected job and
/// never take the loop down.
async fn worker_loop(
    worker_id: usize,
    store: Arc<JobStore>,
    hub: Arc<SubscriptionHub<ProgressEvent>>,
    trainer: Arc<dyn Trainer>,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    shutdown: ShutdownToken,
    config: PoolConfig,
) {
    debug!("Worker {} active", worker_id);
    let poll_interval = Duration::from_millis(defaults::WORKER_POLL_INTERVAL_MS);

    loop {
        if shutdown.is_shutdown() {
            break;
        }

        let item = {
            let mut rx = queue_rx.lock().await;
            match tokio::time::timeout(poll_interval, rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => continue,
            }
        };

        let job_id = item.job_id.clone();
        if let Err(e) = run_job(worker_id, &store, &hub, &trainer, &config, item).await {
            error!("Worker {} internal error on job {}: {:#}", worker_id, job_id, e);
            if let Ok(failed) =
                store.update(&job_id, |j| j.mark_failed(format!("internal worker error: {e:#}")))
            {
                hub.publish(&ProgressEvent::from_job(&failed)).await;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Execute one queue item through the trainer and record the outcome.
async fn run_job(
    worker_id: usize,
    store: &Arc<JobStore>,
    hub: &Arc<SubscriptionHub<ProgressEvent>>,
    trainer: &Arc<dyn Trainer>,
    config: &PoolConfig,
    item: QueueItem,
) -> anyhow::Result<()> {
    let job_id = item.job_id;

    // Pickup is a compare-and-transition: items cancelled while queued
    // fail the state check and are discarded without running.
    let queue_wait = (Utc::now() - item.admitted_at).num_milliseconds();
    let job = match store.transition(&job_id, JobState::Queued, |j| j.mark_running(worker_id)) {
        Ok(job) => job,
        Err(StoreError::UnexpectedState { actual, .. }) => {
            debug!("Discarding queue item for {} ({} at pickup)", job_id, actual);
            return Ok(());
        }
        Err(StoreError::NotFound(_)) => {
            warn!("Dequeued unknown job {}", job_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Worker {} starts job {} after {}ms in queue",
        worker_id, job_id, queue_wait
    );
    hub.publish(&ProgressEvent::from_job(&job)).await;

    // Oversized dataset inputs are rejected up front.
    if let Some(dataset) = &job.dataset_ref {
        if let Ok(meta) = std::fs::metadata(dataset) {
            if meta.len() > config.max_dataset_bytes {
                let failed = store.update(&job_id, |j| {
                    j.mark_failed(format!(
                        "dataset {} exceeds max input size ({} > {} bytes)",
                        dataset,
                        meta.len(),
                        config.max_dataset_bytes
                    ))
                })?;
                hub.publish(&ProgressEvent::from_job(&failed)).await;
                return Ok(());
            }
        }
    }

    let request = TrainRequest {
        job_id: job_id.clone(),
        kind: job.kind,
        config_ref: job.config_ref.clone(),
        dataset_ref: job.dataset_ref.clone(),
        output_dir: config.output_dir.clone(),
    };

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<JobProgress>();
    let trainer = Arc::clone(trainer);
    let mut handle = tokio::task::spawn_blocking(move || {
        trainer.run(
            request,
            Box::new(move |progress| {
                let _ = progress_tx.send(progress);
            }),
        )
    });

    // Apply interim progress while the trainer runs.
    let result = loop {
        tokio::select! {
            res = &mut handle => break res,
            Some(progress) = progress_rx.recv() => {
                if let Ok(updated) = store.update(&job_id, |j| {
                    if j.state == JobState::Running {
                        j.progress = progress.clone();
                        // Percent 100 is reserved for completion.
                        j.progress.percent = j.progress.percent.clamp(0.0, 99.9);
                    }
                }) {
                    hub.publish(&ProgressEvent::from_job(&updated)).await;
                }
            }
        }
    };

    match result {
        Ok(Ok(outcome)) => {
            let updated = store.update(&job_id, |j| {
                j.mark_completed(outcome.artifact_ref.clone(), outcome.metrics.clone())
            })?;
            METRICS.inc_jobs_completed();
            info!("Job completed: {}", job_id);
            hub.publish(&ProgressEvent::from_job(&updated)).await;
        }
        Ok(Err(trainer_err)) => {
            let updated = store.update(&job_id, |j| j.mark_failed(trainer_err.to_string()))?;
            METRICS.inc_jobs_failed();
            warn!("Job failed: {} - {}", job_id, trainer_err);
            hub.publish(&ProgressEvent::from_job(&updated)).await;
        }
        Err(join_err) => {
            let updated =
                store.update(&job_id, |j| j.mark_failed(format!("trainer panicked: {join_err}")))?;
            METRICS.inc_jobs_failed();
            error!("Trainer panicked for job {}: {}", job_id, join_err);
            hub.publish(&ProgressEvent::from_job(&updated)).await;
        }
    }

    Ok(())
}
