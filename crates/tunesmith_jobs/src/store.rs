//! Job Store - sole authority for job-state reads and writes.
//!
//! Callers only ever receive snapshots (value clones); all mutation goes
//! through [`JobStore::update`], which serializes concurrent updates on
//! the same job and rejects transitions outside the state machine.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use tunesmith_protocol::{Job, JobId, JobState, JobTotals, TrainerKind};

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("illegal transition {from} -> {to} for job {id}")]
    IllegalTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("job {id} is {actual}, expected {expected}")]
    UnexpectedState {
        id: JobId,
        expected: JobState,
        actual: JobState,
    },
}

/// In-memory job store.
///
/// # Lock Invariant
///
/// The map mutex is held only for map operations and clones, never
/// across I/O or an await point.
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new Pending job and return its snapshot.
    pub fn create(
        &self,
        kind: TrainerKind,
        config_ref: impl Into<String>,
        dataset_ref: Option<String>,
        priority: i32,
        tags: Vec<String>,
    ) -> Job {
        let job = Job::new(kind, config_ref, dataset_ref, priority, tags);
        let snapshot = job.clone();
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .insert(job.id.clone(), job);
        debug!("Created job {} ({})", snapshot.id, snapshot.kind);
        snapshot
    }

    /// Get a snapshot of a job.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .get(id)
            .cloned()
    }

    /// List job snapshots, newest first, optionally filtered by state.
    pub fn list(&self, state: Option<JobState>, limit: usize) -> Vec<Job> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|job| state.map_or(true, |s| job.state == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        result
    }

    /// Count jobs per state.
    pub fn totals(&self) -> JobTotals {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        let mut totals = JobTotals::default();
        for job in jobs.values() {
            totals.record(job.state);
        }
        totals
    }

    /// Apply a mutation under the per-job guard and return the updated
    /// snapshot. A mutation that changes state along an edge outside the
    /// state machine is rejected wholesale (the job is left untouched).
    pub fn update<F>(&self, id: &JobId, mutate: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let from = job.state;
        let mut candidate = job.clone();
        mutate(&mut candidate);

        if candidate.state != from && !from.can_transition(candidate.state) {
            return Err(StoreError::IllegalTransition {
                id: id.clone(),
                from,
                to: candidate.state,
            });
        }

        *job = candidate;
        Ok(job.clone())
    }

    /// Like [`update`](Self::update), but only if the job is currently in
    /// `expected`. This is the compare-and-transition used by submit,
    /// pickup and cancel so concurrent actors cannot double-apply a
    /// transition.
    pub fn transition<F>(
        &self,
        id: &JobId,
        expected: JobState,
        mutate: F,
    ) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if job.state != expected {
            return Err(StoreError::UnexpectedState {
                id: id.clone(),
                expected,
                actual: job.state,
            });
        }

        let mut candidate = job.clone();
        mutate(&mut candidate);

        if candidate.state != expected && !expected.can_transition(candidate.state) {
            return Err(StoreError::IllegalTransition {
                id: id.clone(),
                from: expected,
                to: candidate.state,
            });
        }

        *job = candidate;
        Ok(job.clone())
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
