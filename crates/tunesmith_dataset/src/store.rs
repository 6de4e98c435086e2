//! Dataset Store - guarded in-memory dataset records.
//!
//! Same contract as the job store: snapshots out, all mutation through
//! `update`, transitions validated against the dataset state machine.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;
use tunesmith_protocol::{DatasetId, DatasetRecord, DatasetState, SearchQuery};

#[derive(Debug, Error)]
pub enum DatasetStoreError {
    #[error("dataset not found: {0}")]
    NotFound(DatasetId),

    #[error("illegal transition {from} -> {to} for dataset {id}")]
    IllegalTransition {
        id: DatasetId,
        from: DatasetState,
        to: DatasetState,
    },
}

/// In-memory dataset store. The lock is held only for map operations.
pub struct DatasetStore {
    datasets: Mutex<HashMap<DatasetId, DatasetRecord>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self {
            datasets: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new Pending record and return its snapshot.
    pub fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
        query: SearchQuery,
    ) -> DatasetRecord {
        let record = DatasetRecord::new(name, description, created_by, query);
        let snapshot = record.clone();
        self.datasets
            .lock()
            .expect("dataset store lock poisoned")
            .insert(record.id.clone(), record);
        debug!("Created dataset {} ({})", snapshot.id, snapshot.name);
        snapshot
    }

    pub fn get(&self, id: &DatasetId) -> Option<DatasetRecord> {
        self.datasets
            .lock()
            .expect("dataset store lock poisoned")
            .get(id)
            .cloned()
    }

    /// List dataset snapshots, newest first, optionally filtered by state.
    pub fn list(&self, state: Option<DatasetState>, limit: usize) -> Vec<DatasetRecord> {
        let datasets = self.datasets.lock().expect("dataset store lock poisoned");
        let mut result: Vec<DatasetRecord> = datasets
            .values()
            .filter(|d| state.map_or(true, |s| d.state == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        result
    }

    /// Apply a mutation under the guard; state changes must follow the
    /// Pending -> Processing -> Completed/Failed machine.
    pub fn update<F>(&self, id: &DatasetId, mutate: F) -> Result<DatasetRecord, DatasetStoreError>
    where
        F: FnOnce(&mut DatasetRecord),
    {
        let mut datasets = self.datasets.lock().expect("dataset store lock poisoned");
        let record = datasets
            .get_mut(id)
            .ok_or_else(|| DatasetStoreError::NotFound(id.clone()))?;

        let from = record.state;
        let mut candidate = record.clone();
        mutate(&mut candidate);

        if candidate.state != from && !from.can_transition(candidate.state) {
            return Err(DatasetStoreError::IllegalTransition {
                id: id.clone(),
                from,
                to: candidate.state,
            });
        }

        *record = candidate;
        Ok(record.clone())
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new()
    }
}
