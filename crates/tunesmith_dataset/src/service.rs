//! Dataset Service - record lifecycle around the build pipeline.
//!
//! Creation returns a Pending snapshot immediately; `process` is meant
//! to run as a background task and walks the record through
//! Processing to Completed or Failed, publishing a dataset event at
//! every transition.

use crate::pipeline::{self, PipelineConfig};
use crate::search::SearchBackend;
use crate::store::DatasetStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tunesmith_jobs::SubscriptionHub;
use tunesmith_protocol::{
    DatasetEvent, DatasetId, DatasetRecord, DatasetState, ExportFormat, OrchestratorConfig,
    SearchQuery,
};

pub struct DatasetService {
    store: Arc<DatasetStore>,
    backend: Arc<dyn SearchBackend>,
    hub: Arc<SubscriptionHub<DatasetEvent>>,
    export_root: PathBuf,
    pipeline: PipelineConfig,
}

impl DatasetService {
    pub fn new(
        store: Arc<DatasetStore>,
        backend: Arc<dyn SearchBackend>,
        hub: Arc<SubscriptionHub<DatasetEvent>>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            backend,
            hub,
            export_root: config.export_root.clone(),
            pipeline: PipelineConfig {
                batch_size: config.pipeline_batch_size,
                dedup_enabled: config.dedup_enabled,
                quality_threshold: config.quality_threshold,
                content_filter: config
                    .content_filter_enabled
                    .then(crate::filter::ContentFilter::new),
            },
        }
    }

    /// Create a Pending dataset record.
    pub fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
        query: SearchQuery,
    ) -> DatasetRecord {
        self.store.create(name, description, created_by, query)
    }

    pub fn get(&self, id: &DatasetId) -> Option<DatasetRecord> {
        self.store.get(id)
    }

    pub fn list(&self, state: Option<DatasetState>, limit: usize) -> Vec<DatasetRecord> {
        self.store.list(state, limit)
    }

    /// Run the build for one record. Intended to be spawned as a
    /// background task right after `create`.
    pub async fn process(&self, id: &DatasetId, formats: &[ExportFormat]) {
        let record = match self
            .store
            .update(id, |d| d.state = DatasetState::Processing)
        {
            Ok(record) => record,
            Err(e) => {
                error!("Cannot start dataset build {}: {}", id, e);
                return;
            }
        };
        info!("Processing dataset {} ({})", record.id, record.name);
        self.hub.publish(&DatasetEvent::from_record(&record)).await;

        let export_dir = self.export_root.join(id.as_ref());
        let result = pipeline::run(
            &record,
            self.backend.as_ref(),
            formats,
            &export_dir,
            &self.pipeline,
        )
        .await;

        let updated = match result {
            Ok(output) => self.store.update(id, |d| {
                d.state = DatasetState::Completed;
                d.stats = Some(output.stats.clone());
                d.export_paths = output.export_paths.clone();
            }),
            Err(e) => {
                // Partial temp files stay on disk; export_paths stays empty.
                error!("Dataset build failed: {} - {}", id, e);
                self.store.update(id, |d| {
                    d.state = DatasetState::Failed;
                    d.error = Some(e.to_string());
                })
            }
        };

        match updated {
            Ok(record) => {
                info!("Dataset {} is {}", record.id, record.state);
                self.hub.publish(&DatasetEvent::from_record(&record)).await;
            }
            Err(e) => error!("Failed to record build outcome for {}: {}", id, e),
        }
    }
}
