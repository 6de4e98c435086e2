//! The streaming build pipeline.
//!
//! One traversal of the source feeds every requested export format:
//! source batches flatten to documents, the quality filter and optional
//! dedup drop what should not train, exporters write survivors, and the
//! statistics accumulate along the way. Backpressure falls out of the
//! bounded source channel: a slow exporter slows the whole pass.

use crate::export::{open_exporter, ExportError, RecordExporter};
use crate::filter::ContentFilter;
use crate::search::{SearchBackend, SearchError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use tunesmith_protocol::{DatasetRecord, DatasetStats, ExportFormat};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source stage failed: {0}")]
    Source(#[from] SearchError),

    #[error("export stage failed: {0}")]
    Export(#[from] ExportError),
}

/// Stage configuration shared by all builds of one service.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows buffered per Parquet flush.
    pub batch_size: usize,
    pub dedup_enabled: bool,
    /// Quality floor used when a query does not carry its own.
    pub quality_threshold: f64,
    /// Extra content/safety heuristics, when enabled.
    pub content_filter: Option<ContentFilter>,
}

/// What a completed pass produced.
#[derive(Debug)]
pub struct PipelineOutput {
    pub stats: DatasetStats,
    pub export_paths: HashMap<ExportFormat, PathBuf>,
    pub filtered_out: u64,
    pub duplicates: u64,
}

/// Run one single-pass build for `record` into `export_dir`.
pub async fn run(
    record: &DatasetRecord,
    backend: &dyn SearchBackend,
    formats: &[ExportFormat],
    export_dir: &Path,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let min_quality = record
        .query
        .min_quality_score
        .unwrap_or(config.quality_threshold);

    let mut exporters: Vec<Box<dyn RecordExporter>> = Vec::with_capacity(formats.len());
    for format in formats {
        exporters.push(open_exporter(*format, export_dir, record, config.batch_size)?);
    }

    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut document_count: u64 = 0;
    let mut total_tokens: u64 = 0;
    let mut quality_sum: f64 = 0.0;
    let mut filtered_out: u64 = 0;
    let mut duplicates: u64 = 0;
    let mut taken: usize = 0;

    let mut batches = backend.stream(&record.query);
    'stream: while let Some(batch) = batches.recv().await {
        let batch = batch?;
        for doc in batch {
            if taken >= record.query.top_k {
                break 'stream;
            }
            taken += 1;

            if doc.quality_score < min_quality {
                filtered_out += 1;
                continue;
            }
            if let Some(filter) = &config.content_filter {
                let verdict = filter.assess(&doc.content);
                if !verdict.accept {
                    debug!(
                        "Content filter dropped {}: {:?}",
                        doc.document_id, verdict.reasons
                    );
                    filtered_out += 1;
                    continue;
                }
            }
            if config.dedup_enabled && !seen.insert(content_key(&doc.content)) {
                duplicates += 1;
                continue;
            }

            let training_record = doc.to_training_record();
            for exporter in &mut exporters {
                exporter.write(&training_record)?;
            }

            document_count += 1;
            total_tokens += doc.token_count_or_estimate();
            quality_sum += doc.quality_score;
        }
    }
    // Drop the receiver before committing so the source task stops.
    drop(batches);

    let mut export_paths = HashMap::new();
    for exporter in exporters {
        let format = exporter.format();
        let path = exporter.finish()?;
        export_paths.insert(format, path);
    }

    let stats = DatasetStats {
        document_count,
        total_tokens,
        avg_quality_score: if document_count > 0 {
            quality_sum / document_count as f64
        } else {
            0.0
        },
    };
    info!(
        "Build {} done: {} documents kept, {} below quality {}, {} duplicates",
        record.id, document_count, filtered_out, min_quality, duplicates
    );
    debug!("Stats for {}: {:?}", record.id, stats);

    Ok(PipelineOutput {
        stats,
        export_paths,
        filtered_out,
        duplicates,
    })
}

/// Dedup key: content lowercased with whitespace collapsed, hashed so
/// the set holds 32 bytes per unique document instead of the text.
fn content_key(content: &str) -> [u8; 32] {
    let mut normalized = String::with_capacity(content.len());
    for token in content.to_lowercase().split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(token);
    }
    *blake3::hash(normalized.as_bytes()).as_bytes()
}
