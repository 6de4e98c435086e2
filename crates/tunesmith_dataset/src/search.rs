//! Search backend interface.
//!
//! The hybrid-search backend is an external collaborator: it returns
//! ranked documents in batches over a bounded channel, so a slow
//! pipeline backpressures the source instead of buffering the corpus.
//! Which implementation backs the trait is a configuration decision.

use std::io::BufRead;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use tunesmith_protocol::{defaults, ScoredDocument, SearchQuery};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search backend error: {0}")]
    Backend(String),

    #[error("corpus not readable: {0}")]
    Corpus(String),
}

/// One ranked batch of documents.
pub type DocumentBatch = Vec<ScoredDocument>;

/// Receiving side of a backend stream. Each item is a batch or the
/// error that ended the stream.
pub type BatchReceiver = mpsc::Receiver<Result<DocumentBatch, SearchError>>;

/// An async source of ranked documents.
pub trait SearchBackend: Send + Sync {
    /// Stream documents matching `query`, already ranked, bounded by
    /// `query.top_k`. Must be called from within a tokio runtime.
    fn stream(&self, query: &SearchQuery) -> BatchReceiver;
}

/// Backend serving a fixed in-memory corpus.
///
/// Ranks by score, applies metadata filters, chunks into batches. Used
/// by tests and by the CLI's corpus-file mode; the failure knob lets
/// tests exercise mid-stream source errors.
pub struct StaticBackend {
    documents: Vec<ScoredDocument>,
    batch_size: usize,
    fail_after: Option<usize>,
}

impl StaticBackend {
    pub fn new(documents: Vec<ScoredDocument>) -> Self {
        Self {
            documents,
            batch_size: defaults::DEFAULT_PIPELINE_BATCH_SIZE,
            fail_after: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Error out the stream after `n` documents have been sent.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Load a corpus from a JSONL file of [`ScoredDocument`] objects.
    pub fn from_jsonl_file(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| SearchError::Corpus(format!("{}: {}", path.display(), e)))?;
        let reader = std::io::BufReader::new(file);

        let mut documents = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SearchError::Corpus(format!("{}: {}", path.display(), e)))?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: ScoredDocument = serde_json::from_str(&line).map_err(|e| {
                SearchError::Corpus(format!("{} line {}: {}", path.display(), line_no + 1, e))
            })?;
            documents.push(doc);
        }
        debug!("Loaded {} corpus documents from {}", documents.len(), path.display());
        Ok(Self::new(documents))
    }
}

impl SearchBackend for StaticBackend {
    fn stream(&self, query: &SearchQuery) -> BatchReceiver {
        let mut docs: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter(|doc| matches_filters(doc, query))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        docs.truncate(query.top_k);

        let (tx, rx) = mpsc::channel(defaults::SOURCE_CHANNEL_CAPACITY);
        let batch_size = self.batch_size;
        let fail_after = self.fail_after;

        tokio::spawn(async move {
            let mut sent = 0usize;
            for chunk in docs.chunks(batch_size) {
                if let Some(limit) = fail_after {
                    if sent + chunk.len() > limit {
                        let keep = limit.saturating_sub(sent);
                        if keep > 0 && tx.send(Ok(chunk[..keep].to_vec())).await.is_err() {
                            return;
                        }
                        let _ = tx
                            .send(Err(SearchError::Backend(
                                "search stream interrupted".to_string(),
                            )))
                            .await;
                        return;
                    }
                }
                sent += chunk.len();
                if tx.send(Ok(chunk.to_vec())).await.is_err() {
                    // Consumer went away; stop producing.
                    return;
                }
            }
        });

        rx
    }
}

/// A document matches when every filter key equals the document's
/// `source` or a metadata field, compared as strings.
fn matches_filters(doc: &ScoredDocument, query: &SearchQuery) -> bool {
    query.filters.iter().all(|(key, expected)| {
        if key == "source" {
            return doc.source == *expected;
        }
        match doc.metadata.get(key) {
            Some(serde_json::Value::String(s)) => s == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        }
    })
}
