//! Dataset Builder
//!
//! Turns a search specification into training-ready files. Documents
//! stream from the search backend through quality filtering, optional
//! deduplication and a multi-format export fan-out in a single pass; no
//! stage ever holds the full corpus in memory. The dataset record moves
//! through Pending -> Processing -> Completed/Failed as the build runs.

pub mod export;
pub mod filter;
pub mod pipeline;
pub mod search;
pub mod service;
pub mod store;

pub use export::{export_filename, ExportError};
pub use filter::{ContentFilter, FilterVerdict};
pub use pipeline::{PipelineConfig, PipelineError, PipelineOutput};
pub use search::{BatchReceiver, SearchBackend, SearchError, StaticBackend};
pub use service::DatasetService;
pub use store::{DatasetStore, DatasetStoreError};
