//! Export fan-out: per-format writers for training records.
//!
//! Every exporter stages its output as a hidden `.tmp` file and renames
//! it into place on commit, so a failed build never leaves a
//! half-written file under a final name. Partial temp files stay on
//! disk for inspection but are never surfaced in `export_paths`.

mod csv;
mod json;
mod jsonl;
mod parquet;

pub use self::csv::CsvExporter;
pub use self::json::JsonExporter;
pub use self::jsonl::JsonlExporter;
pub use self::parquet::ParquetExporter;

use std::path::{Path, PathBuf};
use thiserror::Error;
use tunesmith_protocol::{DatasetRecord, ExportFormat, TrainingRecord};

/// Errors raised by export planning and writing.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("csv write failed: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
}

/// Streaming writer for one export format.
pub trait RecordExporter: Send {
    fn format(&self) -> ExportFormat;

    fn write(&mut self, record: &TrainingRecord) -> Result<(), ExportError>;

    /// Close the writer and commit the staged file into place.
    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError>;
}

/// Open the exporter for one format under `dir`.
pub fn open_exporter(
    format: ExportFormat,
    dir: &Path,
    dataset: &DatasetRecord,
    batch_size: usize,
) -> Result<Box<dyn RecordExporter>, ExportError> {
    Ok(match format {
        ExportFormat::Jsonl => Box::new(JsonlExporter::open(dir, dataset)?),
        ExportFormat::Json => Box::new(JsonExporter::open(dir, dataset)?),
        ExportFormat::Csv => Box::new(CsvExporter::open(dir, dataset)?),
        ExportFormat::Parquet => Box::new(ParquetExporter::open(dir, dataset, batch_size)?),
    })
}

/// Filename for one export: `{safe_name}_{16-hex digest}.{ext}`.
///
/// The digest prefix keeps files from distinct datasets with the same
/// name from colliding.
pub fn export_filename(name: &str, dataset_id: &str, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        safe_name(name),
        dataset_prefix(dataset_id),
        extension
    )
}

fn dataset_prefix(dataset_id: &str) -> String {
    blake3::hash(dataset_id.as_bytes()).to_hex()[..16].to_string()
}

/// Replace anything outside `[A-Za-z0-9_-]` so names are path-safe.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Temp-file staging shared by all exporters.
pub(crate) struct StagedFile {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedFile {
    pub(crate) fn new(dir: &Path, filename: &str) -> Result<Self, ExportError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            temp_path: dir.join(format!(".{}.tmp", filename)),
            final_path: dir.join(filename),
        })
    }

    pub(crate) fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Promote the temp file to its final name.
    pub(crate) fn commit(self) -> Result<PathBuf, ExportError> {
        std::fs::rename(&self.temp_path, &self.final_path)?;
        Ok(self.final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("pv-corpus_v2"), "pv-corpus_v2");
        assert_eq!(safe_name("solar permits (2024)"), "solar_permits__2024_");
    }

    #[test]
    fn test_export_filename_shape() {
        let filename = export_filename("corpus", "abc-123", "jsonl");
        assert!(filename.starts_with("corpus_"));
        assert!(filename.ends_with(".jsonl"));
        let digest = &filename["corpus_".len()..filename.len() - ".jsonl".len()];
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_export_filename_deterministic() {
        assert_eq!(
            export_filename("a", "id-1", "csv"),
            export_filename("a", "id-1", "csv")
        );
        assert_ne!(
            export_filename("a", "id-1", "csv"),
            export_filename("a", "id-2", "csv")
        );
    }

    #[test]
    fn test_staged_file_commit() {
        let temp = tempfile::TempDir::new().unwrap();
        let staged = StagedFile::new(temp.path(), "out.jsonl").unwrap();
        std::fs::write(staged.temp_path(), b"data").unwrap();

        let path = staged.commit().unwrap();
        assert_eq!(path, temp.path().join("out.jsonl"));
        assert_eq!(std::fs::read(path).unwrap(), b"data");
    }
}
