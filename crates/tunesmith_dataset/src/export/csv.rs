//! CSV exporter: fixed header, standard quoting, UTF-8.
//!
//! Only the flat columns are exported; nested metadata stays in the
//! JSON-bearing formats.

use super::{export_filename, ExportError, RecordExporter, StagedFile};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tunesmith_protocol::{DatasetRecord, ExportFormat, TrainingRecord};

const HEADER: [&str; 5] = [
    "document_id",
    "text",
    "source",
    "quality_score",
    "relevance_score",
];

pub struct CsvExporter {
    staged: StagedFile,
    writer: csv::Writer<File>,
    rows: u64,
}

impl CsvExporter {
    pub fn open(dir: &Path, dataset: &DatasetRecord) -> Result<Self, ExportError> {
        let filename = export_filename(&dataset.name, dataset.id.as_ref(), "csv");
        let staged = StagedFile::new(dir, &filename)?;
        let mut writer = csv::Writer::from_writer(File::create(staged.temp_path())?);
        writer.write_record(HEADER)?;
        Ok(Self {
            staged,
            writer,
            rows: 0,
        })
    }
}

impl RecordExporter for CsvExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn write(&mut self, record: &TrainingRecord) -> Result<(), ExportError> {
        self.writer.write_record([
            record.document_id.as_str(),
            record.text.as_str(),
            record.source.as_str(),
            &record.quality_score.to_string(),
            &record.relevance_score.to_string(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError> {
        let Self {
            staged,
            mut writer,
            rows,
        } = *self;
        writer.flush()?;
        drop(writer);
        let path = staged.commit()?;
        info!("Exported {} records to CSV: {}", rows, path.display());
        Ok(path)
    }
}
