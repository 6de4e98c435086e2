//! JSONL exporter: one record per line, UTF-8, `\n` endings.

use super::{export_filename, ExportError, RecordExporter, StagedFile};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tunesmith_protocol::{DatasetRecord, ExportFormat, TrainingRecord};

pub struct JsonlExporter {
    staged: StagedFile,
    writer: BufWriter<File>,
    rows: u64,
}

impl JsonlExporter {
    pub fn open(dir: &Path, dataset: &DatasetRecord) -> Result<Self, ExportError> {
        let filename = export_filename(&dataset.name, dataset.id.as_ref(), "jsonl");
        let staged = StagedFile::new(dir, &filename)?;
        let writer = BufWriter::new(File::create(staged.temp_path())?);
        Ok(Self {
            staged,
            writer,
            rows: 0,
        })
    }
}

impl RecordExporter for JsonlExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Jsonl
    }

    fn write(&mut self, record: &TrainingRecord) -> Result<(), ExportError> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
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
        info!("Exported {} records to JSONL: {}", rows, path.display());
        Ok(path)
    }
}
