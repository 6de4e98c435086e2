//! JSON exporter: single pretty-printed object with a `documents` array.
//!
//! The envelope is written by hand so the array can stream: records go
//! out as they arrive and `document_count` is emitted after the array,
//! keeping the exporter single-pass without buffering the corpus.

use super::{export_filename, ExportError, RecordExporter, StagedFile};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tunesmith_protocol::{DatasetRecord, ExportFormat, TrainingRecord};

pub struct JsonExporter {
    staged: StagedFile,
    writer: BufWriter<File>,
    count: u64,
}

impl JsonExporter {
    pub fn open(dir: &Path, dataset: &DatasetRecord) -> Result<Self, ExportError> {
        let filename = export_filename(&dataset.name, dataset.id.as_ref(), "json");
        let staged = StagedFile::new(dir, &filename)?;
        let mut writer = BufWriter::new(File::create(staged.temp_path())?);

        writeln!(writer, "{{")?;
        writeln!(
            writer,
            "  \"dataset_id\": {},",
            serde_json::to_string(dataset.id.as_ref())?
        )?;
        writeln!(writer, "  \"name\": {},", serde_json::to_string(&dataset.name)?)?;
        writeln!(
            writer,
            "  \"description\": {},",
            serde_json::to_string(&dataset.description)?
        )?;
        writeln!(
            writer,
            "  \"created_at\": {},",
            serde_json::to_string(&dataset.created_at)?
        )?;
        writeln!(
            writer,
            "  \"created_by\": {},",
            serde_json::to_string(&dataset.created_by)?
        )?;
        write!(writer, "  \"documents\": [")?;

        Ok(Self {
            staged,
            writer,
            count: 0,
        })
    }
}

impl RecordExporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn write(&mut self, record: &TrainingRecord) -> Result<(), ExportError> {
        if self.count > 0 {
            write!(self.writer, ",")?;
        }
        let pretty = serde_json::to_string_pretty(record)?;
        write!(self.writer, "\n{}", indent(&pretty, 4))?;
        self.count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError> {
        let Self {
            staged,
            mut writer,
            count,
        } = *self;

        if count > 0 {
            writeln!(writer, "\n  ],")?;
        } else {
            writeln!(writer, "],")?;
        }
        writeln!(writer, "  \"document_count\": {}", count)?;
        writeln!(writer, "}}")?;
        writer.flush()?;
        drop(writer);

        let path = staged.commit()?;
        info!("Exported {} records to JSON: {}", count, path.display());
        Ok(path)
    }
}

fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}
