//! Parquet exporter: columnar layout matching the training-record
//! schema, SNAPPY compression, batched writes.
//!
//! Records accumulate in Arrow builders and flush as a RecordBatch
//! every `batch_size` rows, so memory stays bounded by the batch size
//! rather than the corpus. Nested metadata is carried as a JSON-encoded
//! string column.

use super::{export_filename, ExportError, RecordExporter, StagedFile};
use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tunesmith_protocol::{DatasetRecord, ExportFormat, TrainingRecord};

pub struct ParquetExporter {
    staged: StagedFile,
    writer: ArrowWriter<File>,
    schema: Arc<Schema>,
    batch_size: usize,
    texts: Vec<String>,
    document_ids: Vec<String>,
    sources: Vec<String>,
    quality_scores: Vec<f64>,
    relevance_scores: Vec<f64>,
    metadata_json: Vec<String>,
    rows: u64,
}

impl ParquetExporter {
    pub fn open(
        dir: &Path,
        dataset: &DatasetRecord,
        batch_size: usize,
    ) -> Result<Self, ExportError> {
        let filename = export_filename(&dataset.name, dataset.id.as_ref(), "parquet");
        let staged = StagedFile::new(dir, &filename)?;

        let schema = Arc::new(Schema::new(vec![
            Field::new("text", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("quality_score", DataType::Float64, false),
            Field::new("relevance_score", DataType::Float64, false),
            Field::new("metadata", DataType::Utf8, false),
        ]));

        let file = File::create(staged.temp_path())?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))?;

        Ok(Self {
            staged,
            writer,
            schema,
            batch_size: batch_size.max(1),
            texts: Vec::new(),
            document_ids: Vec::new(),
            sources: Vec::new(),
            quality_scores: Vec::new(),
            relevance_scores: Vec::new(),
            metadata_json: Vec::new(),
            rows: 0,
        })
    }

    fn flush_batch(&mut self) -> Result<(), ExportError> {
        if self.texts.is_empty() {
            return Ok(());
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(std::mem::take(&mut self.texts))),
            Arc::new(StringArray::from(std::mem::take(&mut self.document_ids))),
            Arc::new(StringArray::from(std::mem::take(&mut self.sources))),
            Arc::new(Float64Array::from(std::mem::take(&mut self.quality_scores))),
            Arc::new(Float64Array::from(std::mem::take(&mut self.relevance_scores))),
            Arc::new(StringArray::from(std::mem::take(&mut self.metadata_json))),
        ];
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), columns)?;
        self.writer.write(&batch)?;
        debug!("Flushed {} rows to Parquet", batch.num_rows());
        Ok(())
    }
}

impl RecordExporter for ParquetExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Parquet
    }

    fn write(&mut self, record: &TrainingRecord) -> Result<(), ExportError> {
        self.texts.push(record.text.clone());
        self.document_ids.push(record.document_id.clone());
        self.sources.push(record.source.clone());
        self.quality_scores.push(record.quality_score);
        self.relevance_scores.push(record.relevance_score);
        self.metadata_json
            .push(serde_json::to_string(&record.metadata)?);
        self.rows += 1;

        if self.texts.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, ExportError> {
        let mut this = *self;
        this.flush_batch()?;
        this.writer.close()?;

        let rows = this.rows;
        let path = this.staged.commit()?;
        info!("Exported {} records to Parquet: {}", rows, path.display());
        Ok(path)
    }
}
