//! CSV output format writer.

use crate::constants::output::ROW_TIMESTAMP_FORMAT;
use crate::error::{Error, Result};
use crate::inference::Prediction;
use crate::output::{ResultWriter, RunMetadata, format_full_probs, format_prob};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Column names, in order.
pub const CSV_COLUMNS: [&str; 12] = [
    "timestamp",
    "species",
    "model_key",
    "model_hash",
    "file",
    "top1_class",
    "top1_prob",
    "top2_class",
    "top2_prob",
    "gap_pp",
    "confidence",
    "full_probs_json",
];

/// CSV format output writer.
pub struct CsvWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    metadata: RunMetadata,
    needs_header: bool,
}

impl CsvWriter {
    /// Create (or truncate) a CSV file for one run.
    pub fn create(path: &Path, metadata: RunMetadata) -> Result<Self> {
        let file = File::create(path).map_err(|e| write_error(path, e))?;
        Ok(Self::from_file(file, path, metadata, true))
    }

    /// Open a CSV log for appending.
    ///
    /// The header is only written when the file is new or empty.
    pub fn append(path: &Path, metadata: RunMetadata) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_error(path, e))?;
        let is_empty = file.metadata().map_err(|e| write_error(path, e))?.len() == 0;

        Ok(Self::from_file(file, path, metadata, is_empty))
    }

    fn from_file(file: File, path: &Path, metadata: RunMetadata, needs_header: bool) -> Self {
        Self {
            writer: csv::Writer::from_writer(file),
            path: path.to_path_buf(),
            metadata,
            needs_header,
        }
    }

    fn write_record(&mut self, record: &[String]) -> Result<()> {
        self.writer
            .write_record(record)
            .map_err(|e| write_error(&self.path, e))
    }
}

impl ResultWriter for CsvWriter {
    fn write_header(&mut self) -> Result<()> {
        if self.needs_header {
            let header: Vec<String> = CSV_COLUMNS.iter().map(ToString::to_string).collect();
            self.write_record(&header)?;
            self.needs_header = false;
        }
        Ok(())
    }

    fn write_prediction(&mut self, prediction: &Prediction) -> Result<()> {
        let record = vec![
            self.metadata.timestamp.format(ROW_TIMESTAMP_FORMAT).to_string(),
            self.metadata.species.clone(),
            self.metadata.model_key.clone(),
            self.metadata.model_hash.clone(),
            prediction.file.display().to_string(),
            prediction.top1_class.clone(),
            format_prob(prediction.top1_prob),
            prediction.top2_class.clone().unwrap_or_default(),
            prediction.top2_prob.map(format_prob).unwrap_or_default(),
            format_prob(prediction.gap),
            prediction.confidence.to_string(),
            format_full_probs(&prediction.full_probs),
        ];
        self.write_record(&record)
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| write_error(&self.path, e))
    }
}

fn write_error<E>(path: &Path, e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::ResultWrite {
        path: path.to_path_buf(),
        source: Box::new(e),
    }
}
