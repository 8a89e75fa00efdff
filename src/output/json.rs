//! JSON output format writer.

use crate::error::{Error, Result};
use crate::inference::Prediction;
use crate::output::{ConfidenceSummary, ResultWriter, RunMetadata};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// JSON result file structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResultFile {
    /// Run context.
    pub run: RunMetadata,
    /// Predictions in input order.
    pub predictions: Vec<Prediction>,
    /// Counts per confidence label.
    pub summary: ConfidenceSummary,
}

/// Writer for JSON prediction files.
///
/// Predictions are buffered and the document is written on finalize.
pub struct JsonResultWriter {
    predictions: Vec<Prediction>,
    output_path: PathBuf,
    metadata: RunMetadata,
}

impl JsonResultWriter {
    /// Create a new JSON result writer.
    pub fn new(output_path: &Path, metadata: RunMetadata) -> Self {
        Self {
            predictions: Vec::new(),
            output_path: output_path.to_path_buf(),
            metadata,
        }
    }
}

impl ResultWriter for JsonResultWriter {
    fn write_header(&mut self) -> Result<()> {
        // No header for JSON - written at finalize
        Ok(())
    }

    fn write_prediction(&mut self, prediction: &Prediction) -> Result<()> {
        self.predictions.push(prediction.clone());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let result = JsonResultFile {
            run: self.metadata.clone(),
            summary: ConfidenceSummary::from_predictions(&self.predictions),
            predictions: std::mem::take(&mut self.predictions),
        };

        let write_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::ResultWrite {
            path: self.output_path.clone(),
            source,
        };

        let file = File::create(&self.output_path).map_err(|e| write_error(Box::new(e)))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &result)
            .map_err(|e| write_error(Box::new(e)))?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::Confidence;
    use crate::output::RunSettings;
    use indexmap::IndexMap;
    use tempfile::tempdir;

    #[test]
    fn test_json_writer_basic() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("ceratitis_v1.json");

        let metadata = RunMetadata {
            timestamp: chrono::Local::now(),
            species: "ceratitis".to_string(),
            model_key: "v1".to_string(),
            model_hash: "abcdef0123".to_string(),
            settings: RunSettings {
                image_size: 224,
                confidence_threshold: 0.6,
                margin_threshold: 0.05,
                temperature: Some(1.3),
            },
        };
        let mut writer = JsonResultWriter::new(&output_path, metadata);
        writer.write_header().unwrap();

        for (name, confidence) in [("a.jpg", Confidence::High), ("b.jpg", Confidence::Ambiguous)] {
            writer
                .write_prediction(&Prediction {
                    file: PathBuf::from(name),
                    top1_class: "-2".to_string(),
                    top1_prob: 0.5,
                    top2_class: Some("-3".to_string()),
                    top2_prob: Some(0.48),
                    gap: 0.02,
                    confidence,
                    full_probs: IndexMap::new(),
                })
                .unwrap();
        }
        writer.finalize().unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        let result: JsonResultFile = serde_json::from_str(&content).unwrap();

        assert_eq!(result.run.species, "ceratitis");
        assert_eq!(result.run.settings.temperature, Some(1.3));
        assert_eq!(result.predictions.len(), 2);
        assert_eq!(result.predictions[1].file, PathBuf::from("b.jpg"));
        assert_eq!(result.summary.high, 1);
        assert_eq!(result.summary.ambiguous, 1);
        assert!(content.contains("\"confidence\": \"ambiguous\""));
    }
}
