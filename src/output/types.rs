//! Output type definitions.

use crate::constants::output::MODEL_HASH_LEN;
use crate::constants::probability::DECIMAL_PLACES;
use crate::error::{Error, Result};
use crate::inference::Confidence;
use crate::inference::Prediction;
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Context shared by every row of one classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// When the run started.
    pub timestamp: DateTime<Local>,
    /// Species key.
    pub species: String,
    /// Variant key.
    pub model_key: String,
    /// Short digest of the classifier artifact.
    pub model_hash: String,
    /// Settings the predictions were made with.
    pub settings: RunSettings,
}

/// Prediction settings recorded with a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Square input edge in pixels.
    pub image_size: u32,
    /// Threshold for "high" confidence.
    pub confidence_threshold: f32,
    /// Threshold for ambiguity.
    pub margin_threshold: f32,
    /// Calibration temperature, if one was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Count of predictions per confidence label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    /// Total predictions.
    pub total: usize,
    /// Predictions labelled high.
    pub high: usize,
    /// Predictions labelled ambiguous.
    pub ambiguous: usize,
    /// Predictions labelled low.
    pub low: usize,
}

impl ConfidenceSummary {
    /// Tally a list of predictions.
    pub fn from_predictions(predictions: &[Prediction]) -> Self {
        predictions.iter().fold(Self::default(), |mut acc, p| {
            acc.total += 1;
            match p.confidence {
                Confidence::High => acc.high += 1,
                Confidence::Ambiguous => acc.ambiguous += 1,
                Confidence::Low => acc.low += 1,
            }
            acc
        })
    }
}

/// First [`MODEL_HASH_LEN`] hex characters of the SHA-256 of a file.
pub fn model_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::ModelHash {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    std::io::copy(&mut BufReader::new(file), &mut hasher).map_err(|e| Error::ModelHash {
        path: path.to_path_buf(),
        source: e,
    })?;

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(hex[..MODEL_HASH_LEN].to_string())
}

/// Render a probability mapping as `label:prob;label:prob`.
pub fn format_full_probs(probs: &IndexMap<String, f32>) -> String {
    probs
        .iter()
        .map(|(label, p)| format!("{label}:{p:.DECIMAL_PLACES$}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Format a probability with the export precision.
pub fn format_prob(p: f32) -> String {
    format!("{p:.DECIMAL_PLACES$}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_full_probs() {
        let mut probs = IndexMap::new();
        probs.insert("-5".to_string(), 0.25_f32);
        probs.insert("-4".to_string(), 0.75_f32);
        assert_eq!(format_full_probs(&probs), "-5:0.250000;-4:0.750000");
        assert_eq!(format_full_probs(&IndexMap::new()), "");
    }

    #[test]
    fn test_model_hash_is_short_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        std::fs::write(&path, b"abc").unwrap();

        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(model_hash(&path).unwrap(), "ba7816bf8f");
    }

    #[test]
    fn test_model_hash_missing_file() {
        let err = model_hash(Path::new("/nonexistent/m.onnx")).unwrap_err();
        assert!(matches!(err, Error::ModelHash { .. }));
    }

    #[test]
    fn test_confidence_summary() {
        let base = Prediction {
            file: PathBuf::from("a.jpg"),
            top1_class: "a".to_string(),
            top1_prob: 0.9,
            top2_class: None,
            top2_prob: None,
            gap: 0.9,
            confidence: Confidence::High,
            full_probs: IndexMap::new(),
        };
        let mut low = base.clone();
        low.confidence = Confidence::Low;
        let summary = ConfidenceSummary::from_predictions(&[base.clone(), low, base]);
        assert_eq!(
            summary,
            ConfidenceSummary {
                total: 3,
                high: 2,
                ambiguous: 0,
                low: 1
            }
        );
    }
}
