//! Configuration type definitions.

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IMAGE_SIZE, DEFAULT_MARGIN_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog location and default selection.
    pub catalog: CatalogConfig,

    /// Inference settings.
    pub inference: InferenceConfig,

    /// Output settings.
    pub output: OutputConfig,
}

/// Catalog settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the catalog document. Searched for when unset.
    pub path: Option<PathBuf>,

    /// Species used when none is given on the command line.
    pub default_species: Option<String>,

    /// Variant used when none is given on the command line.
    pub default_variant: Option<String>,
}

/// Inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Square edge, in pixels, images are resized to.
    pub image_size: u32,

    /// Minimum top-1 probability for a "high" label.
    pub confidence_threshold: f32,

    /// Minimum top-1/top-2 gap for a non-ambiguous label.
    pub margin_threshold: f32,

    /// Images per model invocation (0 = one combined batch).
    pub batch_size: usize,

    /// Run a dummy inference right after loading a classifier.
    pub warmup_on_load: bool,

    /// Attach the per-class probability mapping to results.
    pub export_full_probs: bool,

    /// ONNX Runtime intra-op thread count.
    pub intra_threads: Option<usize>,

    /// Fitted calibration temperature.
    pub temperature: Option<f64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            margin_threshold: DEFAULT_MARGIN_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            warmup_on_load: true,
            export_full_probs: true,
            intra_threads: None,
            temperature: None,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Formats written per run.
    pub formats: Vec<OutputFormat>,

    /// Directory holding the accumulated log and default exports.
    /// Defaults to the platform data directory.
    pub runs_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::Csv],
            runs_dir: None,
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated rows.
    Csv,
    /// JSON document with run metadata.
    Json,
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
