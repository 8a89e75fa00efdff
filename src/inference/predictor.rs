//! Batch prediction: normalize, score, rank, label.

use super::calibration::{Temperature, first_non_finite_row, softmax_rows};
use super::classifier::LoadedClassifier;
use super::vocabulary::ClassVocabulary;
use crate::constants::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IMAGE_SIZE, DEFAULT_MARGIN_THRESHOLD};
use crate::error::{Error, Result};
use crate::preprocess::normalize_many;
use indexmap::IndexMap;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Categorical confidence derived from top-1 probability and gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Top-1 clears the confidence threshold and the gap clears the margin.
    High,
    /// Top-1 and top-2 are within the margin.
    Ambiguous,
    /// Neither of the above.
    Low,
}

impl Confidence {
    /// Label a prediction; the first matching rule wins.
    pub fn classify(top1: f32, gap: f32, confidence_threshold: f32, margin_threshold: f32) -> Self {
        if top1 >= confidence_threshold && gap >= margin_threshold {
            Self::High
        } else if gap < margin_threshold {
            Self::Ambiguous
        } else {
            Self::Low
        }
    }

    /// Lowercase name as written to exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Ambiguous => "ambiguous",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result row per input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Input path as given by the caller.
    pub file: PathBuf,
    /// Most probable class.
    pub top1_class: String,
    /// Probability of `top1_class`.
    pub top1_prob: f32,
    /// Second most probable class; absent for a one-class vocabulary.
    pub top2_class: Option<String>,
    /// Probability of `top2_class`.
    pub top2_prob: Option<f32>,
    /// `top1_prob - top2_prob` (or `top1_prob` with no second class).
    pub gap: f32,
    /// Derived confidence label.
    pub confidence: Confidence,
    /// Probability per class in vocabulary order; empty unless requested.
    pub full_probs: IndexMap<String, f32>,
}

/// Caller-supplied prediction settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictOptions {
    /// Square input edge in pixels.
    pub image_size: u32,
    /// Minimum top-1 probability for [`Confidence::High`].
    pub confidence_threshold: f32,
    /// Minimum top-1/top-2 gap for a non-ambiguous result.
    pub margin_threshold: f32,
    /// Attach the full probability mapping to each prediction.
    pub include_full_probs: bool,
    /// Images per model invocation; 0 runs everything as one batch.
    pub batch_size: usize,
    /// Score divisor applied before softmax.
    pub temperature: Option<Temperature>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            margin_threshold: DEFAULT_MARGIN_THRESHOLD,
            include_full_probs: true,
            batch_size: 0,
            temperature: None,
        }
    }
}

/// Classify images with a loaded classifier.
///
/// Results are in input order. Every image is decoded before inference
/// starts, so one unreadable image fails the whole call and nothing is
/// returned for the others.
pub fn predict<P: AsRef<Path>>(
    classifier: &LoadedClassifier,
    paths: &[P],
    options: &PredictOptions,
) -> Result<Vec<Prediction>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let batch = normalize_many(paths, options.image_size, classifier.preprocessing())?;

    let n = paths.len();
    let chunk = if options.batch_size == 0 { n } else { options.batch_size.min(n) };

    let mut parts = Vec::with_capacity(n.div_ceil(chunk));
    for begin in (0..n).step_by(chunk) {
        let end = (begin + chunk).min(n);
        let sub = batch.slice(s![begin..end, .., .., ..]).to_owned();
        parts.push(classifier.score(&sub)?);
    }

    let views: Vec<ArrayView2<'_, f32>> = parts.iter().map(Array2::view).collect();
    let scores = concatenate(Axis(0), &views).map_err(|e| Error::Internal {
        message: format!("failed to join score batches: {e}"),
    })?;

    let predictions = predictions_from_scores(classifier.vocabulary(), paths, scores.view(), options)?;

    debug!(
        "Predicted {} image(s) in {} batch(es) in {:.2?}",
        n,
        parts.len(),
        start.elapsed()
    );

    Ok(predictions)
}

/// Turn raw score rows into predictions, one per path.
pub fn predictions_from_scores<P: AsRef<Path>>(
    vocabulary: &ClassVocabulary,
    paths: &[P],
    scores: ArrayView2<'_, f32>,
    options: &PredictOptions,
) -> Result<Vec<Prediction>> {
    if scores.dim() != (paths.len(), vocabulary.len()) {
        return Err(Error::Inference {
            reason: format!(
                "expected {}x{} scores, got {}x{}",
                paths.len(),
                vocabulary.len(),
                scores.nrows(),
                scores.ncols()
            ),
        });
    }

    let scaled = match options.temperature {
        Some(t) => t.apply_to_scores(scores),
        None => scores.to_owned(),
    };
    if let Some(row) = first_non_finite_row(scaled.view()) {
        return Err(Error::Inference {
            reason: format!(
                "non-finite score in row {row} ('{}')",
                paths[row].as_ref().display()
            ),
        });
    }
    let probs = softmax_rows(scaled.view());

    paths
        .iter()
        .zip(probs.axis_iter(Axis(0)))
        .map(|(path, row)| build_prediction(vocabulary, path.as_ref(), row, options))
        .collect()
}

fn build_prediction(
    vocabulary: &ClassVocabulary,
    path: &Path,
    probs: ArrayView1<'_, f32>,
    options: &PredictOptions,
) -> Result<Prediction> {
    let ranked = rank(probs);
    let label = |i: usize| {
        vocabulary.label(i).map(str::to_string).ok_or_else(|| Error::Internal {
            message: format!("class index {i} outside vocabulary"),
        })
    };

    let top1 = ranked[0];
    let top1_prob = probs[top1];
    let (top2_class, top2_prob) = match ranked.get(1) {
        Some(&i) => (Some(label(i)?), Some(probs[i])),
        None => (None, None),
    };
    let gap = top1_prob - top2_prob.unwrap_or(0.0);

    let full_probs = if options.include_full_probs {
        vocabulary
            .labels()
            .iter()
            .cloned()
            .zip(probs.iter().copied())
            .collect()
    } else {
        IndexMap::new()
    };

    Ok(Prediction {
        file: path.to_path_buf(),
        top1_class: label(top1)?,
        top1_prob,
        top2_class,
        top2_prob,
        gap,
        confidence: Confidence::classify(
            top1_prob,
            gap,
            options.confidence_threshold,
            options.margin_threshold,
        ),
        full_probs,
    })
}

/// Class indices by descending probability; ties keep the lower index first.
fn rank(probs: ArrayView1<'_, f32>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    order
}
