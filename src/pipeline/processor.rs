//! Classification run: predict, then persist.

use crate::config::OutputFormat;
use crate::error::Result;
use crate::inference::{LoadedClassifier, Prediction, predict};
use crate::output::{
    CsvWriter, JsonResultWriter, ResultWriter, RunMetadata, RunSettings, model_hash, progress,
};
use crate::pipeline::{ProcessOptions, accumulated_log_path, export_path_for, output_dir_for};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Result of one classification run.
#[derive(Debug)]
pub struct RunResult {
    /// Predictions in input order.
    pub predictions: Vec<Prediction>,
    /// Run context written with the results.
    pub metadata: RunMetadata,
    /// Per-run export files written.
    pub exports: Vec<PathBuf>,
    /// Accumulated log appended to, if any.
    pub log: Option<PathBuf>,
    /// Wall time in seconds.
    pub duration_secs: f64,
}

/// Classify `files` and write the results.
///
/// Nothing is written unless every image was classified.
pub fn run_classification(
    classifier: &LoadedClassifier,
    species: &str,
    model_key: &str,
    files: &[PathBuf],
    options: &ProcessOptions,
) -> Result<RunResult> {
    let start = Instant::now();

    let metadata = RunMetadata {
        timestamp: Local::now(),
        species: species.to_string(),
        model_key: model_key.to_string(),
        model_hash: model_hash(classifier.artifact_path())?,
        settings: RunSettings {
            image_size: options.predict.image_size,
            confidence_threshold: options.predict.confidence_threshold,
            margin_threshold: options.predict.margin_threshold,
            temperature: options.predict.temperature.map(f64::from),
        },
    };

    info!(
        "Classifying {} image(s) with {}/{} ({})",
        files.len(),
        species,
        model_key,
        metadata.model_hash
    );

    let predictions = predict_with_progress(classifier, files, options)?;

    let output_dir = output_dir_for(options.output_dir.as_deref(), &options.runs_dir);
    std::fs::create_dir_all(&output_dir)?;

    let mut exports = Vec::with_capacity(options.formats.len());
    for format in &options.formats {
        let path = export_path_for(&output_dir, species, model_key, &metadata.timestamp, *format);
        write_output(&path, *format, &metadata, &predictions)?;
        exports.push(path);
    }

    let log = if options.accumulate {
        let path = accumulated_log_path(&options.runs_dir);
        let mut writer = CsvWriter::append(&path, metadata.clone())?;
        write_all(&mut writer, &predictions)?;
        debug!("Appended {} row(s) to {}", predictions.len(), path.display());
        Some(path)
    } else {
        None
    };

    let duration_secs = start.elapsed().as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let images_per_sec = if duration_secs > 0.0 {
        predictions.len() as f64 / duration_secs
    } else {
        0.0
    };
    info!(
        "Classified {} image(s) in {:.2}s ({:.1} images/sec)",
        predictions.len(),
        duration_secs,
        images_per_sec
    );

    Ok(RunResult {
        predictions,
        metadata,
        exports,
        log,
        duration_secs,
    })
}

/// Predict chunk by chunk so progress can be shown, keeping input order.
fn predict_with_progress(
    classifier: &LoadedClassifier,
    files: &[PathBuf],
    options: &ProcessOptions,
) -> Result<Vec<Prediction>> {
    let chunk = match options.predict.batch_size {
        0 => files.len().max(1),
        n => n,
    };

    let bar = progress::create_batch_progress(files.len(), options.progress);
    let mut predictions = Vec::with_capacity(files.len());

    for batch in files.chunks(chunk) {
        predictions.extend(predict(classifier, batch, &options.predict)?);
        progress::inc_progress(bar.as_ref(), batch.len());
    }

    progress::finish_progress(bar, "Classification complete");
    Ok(predictions)
}

/// Write predictions to one export file.
fn write_output(
    path: &Path,
    format: OutputFormat,
    metadata: &RunMetadata,
    predictions: &[Prediction],
) -> Result<()> {
    debug!("Writing {} output: {}", format, path.display());

    let mut writer: Box<dyn ResultWriter> = match format {
        OutputFormat::Csv => Box::new(CsvWriter::create(path, metadata.clone())?),
        OutputFormat::Json => Box::new(JsonResultWriter::new(path, metadata.clone())),
    };

    write_all(writer.as_mut(), predictions)
}

fn write_all(writer: &mut dyn ResultWriter, predictions: &[Prediction]) -> Result<()> {
    writer.write_header()?;
    for prediction in predictions {
        writer.write_prediction(prediction)?;
    }
    writer.finalize()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::testing::{FixedBackend, write_row_image, write_variant};
    use crate::inference::{LoaderOptions, PredictOptions};
    use crate::output::JsonResultFile;

    fn setup(dir: &Path) -> (LoadedClassifier, Vec<PathBuf>) {
        let descriptor = write_variant(dir, "v1", &["-1", "0", "1"]);
        let backend = FixedBackend::scripted(vec![vec![4.0, 0.0, 0.0], vec![0.0, 0.0, 4.0]]);
        let classifier = LoadedClassifier::load(
            &descriptor,
            &backend,
            &LoaderOptions {
                image_size: 8,
                warmup: false,
            },
        )
        .unwrap();
        let files = vec![
            write_row_image(dir, "a.png", 0),
            write_row_image(dir, "b.png", 1),
            write_row_image(dir, "c.png", 0),
        ];
        (classifier, files)
    }

    fn options(dir: &Path, batch_size: usize) -> ProcessOptions {
        ProcessOptions {
            output_dir: Some(dir.join("out")),
            formats: vec![OutputFormat::Csv, OutputFormat::Json],
            runs_dir: dir.join("runs"),
            accumulate: true,
            predict: PredictOptions {
                image_size: 8,
                batch_size,
                ..PredictOptions::default()
            },
            progress: false,
        }
    }

    #[test]
    fn test_run_writes_exports_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let (classifier, files) = setup(dir.path());

        let result =
            run_classification(&classifier, "ceratitis", "v1", &files, &options(dir.path(), 2))
                .unwrap();

        let tops: Vec<&str> = result.predictions.iter().map(|p| p.top1_class.as_str()).collect();
        assert_eq!(tops, vec!["-1", "1", "-1"]);
        assert_eq!(result.metadata.model_hash.len(), 10);
        assert_eq!(result.exports.len(), 2);
        assert!(result.exports.iter().all(|p| p.exists()));

        let json_path = result.exports.iter().find(|p| p.extension().unwrap() == "json").unwrap();
        let parsed: JsonResultFile =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(parsed.predictions.len(), 3);
        assert_eq!(parsed.run.model_key, "v1");

        let log = std::fs::read_to_string(result.log.unwrap()).unwrap();
        assert_eq!(log.lines().count(), 4);
    }

    #[test]
    fn test_bad_image_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (classifier, mut files) = setup(dir.path());
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"garbage").unwrap();
        files.push(bad);

        let opts = options(dir.path(), 0);
        assert!(run_classification(&classifier, "ceratitis", "v1", &files, &opts).is_err());
        assert!(!dir.path().join("out").exists());
        assert!(!accumulated_log_path(&opts.runs_dir).exists());
    }

    #[test]
    fn test_accumulation_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (classifier, files) = setup(dir.path());
        let mut opts = options(dir.path(), 0);
        opts.accumulate = false;

        let result = run_classification(&classifier, "ceratitis", "v1", &files, &opts).unwrap();
        assert!(result.log.is_none());
        assert!(!accumulated_log_path(&opts.runs_dir).exists());
    }
}
