//! Flyage - insect specimen age classification from photographs.
//!
//! This crate resolves per-species image classifiers from a catalog, keeps
//! loaded models in a shared cache and turns specimen photographs into
//! age-class predictions with deterministic confidence labels.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod registry;

use clap::Parser;
use cli::{ClassifyArgs, Cli, Command};
use config::{
    Config, InferenceConfig, config_file_path, default_runs_dir, load_default_config,
    save_default_config, validate_inference,
};
use constants::{CATALOG_FILE_NAME, runtime};
use inference::{
    LoaderOptions, ModelBackend, ModelCache, OnnxBackend, PredictOptions, RequestId, Temperature,
    mean_nll,
};
use ndarray::Array2;
use output::{ConfidenceSummary, format_prob, progress};
use pipeline::{ProcessOptions, RunResult, collect_input_files, run_classification};
use registry::{Catalog, ModelVariantDescriptor, find_default_catalog, load_catalog};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use error::{Error, Result};

/// Main entry point for the flyage CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let config = load_default_config()?;

    if let Some(command) = cli.command {
        return handle_command(command, cli.catalog.as_deref(), &config);
    }

    if cli.inputs.is_empty() {
        <Cli as clap::CommandFactory>::command().print_help()?;
        return Ok(());
    }

    classify_files(
        &cli.inputs,
        &cli.classify,
        cli.catalog.as_deref(),
        cli.quiet,
        &config,
    )
}

/// Classify input images with the selected species model.
fn classify_files(
    inputs: &[PathBuf],
    args: &ClassifyArgs,
    catalog_path: Option<&Path>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    config::validate_config(config)?;

    let files = collect_input_files(inputs)?;
    if files.is_empty() {
        return Err(Error::NoValidImages);
    }
    info!("Found {} image(s) to classify", files.len());

    let catalog = load_catalog(&resolve_catalog_path(catalog_path, config)?)?;
    let descriptor = select_variant(&catalog, args, config)?;
    let species_key = args
        .species
        .as_deref()
        .or(config.catalog.default_species.as_deref())
        .unwrap_or_default();

    let inference = merge_inference_settings(&config.inference, args);
    validate_inference(&inference)?;

    let runs_dir = match args.runs_dir.clone().or_else(|| config.output.runs_dir.clone()) {
        Some(dir) => dir,
        None => default_runs_dir()?,
    };

    let async_runtime = build_async_runtime()?;
    let cache = build_cache(&async_runtime, &inference);

    let spinner = progress::create_spinner(
        &format!("Loading {species_key}/{}...", descriptor.key),
        !quiet,
    );
    let loaded = async_runtime.block_on(cache.resolve(descriptor));
    progress::finish_progress(
        spinner,
        if loaded.is_ok() {
            "Model loaded"
        } else {
            "Model load failed"
        },
    );
    let classifier = loaded?;

    let options = ProcessOptions {
        output_dir: args.output_dir.clone(),
        formats: args
            .format
            .clone()
            .unwrap_or_else(|| config.output.formats.clone()),
        runs_dir,
        accumulate: !args.no_log,
        predict: PredictOptions {
            image_size: inference.image_size,
            confidence_threshold: inference.confidence_threshold,
            margin_threshold: inference.margin_threshold,
            include_full_probs: inference.export_full_probs,
            batch_size: inference.batch_size,
            temperature: inference.temperature.map(Temperature::new),
        },
        progress: !quiet,
    };

    let result = run_classification(&classifier, species_key, &descriptor.key, &files, &options)?;
    print_summary(&result);

    Ok(())
}

/// Catalog location: CLI/env, then config file, then the default search.
fn resolve_catalog_path(cli_path: Option<&Path>, config: &Config) -> Result<PathBuf> {
    cli_path
        .map(Path::to_path_buf)
        .or_else(|| config.catalog.path.clone())
        .or_else(find_default_catalog)
        .ok_or_else(|| Error::CatalogNotFound {
            path: PathBuf::from(CATALOG_FILE_NAME),
        })
}

/// Pick the model variant for this run.
///
/// The configured default variant only applies to the configured default
/// species; otherwise the species' first variant is used.
fn select_variant<'a>(
    catalog: &'a Catalog,
    args: &ClassifyArgs,
    config: &Config,
) -> Result<&'a ModelVariantDescriptor> {
    let species_key = args
        .species
        .as_deref()
        .or(config.catalog.default_species.as_deref())
        .ok_or_else(|| Error::ConfigValidation {
            message: "no species selected (use --species or set catalog.default_species)"
                .to_string(),
        })?;
    let species = catalog.species(species_key)?;

    let configured_variant = config
        .catalog
        .default_variant
        .as_deref()
        .filter(|_| config.catalog.default_species.as_deref() == Some(species_key));

    match args.variant.as_deref().or(configured_variant) {
        Some(variant_key) => species.variant(variant_key),
        None => {
            let first = species
                .models
                .values()
                .next()
                .ok_or_else(|| Error::VariantNotFound {
                    species: species_key.to_string(),
                    variant: String::new(),
                })?;
            info!("No variant selected, using '{}'", first.key);
            Ok(first)
        }
    }
}

/// Apply CLI/env overrides on top of the configured inference settings.
fn merge_inference_settings(base: &InferenceConfig, args: &ClassifyArgs) -> InferenceConfig {
    let mut merged = base.clone();

    if let Some(size) = args.image_size {
        merged.image_size = size;
    }
    if let Some(threshold) = args.confidence_threshold {
        merged.confidence_threshold = threshold;
    }
    if let Some(margin) = args.margin_threshold {
        merged.margin_threshold = margin;
    }
    if let Some(batch_size) = args.batch_size {
        merged.batch_size = batch_size;
    }
    if let Some(threads) = args.threads {
        merged.intra_threads = Some(usize::from(threads));
    }
    if args.temperature.is_some() {
        merged.temperature = args.temperature;
    }
    if args.no_calibration {
        merged.temperature = None;
    }
    if args.no_full_probs {
        merged.export_full_probs = false;
    }
    if args.no_warmup {
        merged.warmup_on_load = false;
    }

    merged
}

fn build_async_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
        message: format!("Failed to create async runtime: {e}"),
    })
}

fn build_cache(async_runtime: &tokio::runtime::Runtime, inference: &InferenceConfig) -> ModelCache {
    // One ONNX Runtime environment per process; later calls are no-ops.
    let _ = ort::init().with_name(runtime::ENVIRONMENT_NAME).commit();

    let backend: Arc<dyn ModelBackend> =
        Arc::new(OnnxBackend::new().with_intra_threads(inference.intra_threads));
    ModelCache::new(
        async_runtime.handle().clone(),
        backend,
        LoaderOptions {
            image_size: inference.image_size,
            warmup: inference.warmup_on_load,
        },
    )
}

fn print_summary(result: &RunResult) {
    println!();
    println!(
        "{:<40} {:>8} {:>10} {:>10}  {}",
        "FILE", "AGE", "PROB", "GAP", "CONFIDENCE"
    );
    for prediction in &result.predictions {
        let name = prediction
            .file
            .file_name()
            .map_or_else(|| prediction.file.display().to_string(), |n| {
                n.to_string_lossy().into_owned()
            });
        println!(
            "{:<40} {:>8} {:>10} {:>10}  {}",
            name,
            prediction.top1_class,
            format_prob(prediction.top1_prob),
            format_prob(prediction.gap),
            prediction.confidence
        );
    }

    let summary = ConfidenceSummary::from_predictions(&result.predictions);
    println!();
    println!(
        "{} image(s): {} high, {} ambiguous, {} low ({:.2}s)",
        summary.total, summary.high, summary.ambiguous, summary.low, result.duration_secs
    );
    for export in &result.exports {
        println!("Wrote {}", export.display());
    }
    if let Some(log) = &result.log {
        println!("Appended to {}", log.display());
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is suppressed unless verbose.
    // Use -v to see ORT warnings, -vv for info, -vvv for full trace.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt().with_env_filter(filter).init();
}

fn handle_command(command: Command, catalog_path: Option<&Path>, config: &Config) -> Result<()> {
    match command {
        Command::Config { action } => handle_config_command(action),
        Command::Species { action } => {
            let catalog = load_catalog(&resolve_catalog_path(catalog_path, config)?)?;
            handle_species_command(action, &catalog)
        }
        Command::Models { action } => {
            let catalog = load_catalog(&resolve_catalog_path(catalog_path, config)?)?;
            handle_models_command(action, &catalog, config)
        }
        Command::Calibrate { scores, save } => handle_calibrate_command(&scores, save),
    }
}

fn handle_species_command(action: cli::SpeciesAction, catalog: &Catalog) -> Result<()> {
    use cli::SpeciesAction;

    match action {
        SpeciesAction::List => {
            registry::list_species(catalog);
            Ok(())
        }
        SpeciesAction::Show { key } => registry::show_species(catalog, &key),
    }
}

fn handle_models_command(
    action: cli::ModelsAction,
    catalog: &Catalog,
    config: &Config,
) -> Result<()> {
    use cli::ModelsAction;

    match action {
        ModelsAction::Check { species } => check_models(catalog, species.as_deref(), config),
    }
}

/// Load every selected variant concurrently and report how each one fared.
fn check_models(catalog: &Catalog, species: Option<&str>, config: &Config) -> Result<()> {
    let entries = match species {
        Some(key) => vec![catalog.species(key)?],
        None => catalog.iter().collect(),
    };

    let async_runtime = build_async_runtime()?;
    let inference = InferenceConfig {
        warmup_on_load: false,
        ..config.inference.clone()
    };
    let cache = build_cache(&async_runtime, &inference);

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let mut requests: BTreeMap<RequestId, String> = BTreeMap::new();
    for entry in entries {
        for variant in entry.models.values() {
            let request_id = cache.next_request_id();
            requests.insert(request_id, format!("{}/{}", entry.key, variant.key));
            drop(cache.load_async(request_id, variant, sender.clone()));
        }
    }
    drop(sender);

    let outcomes = async_runtime.block_on(async {
        let mut outcomes = BTreeMap::new();
        while let Some(event) = receiver.recv().await {
            outcomes.insert(event.request_id, event.outcome);
        }
        outcomes
    });

    println!("Checking models in {}:", catalog.source_path().display());
    let mut failures = 0usize;
    for (request_id, label) in &requests {
        match outcomes.get(request_id) {
            Some(Ok(classifier)) => {
                println!("  {label}: OK ({} classes)", classifier.num_classes());
            }
            Some(Err(e)) => {
                failures += 1;
                println!("  {label}: FAILED - {e}");
            }
            None => {
                failures += 1;
                println!("  {label}: FAILED - load did not complete");
            }
        }
    }

    if failures > 0 {
        return Err(Error::CatalogInvalid {
            path: catalog.source_path().to_path_buf(),
            message: format!("{failures} model variant(s) failed to load"),
        });
    }
    Ok(())
}

/// Labelled validation scores used to fit a temperature.
#[derive(Debug, Deserialize)]
struct CalibrationSet {
    scores: Vec<Vec<f32>>,
    labels: Vec<usize>,
}

fn load_calibration_set(path: &Path) -> Result<(Array2<f32>, Vec<usize>)> {
    let data_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::CalibrationData {
        path: path.to_path_buf(),
        source,
    };

    let content = std::fs::read_to_string(path).map_err(|e| data_error(Box::new(e)))?;
    let set: CalibrationSet =
        serde_json::from_str(&content).map_err(|e| data_error(Box::new(e)))?;

    let rows = set.scores.len();
    let cols = set.scores.first().map_or(0, Vec::len);
    if let Some(row) = set.scores.iter().position(|r| r.len() != cols) {
        return Err(data_error(
            format!("score row {row} has {} values, expected {cols}", set.scores[row].len())
                .into(),
        ));
    }

    let flat: Vec<f32> = set.scores.into_iter().flatten().collect();
    let scores = Array2::from_shape_vec((rows, cols), flat).map_err(|e| data_error(Box::new(e)))?;

    Ok((scores, set.labels))
}

fn handle_calibrate_command(path: &Path, save: bool) -> Result<()> {
    let (scores, labels) = load_calibration_set(path)?;
    info!(
        "Fitting temperature on {} sample(s) x {} class(es)",
        scores.nrows(),
        scores.ncols()
    );

    let temperature = Temperature::fit(scores.view(), &labels);

    println!("Samples: {}", scores.nrows());
    if let Some(before) = mean_nll(scores.view(), &labels, Temperature::IDENTITY) {
        println!("Mean NLL (T = 1): {before:.6}");
    }
    if let Some(after) = mean_nll(scores.view(), &labels, temperature) {
        println!("Mean NLL (T = {temperature}): {after:.6}");
    }
    println!("Temperature: {temperature}");

    if save {
        let mut config = load_default_config()?;
        config.inference.temperature = Some(temperature.value());
        let saved_path = save_default_config(&config)?;
        println!("Saved temperature to {}", saved_path.display());
    } else if temperature.is_identity() {
        warn!("Fitted temperature is the identity; nothing to apply");
    }

    Ok(())
}

fn handle_config_command(action: cli::ConfigAction) -> Result<()> {
    use cli::ConfigAction;

    match action {
        ConfigAction::Init => {
            let path = config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let config = Config::default();
                let saved_path = save_default_config(&config)?;
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!("  Set catalog.path and catalog.default_species, then run:");
                println!("  flyage <images>");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_default_config()?;
            println!("{config:#?}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
