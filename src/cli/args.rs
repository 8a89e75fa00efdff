//! CLI argument definitions.

use crate::cli::validators::{parse_batch_size, parse_probability, parse_temperature};
use crate::config::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Insect specimen age classification from images.
#[derive(Debug, Parser)]
#[command(name = "flyage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Input image files or directories to classify.
    pub inputs: Vec<PathBuf>,

    /// Catalog document (YAML or JSON) listing species and models.
    #[arg(long, global = true, env = "FLYAGE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Options for classification.
    #[command(flatten)]
    pub classify: ClassifyArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect the species catalog.
    Species {
        /// Species action to perform.
        #[command(subcommand)]
        action: SpeciesAction,
    },
    /// Check catalog models.
    Models {
        /// Models action to perform.
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Fit a calibration temperature from labelled scores.
    Calibrate {
        /// JSON file with `scores` (N x C) and `labels` (N class indices).
        scores: PathBuf,
        /// Store the fitted temperature in the config file.
        #[arg(long)]
        save: bool,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Species subcommand actions.
#[derive(Debug, Subcommand)]
pub enum SpeciesAction {
    /// List species in the catalog.
    List,
    /// Show the models of one species.
    Show {
        /// Species key.
        key: String,
    },
}

/// Models subcommand actions.
#[derive(Debug, Subcommand)]
pub enum ModelsAction {
    /// Load every model and verify it matches its vocabulary.
    Check {
        /// Only check this species.
        #[arg(long)]
        species: Option<String>,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Arguments for classification.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClassifyArgs {
    /// Species key from the catalog.
    #[arg(short, long, env = "FLYAGE_SPECIES")]
    pub species: Option<String>,

    /// Model variant key within the species.
    #[arg(short = 'm', long, env = "FLYAGE_VARIANT")]
    pub variant: Option<String>,

    /// Output formats (comma-separated: csv,json).
    #[arg(short, long, value_delimiter = ',', env = "FLYAGE_FORMAT")]
    pub format: Option<Vec<OutputFormat>>,

    /// Directory for per-run exports (default: <runs dir>/exports).
    #[arg(short, long, env = "FLYAGE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory of the accumulated prediction log.
    #[arg(long, env = "FLYAGE_RUNS_DIR")]
    pub runs_dir: Option<PathBuf>,

    /// Minimum top-1 probability for a "high" label (0.0-1.0).
    #[arg(short = 'c', long, value_parser = parse_probability, env = "FLYAGE_CONFIDENCE_THRESHOLD")]
    pub confidence_threshold: Option<f32>,

    /// Minimum top-1/top-2 gap for a non-ambiguous label (0.0-1.0).
    #[arg(long, value_parser = parse_probability, env = "FLYAGE_MARGIN_THRESHOLD")]
    pub margin_threshold: Option<f32>,

    /// Square input size in pixels.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=4096), env = "FLYAGE_IMAGE_SIZE")]
    pub image_size: Option<u32>,

    /// Images per inference call (0 = all at once).
    #[arg(short, long, value_parser = parse_batch_size, env = "FLYAGE_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Calibration temperature applied to raw scores.
    #[arg(short = 't', long, value_parser = parse_temperature, env = "FLYAGE_TEMPERATURE",
          conflicts_with = "no_calibration")]
    pub temperature: Option<f64>,

    /// Ignore any configured temperature.
    #[arg(long)]
    pub no_calibration: bool,

    /// ONNX Runtime intra-op threads.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..), env = "FLYAGE_THREADS")]
    pub threads: Option<u16>,

    /// Leave the per-class probabilities out of the results.
    #[arg(long)]
    pub no_full_probs: bool,

    /// Skip the warm-up inference after loading.
    #[arg(long)]
    pub no_warmup: bool,

    /// Do not append to the accumulated prediction log.
    #[arg(long)]
    pub no_log: bool,
}
