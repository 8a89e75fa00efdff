//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "flyage";

/// Default square edge, in pixels, images are resized to before inference.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Default minimum top-1 probability for a "high" confidence label.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.60;

/// Default minimum top-1/top-2 gap (0.05 = 5 percentage points).
pub const DEFAULT_MARGIN_THRESHOLD: f32 = 0.05;

/// Default inference batch size. Zero runs every image in one combined batch.
pub const DEFAULT_BATCH_SIZE: usize = 0;

/// Maximum allowed inference batch size.
pub const MAX_BATCH_SIZE: usize = 1024;

/// Default catalog file name searched next to the executable and in the
/// working directory.
pub const CATALOG_FILE_NAME: &str = "registry.yaml";

/// Image extensions accepted when collecting inputs (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Temperature scaling bounds.
pub mod calibration {
    /// Lowest temperature ever applied; avoids degenerate sharpening.
    pub const MIN_TEMPERATURE: f64 = 0.05;

    /// Upper end of the temperature search range.
    pub const MAX_TEMPERATURE: f64 = 10.0;

    /// Neutral temperature used when fitting fails.
    pub const IDENTITY_TEMPERATURE: f64 = 1.0;

    /// Probability floor used before taking logarithms.
    pub const PROB_EPSILON: f64 = 1e-12;

    /// Absolute tolerance on the fitted temperature.
    pub const X_TOLERANCE: f64 = 1e-5;

    /// Maximum number of objective evaluations.
    pub const MAX_EVALUATIONS: usize = 500;
}

/// Probability bounds and formatting.
pub mod probability {
    /// Minimum valid probability.
    pub const MIN: f32 = 0.0;
    /// Maximum valid probability.
    pub const MAX: f32 = 1.0;
    /// Decimal places used in exports.
    pub const DECIMAL_PLACES: usize = 6;
}

/// Output naming.
pub mod output {
    /// Accumulated log file written under the runs directory.
    pub const ACCUMULATED_CSV: &str = "predictions.csv";
    /// Subdirectory of the runs directory used for per-run exports.
    pub const EXPORTS_DIR: &str = "exports";
    /// Timestamp format used in export file names.
    pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
    /// Timestamp format used inside result rows.
    pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    /// Number of hex characters kept from the artifact digest.
    pub const MODEL_HASH_LEN: usize = 10;
}

/// ONNX Runtime session settings.
pub mod runtime {
    /// Name registered with the ONNX Runtime environment.
    pub const ENVIRONMENT_NAME: &str = "flyage";
}
