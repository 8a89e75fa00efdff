//! Input collection and output placement.

use crate::config::OutputFormat;
use crate::constants::IMAGE_EXTENSIONS;
use crate::constants::output::{ACCUMULATED_CSV, EXPORTS_DIR, FILE_TIMESTAMP_FORMAT};
use crate::error::Result;
use crate::inference::PredictOptions;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options for one classification run.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Directory for per-run exports (None = `<runs_dir>/exports`).
    pub output_dir: Option<PathBuf>,
    /// Export formats to generate.
    pub formats: Vec<OutputFormat>,
    /// Directory of the accumulated log.
    pub runs_dir: PathBuf,
    /// Append to the accumulated log.
    pub accumulate: bool,
    /// Prediction settings.
    pub predict: PredictOptions,
    /// Show progress indicators.
    pub progress: bool,
}

/// Determine the export directory.
pub fn output_dir_for(explicit_output_dir: Option<&Path>, runs_dir: &Path) -> PathBuf {
    explicit_output_dir.map_or_else(|| runs_dir.join(EXPORTS_DIR), Path::to_path_buf)
}

/// Path of a per-run export: `<species>_<variant>_<YYYYmmdd_HHMMSS>.<ext>`.
pub fn export_path_for(
    output_dir: &Path,
    species: &str,
    model_key: &str,
    timestamp: &DateTime<Local>,
    format: OutputFormat,
) -> PathBuf {
    output_dir.join(format!(
        "{species}_{model_key}_{}.{}",
        timestamp.format(FILE_TIMESTAMP_FORMAT),
        format.extension()
    ))
}

/// Path of the accumulated prediction log.
pub fn accumulated_log_path(runs_dir: &Path) -> PathBuf {
    runs_dir.join(ACCUMULATED_CSV)
}

/// Collect image files from paths (files and directories).
///
/// Directories are walked recursively in name order. Paths are
/// canonicalized and duplicates dropped, keeping the first occurrence.
pub fn collect_input_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_image_file(path) {
                found.push(path.clone());
            } else {
                debug!("Skipping non-image file: {}", path.display());
            }
        } else if path.is_dir() {
            collect_images_recursive(path, &mut found)?;
        } else {
            warn!("Skipping non-existent path: {}", path.display());
        }
    }

    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(found.len());
    for path in found {
        let canonical = std::fs::canonicalize(&path)?;
        if seen.insert(canonical.clone()) {
            files.push(canonical);
        }
    }

    Ok(files)
}

/// Recursively collect image files from a directory.
fn collect_images_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_images_recursive(&path, files)?;
        } else if is_image_file(&path) {
            files.push(path);
        }
    }

    Ok(())
}

/// Check if a file has a supported image extension.
fn is_image_file(path: &Path) -> bool {
    use std::ffi::OsStr;

    path.extension().is_some_and(|ext| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(OsStr::new(known)))
    })
}
