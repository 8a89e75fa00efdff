//! Platform-specific configuration and data paths.

use crate::constants::APP_NAME;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME).ok_or(Error::ConfigDirNotFound)
}

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/flyage/`
/// - macOS: `~/Library/Application Support/flyage/`
/// - Windows: `%APPDATA%\flyage\`
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default directory for the accumulated prediction log.
pub fn default_runs_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("runs"))
}
