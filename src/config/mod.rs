//! Configuration module
//!
//! Handles engine settings: port or trace selection, device map, catalogs
//! and logging.

mod settings;

pub use settings::{EngineConfig, LoggingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "pfeiffer-rs485", "pfeiffer-rs485")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file location
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
