//! Application path management
//!
//! Resolves where the configuration file, saved recordings and log files
//! live.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): a `config.yaml` in the current directory
//!   wins, with `recordings/` and `logs/` next to it.
//! - **Installed mode** (default): configuration under the platform config
//!   directory and data under the platform data directory, both in a
//!   `midirc` subfolder.
//!
//! `recorder.directory` and `logging.directory` override the data locations.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform directories
const APP_NAME: &str = "midirc";

/// Application paths for config, recordings, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Target of saved recordings unless `recorder.directory` is set
    pub recordings_dir: PathBuf,
    /// Log file directory unless `logging.directory` is set
    pub logs_dir: PathBuf,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                return Self::rooted_at(&cwd);
            }
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);

        Self {
            config: config_dir.join("config.yaml"),
            recordings_dir: data_dir.join("recordings"),
            logs_dir: data_dir.join("logs"),
        }
    }

    /// Keep everything under one directory
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            config: base.join("config.yaml"),
            recordings_dir: base.join("recordings"),
            logs_dir: base.join("logs"),
        }
    }

    /// Ensure the parent of the config file exists, before writing it
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.config.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating config directory: {}", parent.display());
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }
}
