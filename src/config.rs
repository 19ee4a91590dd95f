//! Configuration management for midirc
//!
//! Loads the YAML configuration file. Every section is optional; a missing
//! key falls back to its default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::paths::AppPaths;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MIDI client and auto-connect settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Substring of an input port name to connect at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    /// Substring of an output port name to connect at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            input_port: None,
            output_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Where saved recordings are written, overriding the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Skip timing clock and active sensing while capturing
    #[serde(default = "default_true")]
    pub ignore_realtime: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            directory: None,
            ignore_realtime: true,
        }
    }
}

impl RecorderConfig {
    pub fn directory_in(&self, paths: &AppPaths) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| paths.recordings_dir.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Send all-notes-off and all-sound-off when a session ends
    #[serde(default = "default_true")]
    pub silence_on_stop: bool,
    /// Channels (1-16) silenced on every stop, on top of the ones played
    #[serde(default)]
    pub silence_channels: Vec<u8>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            silence_on_stop: true,
            silence_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Write a daily rolling log file under the logs directory
    #[serde(default)]
    pub file: bool,
    /// Log file directory; setting it also turns the file on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    /// Directory of the log file, `None` when file logging is off
    pub fn file_directory(&self, paths: &AppPaths) -> Option<PathBuf> {
        match &self.directory {
            Some(directory) => Some(directory.clone()),
            None if self.file => Some(paths.logs_dir.clone()),
            None => None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Load `path` if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self
            .playback
            .silence_channels
            .iter()
            .find(|&&channel| !(1..=16).contains(&channel))
        {
            anyhow::bail!("playback.silence_channels: {} is not a channel (1-16)", bad);
        }
        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

// Default value functions
fn default_client_name() -> String {
    "midirc".to_string()
}
fn default_true() -> bool {
    true
}
