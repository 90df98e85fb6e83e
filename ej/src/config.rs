//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::journal::{DEFAULT_JOURNAL_PATTERN, DEFAULT_SNAPSHOT_FILES, TailerConfig};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Journal location and polling
    pub journal: JournalConfig,

    /// Plugin helpers
    pub plugins: PluginsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .edjournal.yml
        let local_config = PathBuf::from(".edjournal.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/edjournal/edjournal.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("edjournal").join("edjournal.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Journal location and polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory the game writes its journals to
    pub dir: PathBuf,

    /// Glob for journal file names
    pub pattern: String,

    /// Delay between polls in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Single-record files polled alongside the journal
    #[serde(rename = "snapshot-files")]
    pub snapshot_files: Vec<String>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: default_journal_dir(),
            pattern: DEFAULT_JOURNAL_PATTERN.to_string(),
            poll_interval_ms: 1000,
            snapshot_files: DEFAULT_SNAPSHOT_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl JournalConfig {
    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            snapshot_files: self.snapshot_files.clone(),
        }
    }
}

/// Where the game keeps its journals on a standard install
pub fn default_journal_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Saved Games")
        .join("Frontier Developments")
        .join("Elite Dangerous")
}

/// Plugin helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Seconds between buffered event flushes
    #[serde(rename = "buffer-flush-secs")]
    pub buffer_flush_secs: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self { buffer_flush_secs: 60 }
    }
}

impl PluginsConfig {
    pub fn buffer_flush_interval(&self) -> Duration {
        Duration::from_secs(self.buffer_flush_secs)
    }
}
