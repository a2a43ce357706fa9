//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::poller::PollerConfig;

/// Runtime-adjustable polling settings
///
/// Settable before a session or between cycles; changes take effect at the
/// next cycle boundary, never mid-cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Desired time between cycle starts
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Base batch size before adaptive adjustment (1..=100)
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Ask the reader to bypass its caches
    #[serde(rename = "disable-caching")]
    pub disable_caching: bool,

    /// Forwarded to the reader, not interpreted here
    #[serde(rename = "fast-mode")]
    pub fast_mode: bool,

    /// Sort by priority and drop low-priority items under high load
    #[serde(rename = "priority-throttling")]
    pub priority_throttling: bool,

    /// Adapt batch size to the current load estimate
    #[serde(rename = "adaptive-polling")]
    pub adaptive_polling: bool,
}

/// Batch size bounds enforced on settings and by adaptive sizing
pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 100;

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            batch_size: 20,
            disable_caching: false,
            fast_mode: false,
            priority_throttling: false,
            adaptive_polling: false,
        }
    }
}

impl PollSettings {
    /// Validate settings before applying them
    ///
    /// Call at the cycle boundary; invalid settings are rejected and the
    /// previous ones kept.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(eyre::eyre!("interval-ms must be non-zero"));
        }
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(eyre::eyre!(
                "batch-size must be in {}..={}, got {}",
                MIN_BATCH_SIZE,
                MAX_BATCH_SIZE,
                self.batch_size
            ));
        }
        Ok(())
    }
}

/// Main memprobe configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poller task configuration
    pub poller: PollerConfig,

    /// Default polling settings for new sessions
    pub settings: PollSettings,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .memprobe.yml
        let local_config = PathBuf::from(".memprobe.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/memprobe/memprobe.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("memprobe").join("memprobe.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
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
