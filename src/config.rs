//! # Configuration Management
//!
//! Loads runtime settings from `ws23xx.toml`: which serial device the console
//! hangs off, how gently to pace the line, and how the `poll` command samples.
//! Every field has a default, so a partial file (or no file at all) is fine.
//! Command line flags override what is loaded here.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "ws23xx.toml";

/// Application configuration loaded from ws23xx.toml
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial link to the console
    pub station: StationConfig,
    /// Acquisition loop settings
    pub poll: PollConfig,
}

/// Serial link settings
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Pause after every write, in milliseconds. The console drops bytes
    /// that arrive back to back.
    pub io_delay_ms: u64,
    /// How long to wait for each reply byte, in milliseconds
    pub read_timeout_ms: u64,
}

/// Acquisition loop settings
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between live samples; 0 follows the console's own sensor
    /// update cadence
    pub interval_secs: u64,
    /// Default number of history records to fetch; 0 fetches all
    pub history_records: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            device: "/dev/ttyS0".to_string(),
            io_delay_ms: 50,
            read_timeout_ms: 1000,
        }
    }
}

impl StationConfig {
    pub fn io_delay(&self) -> Duration {
        Duration::from_millis(self.io_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Config {
    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        "Loaded configuration from {} (device {})",
                        path.display(),
                        config.station.device
                    );
                    config
                }
                Err(e) => {
                    warn!("Invalid config file {}: {}", path.display(), e);
                    warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save current configuration to `path`
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}
