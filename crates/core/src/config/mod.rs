use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the show runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowConfig {
    /// Loop updates per second.
    pub ups: u32,
    pub max_models: usize,
    pub max_fixtures: usize,
    pub debug: bool,
    /// Stop the show once every timed function has fired.
    pub exit_after_timed_functions: bool,
    pub models_dir: String,
    pub transport: TransportConfig,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            ups: 60,
            max_models: 8,
            max_fixtures: 32,
            debug: false,
            exit_after_timed_functions: false,
            models_dir: "models".to_string(),
            transport: TransportConfig::default(),
        }
    }
}

impl ShowConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Target tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        1000 / u64::from(self.ups.max(1))
    }
}

/// Configuration specific to the hardware link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_ms: u64,
    pub baud_rate: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            baud_rate: 115_200,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
