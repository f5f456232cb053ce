//! Host configuration (`host.json`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeronet_client::{ClientConfig, PoolConfig};

use crate::error::{Result, StationError};
use crate::state::WorkModel;

/// Event monitor timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Broadcast silence after which the center is considered lost
    pub silence_threshold_ms: u64,
    /// Pause between a failed monitoring session and the next one
    pub failure_backoff_ms: u64,
    /// Upper bound of one subscriber poll
    pub poll_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 60_000,
            failure_backoff_ms: 1_000,
            poll_timeout_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Configuration of one station process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroAppConfig {
    /// Station this process registers as
    pub station_name: String,
    pub service_name: String,
    /// Node name, unique per machine
    pub real_name: String,
    /// Host of the center
    pub zero_address: String,
    pub zero_manage_port: u16,
    pub zero_monitor_port: u16,
    pub service_key: String,
    pub work_model: WorkModel,
    pub monitor: MonitorConfig,
    pub pool: PoolConfig,
    pub client: ClientConfig,
}

impl Default for ZeroAppConfig {
    fn default() -> Self {
        Self {
            station_name: "zeronet".to_string(),
            service_name: "zeronet".to_string(),
            real_name: "zeronet-node".to_string(),
            zero_address: "127.0.0.1".to_string(),
            zero_manage_port: 8000,
            zero_monitor_port: 8001,
            service_key: "zeronet".to_string(),
            work_model: WorkModel::Service,
            monitor: MonitorConfig::default(),
            pool: PoolConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl ZeroAppConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// A missing file yields the defaults; missing fields take their
    /// default values.
    ///
    /// # Errors
    ///
    /// - [`StationError::ConfigRead`] if the file exists but cannot be read
    /// - [`StationError::ConfigParse`] if it is not valid JSON for this type
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StationError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| StationError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Endpoint of the center's management socket.
    pub fn manage_address(&self) -> String {
        format!("tcp://{}:{}", self.zero_address, self.zero_manage_port)
    }

    /// Endpoint of the center's broadcast channel.
    pub fn monitor_address(&self) -> String {
        format!("tcp://{}:{}", self.zero_address, self.zero_monitor_port)
    }
}
