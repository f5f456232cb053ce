use std::path::PathBuf;

use thiserror::Error;
use zeronet_common::ZeroError;

/// Errors raised by the station runtime.
#[derive(Debug, Error)]
pub enum StationError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Station {0} is already running")]
    AlreadyRunning(String),

    #[error("Station {0} has no configuration")]
    NotConfigured(String),

    #[error("Center rejected {command}: {state}")]
    Rejected { command: String, state: String },

    #[error(transparent)]
    Transport(#[from] ZeroError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StationError>;
