use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZeroError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame count mismatch: description declares {declared}, message carries {actual}")]
    FrameCountMismatch { declared: usize, actual: usize },

    #[error("Unknown status code: {0:#04x}")]
    UnknownStatus(u8),

    #[error("Message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Station not found: {0}")]
    StationNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pool closed")]
    PoolClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<std::net::AddrParseError> for ZeroError {
    fn from(err: std::net::AddrParseError) -> Self {
        ZeroError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZeroError>;
