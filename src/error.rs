//! Setup-time errors. Nothing on the recording path returns an error.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("invalid histogram range: min {min} must be less than max {max}")]
    InvalidRange { min: i64, max: i64 },
    #[error("invalid histogram precision {0}: expected 1..=5 significant digits")]
    InvalidPrecision(u8),
    #[error("histogram creation failed: {0}")]
    Histogram(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("config parse: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
