//! # Error Types
//!
//! Custom error types for the logger using `thiserror`.

use thiserror::Error;

/// Main error type for the logger
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// slcan protocol errors
    #[error("slcan protocol error: {0}")]
    Slcan(String),

    /// Serial adapter errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial adapter could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Software timer errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Catalogue does not fit the configured node
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    /// Storage medium errors outside the per-record write path
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors reported by the software timer service
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Every timer slot is in use
    #[error("no free timer slot")]
    Exhausted,

    /// The handle does not refer to a created timer
    #[error("invalid timer {0}")]
    InvalidTimer(usize),
}

/// A record could not be persisted to the medium
#[derive(Debug, Error)]
pub enum WriteFailure {
    /// The log file could not be opened for appending
    #[error("failed to open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Bytes could not be written to the opened log file
    #[error("failed to write {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the logger
pub type Result<T> = std::result::Result<T, LoggerError>;
