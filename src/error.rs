//! Error types for the CRPT client.

use thiserror::Error;

/// Main error type for CRPT client operations.
#[derive(Error, Debug)]
pub enum CrptError {
    /// Rejected construction parameters (non-positive limit or interval)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The wait for a permit was cancelled or timed out; no permit was consumed
    #[error("Acquire cancelled before a permit was granted")]
    Cancelled,

    /// The rate limiter has been shut down
    #[error("Rate limiter has been shut down")]
    Shutdown,

    /// No tokio runtime was available to drive the window timer
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CRPT client operations.
pub type Result<T> = std::result::Result<T, CrptError>;
