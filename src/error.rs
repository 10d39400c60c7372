//! Error types for voxloop

use thiserror::Error;

/// Result type alias for voxloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Input device or permission unavailable
    #[error("capture device unavailable: {0}")]
    Acquisition(String),

    /// Remote call failed (non-success status or network failure)
    #[error("transmission failed: {0}")]
    Transmission(String),

    /// Audio resource failed to play
    #[error("playback failed: {0}")]
    Playback(String),

    /// Audio encode/decode error outside the playback path
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
