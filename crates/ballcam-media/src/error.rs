//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while reading streams, writing the sink or
/// running the detection backend.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to open stream {source_name}: {message}")]
    StreamOpen {
        source_name: String,
        message: String,
    },

    #[error("Stream read failed at index {index}: {message}")]
    StreamRead { index: u64, message: String },

    #[error("Stream seek to {index} failed: {message}")]
    StreamSeek { index: u64, message: String },

    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Ball detection failed: {0}")]
    DetectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a stream read error.
    pub fn stream_read(index: u64, message: impl Into<String>) -> Self {
        Self::StreamRead {
            index,
            message: message.into(),
        }
    }

    /// Create a stream seek error.
    pub fn stream_seek(index: u64, message: impl Into<String>) -> Self {
        Self::StreamSeek {
            index,
            message: message.into(),
        }
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
