//! Error types for the director pipeline.

use ballcam_media::MediaError;
use ballcam_models::{CameraId, RoleError};
use thiserror::Error;

/// Result type for director operations.
pub type DirectorResult<T> = Result<T, DirectorError>;

/// Errors raised by the director pipeline. Policy lives in the
/// orchestrator: leaf components raise, it decides.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Roles(#[from] RoleError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error(
        "sync invariant violated on {camera} at t_ref={t_ref}: true position {actual} \
         diverged by more than one frame"
    )]
    InvariantViolation {
        camera: CameraId,
        t_ref: u64,
        actual: u64,
    },
}

impl DirectorError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
