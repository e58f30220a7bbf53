//! Video I/O glue for the ballcam director.
//!
//! This crate provides:
//! - Frame stream handles with true-position seek (`FrameStream`)
//! - The output sink written by the paced writer (`FrameSink`)
//! - FFprobe metadata for startup validation
//! - The pluggable detection backend trait and its YOLOv8 ONNX
//!   implementation
//!
//! OpenCV-backed implementations live behind the `opencv` cargo feature;
//! everything else builds and tests without system OpenCV.

pub mod backend;
pub mod error;
pub mod ort_backend;
pub mod overlay;
pub mod probe;
pub mod sink;
pub mod stream;

pub use backend::{ball_candidates, DetectionBackend};
pub use error::{MediaError, MediaResult};
pub use ort_backend::{OrtBallBackend, OrtBackendConfig, SPORTS_BALL_CLASS_ID};
pub use overlay::OverlayInfo;
pub use probe::{probe_video, VideoInfo};
pub use sink::FrameSink;
pub use stream::FrameStream;

#[cfg(feature = "opencv")]
pub use sink::VideoFileSink;
#[cfg(feature = "opencv")]
pub use stream::VideoFileStream;
