//! Shared data models for the ballcam director pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Bounding boxes and frame buffers
//! - Camera identity and role assignments
//! - Raw, scored and stabilized ball detections
//! - Exit zones and zone routing
//! - Switch decisions, switch events and hold reasons
//! - The end-of-run report

pub mod camera;
pub mod decision;
pub mod detection;
pub mod frame;
pub mod rect;
pub mod report;
pub mod zone;

// Re-export common types
pub use camera::{CameraId, CameraRole, RoleError};
pub use decision::{Decision, DecisionAction, HoldReason, SwitchEvent, SwitchReason};
pub use detection::{BallDetection, DetectionMeta, RawDetection, StickyOrigin, StickyOutcome};
pub use frame::{Frame, FramePixels};
pub use rect::BoundingBox;
pub use report::{
    DominanceWarning, Phase0CameraStats, Phase0Report, RunCounters, RunReport, StreamInfo,
    WriterSummary,
};
pub use zone::{RouteTarget, Zone, ZoneError, ZoneLabel};
