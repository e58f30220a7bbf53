//! The ballcam director pipeline.
//!
//! Chooses, frame by frame, the camera whose view best contains the
//! ball, and writes a single fixed-duration highlight:
//!
//! ```text
//! Streams ──▶ Orchestrator ──▶ Ball Detector ──▶ Sticky Tracker
//!                 │                                    │
//!                 │◀──────────── Switcher ◀────────────┘
//!                 │
//!                 ├──▶ Fallback Scanner (ball lost)
//!                 ▼
//!             Paced Writer ──▶ Output sink
//! ```
//!
//! The orchestrator owns the timeline: the authoritative index `t_ref`
//! is derived from the active stream's true position, every switch is
//! hard-synced to it, and the writer stops on frame count alone.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod pitch;
pub mod report;
pub mod sticky;
pub mod switcher;
pub mod writer;

pub use cancel::CancelFlag;
pub use clock::FramePlan;
pub use config::DirectorConfig;
pub use detector::BallDetector;
pub use error::{DirectorError, DirectorResult};
pub use fallback::FallbackScanner;
pub use orchestrator::{CameraUnit, Orchestrator};
pub use sticky::StickyTracker;
pub use switcher::{Switcher, ZoneMap};
pub use writer::PacedWriter;
