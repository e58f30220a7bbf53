//! Ball detections at the three stages of the pipeline: raw model output,
//! scored per-frame detection, and the sticky tracker's stabilized outcome.

use serde::{Deserialize, Serialize};

use crate::rect::BoundingBox;

/// One candidate straight from the detection backend, after no filtering
/// at all. Coordinates are pixel-space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Model confidence in [0, 1]
    pub conf: f64,
    /// Model class id (COCO: 32 = sports ball)
    pub class_id: usize,
}

/// Side-channel data carried by a detection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionMeta {
    /// The backend call failed; the detection is treated as a miss.
    pub error: bool,
    /// Number of ball-class candidates that survived the confidence gate.
    pub candidates: usize,
    /// Unsmoothed center, preserved for debugging.
    pub raw_center: Option<(f64, f64)>,
    /// Adaptive EMA of accepted bbox areas, in square pixels.
    pub area_ema: Option<f64>,
}

/// Scored per-frame ball detection. Empty (`bbox = None`, `conf = 0`)
/// when the ball is absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallDetection {
    pub bbox: Option<BoundingBox>,
    pub conf: f64,
    pub meta: DetectionMeta,
}

impl BallDetection {
    /// An empty detection (ball absent).
    pub fn empty() -> Self {
        Self {
            bbox: None,
            conf: 0.0,
            meta: DetectionMeta::default(),
        }
    }

    /// An empty detection flagged as a backend failure.
    pub fn error() -> Self {
        Self {
            bbox: None,
            conf: 0.0,
            meta: DetectionMeta {
                error: true,
                ..DetectionMeta::default()
            },
        }
    }

    /// Pixel-space center, when present.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bbox.map(|b| b.center())
    }

    /// True when a ball was found this frame.
    pub fn is_present(&self) -> bool {
        self.bbox.is_some()
    }
}

/// How the sticky tracker classified the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyOrigin {
    /// Detection accepted; `bbox` is the fresh detection.
    Accepted,
    /// No acceptance this frame; `bbox` is the last accepted one.
    Held,
    /// Rejected by the jump gate and no suspect confirmation yet.
    RejectedJump,
    /// Center inside an exclusion zone with sub-override confidence.
    RejectedExclusion,
    /// Stationary low-confidence cluster (scoreboard, sideline ball).
    RejectedStationary,
    /// A suspect candidate is awaiting its confirmation frame.
    Confirming,
    /// Nothing to emit; hold budget exhausted.
    None,
}

/// Stabilized view of ball presence emitted by the sticky tracker.
///
/// Invariant: `origin == Held` implies `bbox` equals the last accepted
/// bbox; `hold_age` increments by one per held frame and resets to zero
/// on acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickyOutcome {
    pub bbox: Option<BoundingBox>,
    pub conf: f64,
    pub origin: StickyOrigin,
    /// Consecutive frames the last accepted detection has been held.
    pub hold_age: u32,
    /// Consecutive frames with no accepted detection.
    pub miss_streak: u32,
    /// EMA-smoothed center (pixel-space), for trajectory logic only.
    pub smoothed_center: Option<(f64, f64)>,
    pub meta: DetectionMeta,
}

impl StickyOutcome {
    /// An outcome with nothing to emit.
    pub fn none(miss_streak: u32) -> Self {
        Self {
            bbox: None,
            conf: 0.0,
            origin: StickyOrigin::None,
            hold_age: 0,
            miss_streak,
            smoothed_center: None,
            meta: DetectionMeta::default(),
        }
    }

    /// Pixel-space center of the emitted bbox, when present.
    pub fn center(&self) -> Option<(f64, f64)> {
        self.bbox.map(|b| b.center())
    }
}
