//! Pluggable detection backend.
//!
//! The director treats the underlying object detector as a black box
//! returning bounding boxes, confidences and class ids; everything above
//! this trait is model-agnostic.

use crate::error::MediaResult;
use ballcam_models::{FramePixels, RawDetection};

/// A synchronous object detector invoked once per frame.
///
/// Implementations may parallelize internally (GPU inference) but expose
/// a blocking call; the director pipeline is single-threaded per tick.
pub trait DetectionBackend {
    /// Detect objects in a BGR frame. Coordinates are pixel-space.
    fn detect(&mut self, pixels: &FramePixels) -> MediaResult<Vec<RawDetection>>;
}

impl<B: DetectionBackend + ?Sized> DetectionBackend for Box<B> {
    fn detect(&mut self, pixels: &FramePixels) -> MediaResult<Vec<RawDetection>> {
        (**self).detect(pixels)
    }
}

/// Filter backend output down to ball-class candidates above the
/// confidence gate.
pub fn ball_candidates(
    detections: &[RawDetection],
    ball_class_id: usize,
    conf_threshold: f64,
) -> Vec<RawDetection> {
    detections
        .iter()
        .filter(|d| d.class_id == ball_class_id && d.conf >= conf_threshold)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballcam_models::BoundingBox;

    fn raw(class_id: usize, conf: f64) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            conf,
            class_id,
        }
    }

    #[test]
    fn test_ball_candidates_filters_class_and_conf() {
        let all = vec![raw(0, 0.9), raw(32, 0.1), raw(32, 0.4), raw(32, 0.8)];
        let balls = ball_candidates(&all, 32, 0.15);
        assert_eq!(balls.len(), 2);
        assert!(balls.iter().all(|d| d.class_id == 32 && d.conf >= 0.15));
    }

    #[test]
    fn test_ball_candidates_empty() {
        assert!(ball_candidates(&[], 32, 0.15).is_empty());
    }
}
