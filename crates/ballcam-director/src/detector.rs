//! Per-frame ball candidate selection.
//!
//! Scores every ball-class candidate from the backend as
//! `conf * motion * pitch` and returns the argmax. The motion prior
//! (last returned center and its timeline index) is the only state;
//! backend failures are reported as misses and never poison it.

use tracing::{debug, warn};

use crate::config::DirectorConfig;
use crate::pitch::PitchMask;
use ballcam_media::{ball_candidates, DetectionBackend, SPORTS_BALL_CLASS_ID};
use ballcam_models::rect::point_distance;
use ballcam_models::{BallDetection, DetectionMeta, Frame, RawDetection};

/// EMA factor for the adaptive area estimate.
const AREA_EMA_ALPHA: f64 = 0.2;
/// Log every Nth backend failure to keep the hot loop quiet.
const ERROR_LOG_EVERY: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct MotionPrior {
    center: (f64, f64),
    timeline_index: u64,
}

/// Ball detector wrapping a detection backend with motion and pitch
/// priors.
pub struct BallDetector<B> {
    backend: B,
    conf_threshold: f64,
    high_conf_override: f64,
    max_motion_jump_px: f64,
    off_pitch_penalty: f64,
    pitch_mask: Option<PitchMask>,
    prior: Option<MotionPrior>,
    area_ema: Option<f64>,
    error_count: u64,
}

impl<B: DetectionBackend> BallDetector<B> {
    /// Create a detector from the director config.
    pub fn new(backend: B, config: &DirectorConfig) -> Self {
        Self {
            backend,
            conf_threshold: config.conf_threshold,
            high_conf_override: config.high_conf_override,
            max_motion_jump_px: config.max_motion_jump_px,
            off_pitch_penalty: config.off_pitch_penalty,
            pitch_mask: config.pitch_mask_enabled.then(PitchMask::default),
            prior: None,
            area_ema: None,
            error_count: 0,
        }
    }

    /// Detect the ball in one frame.
    pub fn detect(&mut self, frame: &Frame) -> BallDetection {
        let raw = match self.backend.detect(&frame.pixels) {
            Ok(raw) => raw,
            Err(e) => {
                self.error_count += 1;
                if self.error_count % ERROR_LOG_EVERY == 1 {
                    warn!(
                        camera = %frame.camera_id,
                        index = frame.timeline_index,
                        errors = self.error_count,
                        "detection backend failed: {e}"
                    );
                }
                return BallDetection::error();
            }
        };

        let candidates = ball_candidates(&raw, SPORTS_BALL_CLASS_ID, self.conf_threshold);
        if candidates.is_empty() {
            return BallDetection::empty();
        }

        let mut best: Option<(f64, &RawDetection, f64)> = None; // (score, det, dist)
        for candidate in &candidates {
            let center = candidate.bbox.center();
            let dist = self
                .prior
                .map(|p| point_distance(center, p.center))
                .unwrap_or(0.0);

            let motion = self.motion_factor(candidate.conf, dist);
            let pitch = self.pitch_factor(&frame.pixels, center);
            let score = candidate.conf * motion * pitch;
            if score <= 0.0 {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_score, best_det, best_dist)) => {
                    score > best_score
                        || (score == best_score
                            && (candidate.conf > best_det.conf
                                || (candidate.conf == best_det.conf && dist < best_dist)))
                }
            };
            if better {
                best = Some((score, candidate, dist));
            }
        }

        let Some((score, chosen, _)) = best else {
            return BallDetection::empty();
        };

        debug!(
            camera = %frame.camera_id,
            index = frame.timeline_index,
            conf = chosen.conf,
            score,
            candidates = candidates.len(),
            "ball candidate selected"
        );

        let center = chosen.bbox.center();
        self.prior = Some(MotionPrior {
            center,
            timeline_index: frame.timeline_index,
        });
        let area = chosen.bbox.area();
        self.area_ema = Some(match self.area_ema {
            Some(prev) => AREA_EMA_ALPHA * area + (1.0 - AREA_EMA_ALPHA) * prev,
            None => area,
        });

        BallDetection {
            bbox: Some(chosen.bbox),
            conf: chosen.conf,
            meta: DetectionMeta {
                error: false,
                candidates: candidates.len(),
                raw_center: Some(center),
                area_ema: self.area_ema,
            },
        }
    }

    /// Motion factor: 1 with no prior or high confidence; linear falloff
    /// to zero at the jump cap otherwise.
    fn motion_factor(&self, conf: f64, dist: f64) -> f64 {
        if self.prior.is_none() || conf >= self.high_conf_override {
            return 1.0;
        }
        if dist > self.max_motion_jump_px {
            return 0.0;
        }
        1.0 - dist / self.max_motion_jump_px
    }

    fn pitch_factor(&self, pixels: &ballcam_models::FramePixels, center: (f64, f64)) -> f64 {
        match &self.pitch_mask {
            Some(mask) if !mask.is_on_pitch(pixels, center) => self.off_pitch_penalty,
            _ => 1.0,
        }
    }

    /// Drop the motion prior. Called on applied switches: cross-camera
    /// pixel distances are meaningless.
    pub fn reset_prior(&mut self) {
        self.prior = None;
    }

    /// Timeline index of the last returned center, if any.
    pub fn prior_index(&self) -> Option<u64> {
        self.prior.map(|p| p.timeline_index)
    }

    /// Direct access to the backend, for scans that must not disturb the
    /// motion prior (fallback, pre-flight verification).
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
