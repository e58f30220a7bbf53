//! Sticky tracker: temporal stabilization of raw ball detections.
//!
//! Accepts, holds or rejects each per-frame detection. Rules run in a
//! fixed order, first applicable wins: exclusion zones, the stationary
//! filter, the jump gate with suspect confirmation, the confidence gate.
//! Declined frames fall back to the hold budget; camera switches reset
//! everything because cross-camera pixel distances are meaningless.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::clock::FramePlan;
use crate::config::DirectorConfig;
use ballcam_models::rect::point_distance;
use ballcam_models::{
    BallDetection, BoundingBox, CameraId, DetectionMeta, StickyOrigin, StickyOutcome, Zone,
};

/// Upper bound on retained accepted-center history.
const HISTORY_CAP: usize = 16;

#[derive(Debug, Clone, Copy)]
struct LastAccepted {
    bbox: BoundingBox,
    conf: f64,
    center: (f64, f64),
}

#[derive(Debug, Clone, Copy)]
struct Suspect {
    center: (f64, f64),
    timeline_index: u64,
    confirms: u32,
}

enum Decline {
    Exclusion,
    Stationary,
    JumpNew,
    Confirming,
    LowConf,
    Empty,
}

/// Temporal stabilizer for ball presence.
pub struct StickyTracker {
    gate_conf: f64,
    exclude_override_conf: f64,
    stationary_low_conf: f64,
    jump_distance_px: f64,
    min_jump_iou: f64,
    stationary_radius_px: f64,
    stationary_window: usize,
    ema_alpha: f64,
    hold_max: u32,
    suspect_confirm: u32,

    exclusion_zones: std::collections::BTreeMap<CameraId, Vec<Zone>>,
    camera: CameraId,

    last: Option<LastAccepted>,
    hold_age: u32,
    miss_streak: u32,
    suspect: Option<Suspect>,
    accepted_centers: VecDeque<(f64, f64)>,
    accepted_confs: VecDeque<f64>,
    ema_center: Option<(f64, f64)>,
}

impl StickyTracker {
    /// Create a tracker for the given starting camera.
    pub fn new(config: &DirectorConfig, plan: &FramePlan, camera: CameraId) -> Self {
        Self {
            gate_conf: config.gate_conf,
            exclude_override_conf: config.exclude_override_conf,
            stationary_low_conf: config.stationary_low_conf,
            jump_distance_px: config.jump_distance_px,
            min_jump_iou: config.min_jump_iou,
            stationary_radius_px: config.stationary_radius_px,
            stationary_window: config.stationary_window,
            ema_alpha: config.center_ema_alpha,
            hold_max: plan.hold_max,
            suspect_confirm: plan.suspect_confirm,
            exclusion_zones: config.exclusion_zones.clone(),
            camera,
            last: None,
            hold_age: 0,
            miss_streak: 0,
            suspect: None,
            accepted_centers: VecDeque::with_capacity(HISTORY_CAP),
            accepted_confs: VecDeque::with_capacity(HISTORY_CAP),
            ema_center: None,
        }
    }

    /// Rebuild frame-domain thresholds after an FPS re-observation.
    pub fn set_plan(&mut self, plan: &FramePlan) {
        self.hold_max = plan.hold_max;
        self.suspect_confirm = plan.suspect_confirm;
    }

    /// The orchestrator applied a switch: drop all state.
    pub fn notify_camera_switch(&mut self, camera: CameraId) {
        debug!(from = %self.camera, to = %camera, "sticky tracker reset");
        self.camera = camera;
        self.last = None;
        self.hold_age = 0;
        self.miss_streak = 0;
        self.suspect = None;
        self.accepted_centers.clear();
        self.accepted_confs.clear();
        self.ema_center = None;
    }

    /// Consecutive frames without an accepted detection.
    pub fn miss_streak(&self) -> u32 {
        self.miss_streak
    }

    /// Stabilize one detection.
    pub fn update(
        &mut self,
        detection: &BallDetection,
        camera: CameraId,
        timeline_index: u64,
        frame_size: (u32, u32),
    ) -> StickyOutcome {
        debug_assert_eq!(camera, self.camera, "camera changes must go through notify");

        let Some(bbox) = detection.bbox.filter(|_| !detection.meta.error) else {
            return self.decline(Decline::Empty, detection, timeline_index);
        };
        let center = bbox.center();
        let ncenter = normalize(center, frame_size);

        // 1. Exclusion zones
        if self.in_exclusion(ncenter) && detection.conf < self.exclude_override_conf {
            return self.decline(Decline::Exclusion, detection, timeline_index);
        }

        // 2. Stationary filter
        if self.stationary_suspicious(frame_size) {
            return self.decline(Decline::Stationary, detection, timeline_index);
        }

        // 3. Jump gate with suspect confirmation
        if let Some(last) = self.last {
            let dist = point_distance(center, last.center);
            let iou = bbox.iou(&last.bbox);
            if dist > self.jump_distance_px && iou < self.min_jump_iou {
                match self.suspect {
                    Some(s)
                        if timeline_index == s.timeline_index + 1
                            && point_distance(center, s.center) <= self.jump_distance_px =>
                    {
                        let confirms = s.confirms + 1;
                        if confirms >= self.suspect_confirm {
                            self.suspect = None;
                            return self.accept(bbox, detection, timeline_index);
                        }
                        self.suspect = Some(Suspect {
                            center,
                            timeline_index,
                            confirms,
                        });
                        return self.decline(Decline::Confirming, detection, timeline_index);
                    }
                    _ => {
                        self.suspect = Some(Suspect {
                            center,
                            timeline_index,
                            confirms: 0,
                        });
                        return self.decline(Decline::JumpNew, detection, timeline_index);
                    }
                }
            }
        }
        self.suspect = None;

        // 4. Confidence gate
        if detection.conf < self.gate_conf {
            return self.decline(Decline::LowConf, detection, timeline_index);
        }

        self.accept(bbox, detection, timeline_index)
    }

    fn accept(
        &mut self,
        bbox: BoundingBox,
        detection: &BallDetection,
        timeline_index: u64,
    ) -> StickyOutcome {
        let center = bbox.center();
        self.last = Some(LastAccepted {
            bbox,
            conf: detection.conf,
            center,
        });
        self.hold_age = 0;
        self.miss_streak = 0;

        self.accepted_centers.push_back(center);
        self.accepted_confs.push_back(detection.conf);
        while self.accepted_centers.len() > HISTORY_CAP {
            self.accepted_centers.pop_front();
            self.accepted_confs.pop_front();
        }

        self.ema_center = Some(match self.ema_center {
            Some((ex, ey)) => (
                self.ema_alpha * center.0 + (1.0 - self.ema_alpha) * ex,
                self.ema_alpha * center.1 + (1.0 - self.ema_alpha) * ey,
            ),
            None => center,
        });

        trace!(index = timeline_index, conf = detection.conf, "accepted");

        StickyOutcome {
            bbox: Some(bbox),
            conf: detection.conf,
            origin: StickyOrigin::Accepted,
            hold_age: 0,
            miss_streak: 0,
            smoothed_center: self.ema_center,
            meta: DetectionMeta {
                error: false,
                candidates: detection.meta.candidates,
                raw_center: Some(center),
                area_ema: detection.meta.area_ema,
            },
        }
    }

    fn decline(
        &mut self,
        cause: Decline,
        detection: &BallDetection,
        timeline_index: u64,
    ) -> StickyOutcome {
        self.miss_streak += 1;

        let cause_origin = match cause {
            Decline::Exclusion => StickyOrigin::RejectedExclusion,
            Decline::Stationary => StickyOrigin::RejectedStationary,
            Decline::JumpNew => StickyOrigin::RejectedJump,
            Decline::Confirming => StickyOrigin::Confirming,
            Decline::LowConf | Decline::Empty => StickyOrigin::Held,
        };

        let meta = DetectionMeta {
            error: detection.meta.error,
            candidates: detection.meta.candidates,
            raw_center: detection.center(),
            area_ema: detection.meta.area_ema,
        };

        match self.last {
            Some(last) if self.hold_age < self.hold_max => {
                self.hold_age += 1;
                trace!(index = timeline_index, hold_age = self.hold_age, "held");
                StickyOutcome {
                    bbox: Some(last.bbox),
                    conf: last.conf,
                    origin: cause_origin,
                    hold_age: self.hold_age,
                    miss_streak: self.miss_streak,
                    smoothed_center: self.ema_center,
                    meta,
                }
            }
            _ => StickyOutcome {
                bbox: None,
                conf: 0.0,
                origin: StickyOrigin::None,
                hold_age: self.hold_age,
                miss_streak: self.miss_streak,
                smoothed_center: None,
                meta,
            },
        }
    }

    fn in_exclusion(&self, ncenter: (f64, f64)) -> bool {
        self.exclusion_zones
            .get(&self.camera)
            .map(|zones| zones.iter().any(|z| z.contains(ncenter.0, ncenter.1)))
            .unwrap_or(false)
    }

    /// Stationary cluster check over the accepted history: every pair of
    /// recent centers within the radius, and either the cluster overlaps
    /// an exclusion zone or its mean confidence is low. A consistently
    /// confident stationary ball (set-piece) always passes.
    fn stationary_suspicious(&self, frame_size: (u32, u32)) -> bool {
        let n = self.stationary_window;
        if self.accepted_centers.len() < n {
            return false;
        }
        let centers: Vec<(f64, f64)> = self
            .accepted_centers
            .iter()
            .rev()
            .take(n)
            .copied()
            .collect();
        for i in 0..centers.len() {
            for j in (i + 1)..centers.len() {
                if point_distance(centers[i], centers[j]) > self.stationary_radius_px {
                    return false;
                }
            }
        }

        let mean_conf: f64 =
            self.accepted_confs.iter().rev().take(n).sum::<f64>() / n as f64;
        if mean_conf < self.stationary_low_conf {
            return true;
        }

        let mean = (
            centers.iter().map(|c| c.0).sum::<f64>() / n as f64,
            centers.iter().map(|c| c.1).sum::<f64>() / n as f64,
        );
        self.in_exclusion(normalize(mean, frame_size))
    }
}

fn normalize(point: (f64, f64), frame_size: (u32, u32)) -> (f64, f64) {
    (
        point.0 / frame_size.0.max(1) as f64,
        point.1 / frame_size.1.max(1) as f64,
    )
}
