//! Fallback scan: find the ball on a non-active camera after it has
//! been lost near an exit zone for too long.
//!
//! Candidate detections accumulate over a bounded window with decayed
//! weights; confirmation needs either enough weight in one candidate
//! (`k_same`) or enough spread across alternating candidates (`k_alt`).
//! Repeated fruitless scanning backs off in cycles and is suppressed
//! until the next recovery.

use tracing::{debug, info};

use crate::clock::FramePlan;
use crate::config::DirectorConfig;
use ballcam_models::{BoundingBox, CameraId};

/// Sanity bounds for fallback candidates (pixel units).
const MIN_BBOX_SIDE: f64 = 8.0;
const MAX_BBOX_SIDE: f64 = 150.0;
const MIN_BBOX_AREA: f64 = 64.0;
const MAX_BBOX_AREA: f64 = 22_500.0;
const MIN_ASPECT: f64 = 0.5;
const MAX_ASPECT: f64 = 2.0;
const MAX_RELATIVE_AREA: f64 = 0.15;

/// Does a candidate bbox look like a ball at all?
pub fn bbox_is_sane(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> bool {
    let side_ok = bbox.width >= MIN_BBOX_SIDE
        && bbox.width <= MAX_BBOX_SIDE
        && bbox.height >= MIN_BBOX_SIDE
        && bbox.height <= MAX_BBOX_SIDE;
    let area = bbox.area();
    let area_ok = (MIN_BBOX_AREA..=MAX_BBOX_AREA).contains(&area);
    let aspect = bbox.aspect_ratio();
    let aspect_ok = (MIN_ASPECT..=MAX_ASPECT).contains(&aspect);
    let frame_area = frame_width as f64 * frame_height as f64;
    let relative_ok = frame_area > 0.0 && area / frame_area <= MAX_RELATIVE_AREA;
    side_ok && area_ok && aspect_ok && relative_ok
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    camera: CameraId,
    timeline_index: u64,
    conf: f64,
}

/// State machine driving fallback scans across ticks.
pub struct FallbackScanner {
    window: u32,
    pause: u32,
    k_same: f64,
    k_alt: f64,
    decay: f64,
    max_attempts: u32,
    max_cycles: u32,
    one_per_tick: bool,

    observations: Vec<Observation>,
    attempts: u32,
    cycles: u32,
    paused_until: Option<u64>,
    suppressed: bool,
    rr_cursor: usize,
}

impl FallbackScanner {
    /// Create a scanner from the config and frame plan.
    pub fn new(config: &DirectorConfig, plan: &FramePlan) -> Self {
        Self {
            window: plan.fallback_window,
            pause: plan.fallback_pause,
            k_same: config.k_same,
            k_alt: config.k_alt,
            decay: config.fallback_decay,
            max_attempts: config.fallback_max_attempts,
            max_cycles: config.fallback_max_cycles,
            one_per_tick: config.fallback_one_per_tick,
            observations: Vec::new(),
            attempts: 0,
            cycles: 0,
            paused_until: None,
            suppressed: false,
            rr_cursor: 0,
        }
    }

    /// Is the scanner willing to scan at this index? (Pause and
    /// suppression windows apply; the trigger conditions live in the
    /// orchestrator.)
    pub fn ready(&self, timeline_index: u64) -> bool {
        if self.suppressed {
            return false;
        }
        match self.paused_until {
            Some(until) => timeline_index >= until,
            None => true,
        }
    }

    /// Candidate cameras to scan this tick: all siblings, or one in
    /// round-robin order when capped.
    pub fn candidates(&mut self, cameras: &[CameraId], active: CameraId) -> Vec<CameraId> {
        let others: Vec<CameraId> = cameras.iter().copied().filter(|c| *c != active).collect();
        if others.is_empty() {
            return others;
        }
        if self.one_per_tick {
            let pick = others[self.rr_cursor % others.len()];
            self.rr_cursor = (self.rr_cursor + 1) % others.len();
            vec![pick]
        } else {
            others
        }
    }

    /// Record one sane candidate detection.
    pub fn record(&mut self, camera: CameraId, timeline_index: u64, conf: f64) {
        debug!(%camera, index = timeline_index, conf, "fallback candidate recorded");
        self.observations.push(Observation {
            camera,
            timeline_index,
            conf,
        });
    }

    /// Evaluate the confirmation thresholds. Returns the confirmed
    /// camera, if any.
    pub fn evaluate(&mut self, timeline_index: u64) -> Option<CameraId> {
        self.observations
            .retain(|o| timeline_index.saturating_sub(o.timeline_index) <= self.window as u64);
        if self.observations.is_empty() {
            return None;
        }

        let mut per_camera: Vec<(CameraId, f64)> = Vec::new();
        for obs in &self.observations {
            let weight = self.weight_at(timeline_index, obs.timeline_index);
            match per_camera.iter_mut().find(|(c, _)| *c == obs.camera) {
                Some((_, sum)) => *sum += weight,
                None => per_camera.push((obs.camera, weight)),
            }
        }
        per_camera.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let (best_camera, best_weight) = per_camera[0];

        // Same-candidate confirmation: a stationary or off-zone ball
        // keeps reappearing on one sibling.
        if best_weight >= self.k_same {
            info!(
                camera = %best_camera,
                weight = best_weight,
                "fallback confirmed on single candidate"
            );
            self.confirm();
            return Some(best_camera);
        }

        // Alternating pattern near zones: weight spread across several
        // candidates still confirms, routed to the strongest.
        let total: f64 = per_camera.iter().map(|(_, w)| w).sum();
        if per_camera.len() >= 2 && total >= self.k_alt {
            info!(
                camera = %best_camera,
                total,
                candidates = per_camera.len(),
                "fallback confirmed on alternating candidates"
            );
            self.confirm();
            return Some(best_camera);
        }

        None
    }

    /// A scan tick finished without confirmation.
    pub fn note_unconfirmed_attempt(&mut self, timeline_index: u64) {
        self.attempts += 1;
        if self.attempts < self.max_attempts {
            return;
        }
        self.attempts = 0;
        self.cycles += 1;
        self.observations.clear();
        if self.cycles >= self.max_cycles {
            info!(cycles = self.cycles, "fallback suppressed until next recovery");
            self.suppressed = true;
        } else {
            debug!(
                cycles = self.cycles,
                pause_frames = self.pause,
                "fallback pausing"
            );
            self.paused_until = Some(timeline_index + self.pause as u64);
        }
    }

    /// The ball was found again on the active camera: reset adaptive
    /// stopping so future losses can scan again.
    pub fn notify_recovered(&mut self) {
        self.observations.clear();
        self.attempts = 0;
        self.cycles = 0;
        self.paused_until = None;
        self.suppressed = false;
    }

    fn confirm(&mut self) {
        self.observations.clear();
        self.attempts = 0;
        self.cycles = 0;
        self.paused_until = None;
    }

    /// Observation weight: full for the first half of the window, then
    /// linear decay toward `decay` at the window end.
    fn weight_at(&self, now: u64, then: u64) -> f64 {
        let age = now.saturating_sub(then) as f64;
        let half = self.window as f64 / 2.0;
        if age <= half {
            return 1.0;
        }
        let t = ((age - half) / half.max(1.0)).min(1.0);
        1.0 + t * (self.decay - 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> FallbackScanner {
        let config = DirectorConfig::default();
        let plan = FramePlan::from_config(&config, 30.0);
        FallbackScanner::new(&config, &plan)
    }

    #[test]
    fn test_sanity_bounds() {
        let frame = (1280u32, 720u32);
        let good = BoundingBox::new(0.0, 0.0, 20.0, 24.0);
        assert!(bbox_is_sane(&good, frame.0, frame.1));

        // Too small
        assert!(!bbox_is_sane(&BoundingBox::new(0.0, 0.0, 4.0, 4.0), frame.0, frame.1));
        // Too large a side
        assert!(!bbox_is_sane(
            &BoundingBox::new(0.0, 0.0, 200.0, 100.0),
            frame.0,
            frame.1
        ));
        // Bad aspect
        assert!(!bbox_is_sane(
            &BoundingBox::new(0.0, 0.0, 60.0, 12.0),
            frame.0,
            frame.1
        ));
        // Huge relative to a tiny frame
        assert!(!bbox_is_sane(&BoundingBox::new(0.0, 0.0, 60.0, 60.0), 100, 100));
    }

    #[test]
    fn test_same_candidate_confirms() {
        let mut scanner = scanner();
        // Three consecutive scans on camera 1 within the window.
        scanner.record(CameraId(1), 100, 0.40);
        scanner.record(CameraId(1), 101, 0.45);
        assert_eq!(scanner.evaluate(101), None);
        scanner.record(CameraId(1), 102, 0.50);
        assert_eq!(scanner.evaluate(102), Some(CameraId(1)));
        // Confirmation clears state.
        assert_eq!(scanner.evaluate(103), None);
    }

    #[test]
    fn test_alternating_candidates_confirm() {
        let mut scanner = scanner();
        scanner.record(CameraId(1), 100, 0.4);
        scanner.record(CameraId(2), 101, 0.4);
        scanner.record(CameraId(1), 102, 0.4);
        assert_eq!(scanner.evaluate(102), None); // total 3.0 < k_alt 4.0
        scanner.record(CameraId(2), 103, 0.4);
        // Total 4.0 across two candidates; strongest (lowest id on tie) wins.
        assert_eq!(scanner.evaluate(103), Some(CameraId(1)));
    }

    #[test]
    fn test_old_observations_expire() {
        let mut scanner = scanner();
        scanner.record(CameraId(1), 0, 0.5);
        scanner.record(CameraId(1), 1, 0.5);
        scanner.record(CameraId(1), 2, 0.5);
        // Window is 60 frames at 30 fps; index 100 is far past it.
        assert_eq!(scanner.evaluate(100), None);
    }

    #[test]
    fn test_decayed_weights_delay_confirmation() {
        let mut scanner = scanner();
        // Observations in the decayed half of the 60-frame window.
        scanner.record(CameraId(1), 0, 0.5);
        scanner.record(CameraId(1), 1, 0.5);
        scanner.record(CameraId(1), 2, 0.5);
        // At index 55 each weight has decayed well below 1.0, so the
        // same-candidate threshold of 3.0 is no longer met.
        assert_eq!(scanner.evaluate(55), None);
        // Fresh observations restore full weight.
        scanner.record(CameraId(1), 56, 0.5);
        scanner.record(CameraId(1), 57, 0.5);
        scanner.record(CameraId(1), 58, 0.5);
        assert_eq!(scanner.evaluate(58), Some(CameraId(1)));
    }

    #[test]
    fn test_round_robin_candidates() {
        let mut scanner = scanner();
        let cams = [CameraId(0), CameraId(1), CameraId(2)];
        assert_eq!(scanner.candidates(&cams, CameraId(0)), vec![CameraId(1)]);
        assert_eq!(scanner.candidates(&cams, CameraId(0)), vec![CameraId(2)]);
        assert_eq!(scanner.candidates(&cams, CameraId(0)), vec![CameraId(1)]);
    }

    #[test]
    fn test_all_candidates_when_uncapped() {
        let config = DirectorConfig {
            fallback_one_per_tick: false,
            ..Default::default()
        };
        let plan = FramePlan::from_config(&config, 30.0);
        let mut scanner = FallbackScanner::new(&config, &plan);
        let cams = [CameraId(0), CameraId(1), CameraId(2)];
        assert_eq!(
            scanner.candidates(&cams, CameraId(1)),
            vec![CameraId(0), CameraId(2)]
        );
    }

    #[test]
    fn test_adaptive_stopping_pauses_then_suppresses() {
        let config = DirectorConfig {
            fallback_max_attempts: 2,
            fallback_max_cycles: 2,
            ..Default::default()
        };
        let plan = FramePlan::from_config(&config, 30.0);
        let mut scanner = FallbackScanner::new(&config, &plan);

        assert!(scanner.ready(0));
        scanner.note_unconfirmed_attempt(0);
        assert!(scanner.ready(1));
        scanner.note_unconfirmed_attempt(1);
        // Cycle 1 complete: paused for 150 frames (5s at 30fps).
        assert!(!scanner.ready(2));
        assert!(scanner.ready(151));

        scanner.note_unconfirmed_attempt(151);
        scanner.note_unconfirmed_attempt(152);
        // Cycle 2 complete: suppressed.
        assert!(!scanner.ready(1000));

        // Recovery clears suppression.
        scanner.notify_recovered();
        assert!(scanner.ready(1001));
    }
}
