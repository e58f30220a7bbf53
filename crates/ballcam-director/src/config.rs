//! Configuration for the director pipeline.
//!
//! Every time-like threshold is stored in seconds and converted to frame
//! counts against the observed FPS (see [`crate::clock::FramePlan`]), so
//! one config works across 25/30/50 fps material.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DirectorError, DirectorResult};
use ballcam_models::{CameraId, Zone};

/// Configuration for the director pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectorConfig {
    // === Ball detector ===
    /// Confidence floor for ball candidates (default: 0.15)
    pub conf_threshold: f64,

    /// Confidence above which the motion prior is bypassed (default: 0.70)
    pub high_conf_override: f64,

    /// Hard cap on distance from the motion prior, in pixels; candidates
    /// farther than this score zero unless above the override (default: 150)
    pub max_motion_jump_px: f64,

    /// Score multiplier for candidates off the pitch mask (default: 0.3)
    pub off_pitch_penalty: f64,

    /// Enable the HSV green-band pitch prior (default: true)
    pub pitch_mask_enabled: bool,

    // === Sticky tracker ===
    /// Confidence below which a detection is held instead of accepted
    /// (default: 0.25)
    pub gate_conf: f64,

    /// Confidence that overrides exclusion zones (default: 0.85)
    pub exclude_override_conf: f64,

    /// Mean confidence below which a stationary cluster is rejected
    /// (default: 0.40)
    pub stationary_low_conf: f64,

    /// Jump gate distance in pixels (default: 120)
    pub jump_distance_px: f64,

    /// Minimum bbox IoU that lets a long jump pass without suspicion
    /// (default: 0.10)
    pub min_jump_iou: f64,

    /// Radius in pixels within which centers count as stationary
    /// (default: 8)
    pub stationary_radius_px: f64,

    /// Number of recent accepted centers examined by the stationary
    /// filter (default: 5)
    pub stationary_window: usize,

    /// Hold budget in seconds (default: 0.5)
    pub hold_max_s: f64,

    /// Time a suspect candidate has to reappear before acceptance
    /// (default: 0.033, one frame at 30 fps)
    pub suspect_confirm_s: f64,

    /// EMA smoothing factor for the emitted center (default: 0.3)
    pub center_ema_alpha: f64,

    /// Per-camera exclusion zones in normalized coordinates
    /// (scoreboards, bench areas)
    pub exclusion_zones: BTreeMap<CameraId, Vec<Zone>>,

    // === Switcher ===
    /// Confidence making an accepted detection count as FOUND
    /// (default: 0.30)
    pub found_conf: f64,

    /// Cooldown between applied switches, seconds (default: 2.0)
    pub cooldown_s: f64,

    /// Minimum accumulated time on the active camera, seconds
    /// (default: 1.0)
    pub min_hold_s: f64,

    /// Zone arming time, seconds (default: 0.2)
    pub arm_s: f64,

    /// Zone stability time, seconds (default: 0.0)
    pub stable_s: f64,

    /// Disarm grace tolerating brief zone exits, seconds (default: 0.2)
    pub disarm_s: f64,

    /// Miss streak that can drive a velocity-based switch, seconds
    /// (default: 0.7)
    pub miss_s: f64,

    /// Strong-opposite-motion threshold, normalized units per frame
    /// (default: 0.002)
    pub away_velocity: f64,

    /// Exit probability gate (default: 0.50)
    pub exit_prob_threshold: f64,

    /// Middle camera filmed from the opposite sideline: invert its
    /// left/right routing (default: false)
    pub middle_opposite: bool,

    // === Orchestrator ===
    /// Ball lost this long triggers the fallback scan, seconds
    /// (default: 2.0)
    pub fallback_after_s: f64,

    /// Last known center must be within this normalized distance of an
    /// exit zone for fallback to engage (default: 0.08)
    pub exit_proximity: f64,

    /// Weighted detections required in a single candidate camera
    /// (default: 3.0)
    pub k_same: f64,

    /// Weighted detections required across alternating candidates
    /// (default: 4.0)
    pub k_alt: f64,

    /// Confirmation window for fallback detections, seconds
    /// (default: 2.0)
    pub fallback_window_s: f64,

    /// Weight that old fallback observations decay toward (default: 0.5)
    pub fallback_decay: f64,

    /// Scan attempts before pausing fallback (default: 40)
    pub fallback_max_attempts: u32,

    /// Pause between fallback cycles, seconds (default: 5.0)
    pub fallback_pause_s: f64,

    /// Fallback cycles before suppression until recovery (default: 3)
    pub fallback_max_cycles: u32,

    /// Scan one candidate camera per tick instead of all (default: true)
    pub fallback_one_per_tick: bool,

    /// Require a ball detection on the target frame before committing a
    /// switch (default: false; recommended for 3-camera runs)
    pub pre_switch_require_ball: bool,

    /// Maximum frames scanned per stream in phase 0 (default: 300)
    pub phase0_scan_frames: u64,

    // === Writer ===
    /// Output duration in seconds (default: 60.0)
    pub duration_s: f64,

    /// Output FPS used when the stream does not report one
    /// (default: 30.0)
    pub output_fps_fallback: f64,

    /// Draw the debug overlay on written frames (default: false)
    pub debug_overlay: bool,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            // Ball detector
            conf_threshold: 0.15,
            high_conf_override: 0.70,
            max_motion_jump_px: 150.0,
            off_pitch_penalty: 0.3,
            pitch_mask_enabled: true,

            // Sticky tracker
            gate_conf: 0.25,
            exclude_override_conf: 0.85,
            stationary_low_conf: 0.40,
            jump_distance_px: 120.0,
            min_jump_iou: 0.10,
            stationary_radius_px: 8.0,
            stationary_window: 5,
            hold_max_s: 0.5,
            suspect_confirm_s: 0.033,
            center_ema_alpha: 0.3,
            exclusion_zones: BTreeMap::new(),

            // Switcher
            found_conf: 0.30,
            cooldown_s: 2.0,
            min_hold_s: 1.0,
            arm_s: 0.2,
            stable_s: 0.0,
            disarm_s: 0.2,
            miss_s: 0.7,
            away_velocity: 0.002,
            exit_prob_threshold: 0.50,
            middle_opposite: false,

            // Orchestrator
            fallback_after_s: 2.0,
            exit_proximity: 0.08,
            k_same: 3.0,
            k_alt: 4.0,
            fallback_window_s: 2.0,
            fallback_decay: 0.5,
            fallback_max_attempts: 40,
            fallback_pause_s: 5.0,
            fallback_max_cycles: 3,
            fallback_one_per_tick: true,
            pre_switch_require_ball: false,
            phase0_scan_frames: 300,

            // Writer
            duration_s: 60.0,
            output_fps_fallback: 30.0,
            debug_overlay: false,
        }
    }
}

impl DirectorConfig {
    /// Load from a JSON file. Unknown fields are rejected so typos fail
    /// loudly at startup.
    pub fn from_file(path: impl AsRef<Path>) -> DirectorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DirectorError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: DirectorConfig = serde_json::from_str(&text).map_err(|e| {
            DirectorError::config(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> DirectorResult<()> {
        if self.duration_s <= 0.0 {
            return Err(DirectorError::config("duration_s must be positive"));
        }
        if self.output_fps_fallback <= 0.0 {
            return Err(DirectorError::config("output_fps_fallback must be positive"));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold)
            || !(0.0..=1.0).contains(&self.gate_conf)
            || !(0.0..=1.0).contains(&self.found_conf)
            || !(0.0..=1.0).contains(&self.exit_prob_threshold)
        {
            return Err(DirectorError::config(
                "confidence thresholds must lie in [0, 1]",
            ));
        }
        if self.stationary_window == 0 {
            return Err(DirectorError::config("stationary_window must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.fallback_decay) {
            return Err(DirectorError::config("fallback_decay must lie in [0, 1]"));
        }
        Ok(())
    }
}
