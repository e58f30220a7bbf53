//! Seconds-to-frames conversion.
//!
//! Thresholds live in seconds in the config; the hot path works on
//! integer frame counts precomputed here. The plan is rebuilt whenever a
//! new FPS is observed.

use crate::config::DirectorConfig;

/// Frame-domain thresholds derived from a [`DirectorConfig`] and an
/// observed FPS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub fps: f64,
    /// Hold budget, frames
    pub hold_max: u32,
    /// Frames a suspect candidate has to reappear in
    pub suspect_confirm: u32,
    /// Cooldown between switches, frames
    pub cooldown: u32,
    /// Minimum time on the active camera, frames
    pub min_hold: u32,
    /// Zone arming, frames
    pub arm: u32,
    /// Zone stability, frames
    pub stable: u32,
    /// Disarm grace, frames
    pub disarm: u32,
    /// Miss streak for the velocity-based switch path, frames
    pub miss: u32,
    /// Miss streak that triggers the fallback scan, frames
    pub fallback_after: u32,
    /// Fallback confirmation window, frames
    pub fallback_window: u32,
    /// Pause between fallback cycles, frames
    pub fallback_pause: u32,
}

impl FramePlan {
    /// Convert every time-like threshold against the observed FPS.
    pub fn from_config(config: &DirectorConfig, fps: f64) -> Self {
        let fps = if fps > 0.0 {
            fps
        } else {
            config.output_fps_fallback
        };
        Self {
            fps,
            hold_max: secs_to_frames(config.hold_max_s, fps),
            suspect_confirm: secs_to_frames(config.suspect_confirm_s, fps),
            cooldown: secs_to_frames(config.cooldown_s, fps),
            min_hold: secs_to_frames(config.min_hold_s, fps),
            arm: secs_to_frames(config.arm_s, fps),
            stable: secs_to_frames_allow_zero(config.stable_s, fps),
            disarm: secs_to_frames(config.disarm_s, fps),
            miss: secs_to_frames(config.miss_s, fps),
            fallback_after: secs_to_frames(config.fallback_after_s, fps),
            fallback_window: secs_to_frames(config.fallback_window_s, fps),
            fallback_pause: secs_to_frames(config.fallback_pause_s, fps),
        }
    }
}

/// `ceil(secs * fps)`, at least one frame.
fn secs_to_frames(secs: f64, fps: f64) -> u32 {
    (secs * fps).ceil().max(1.0) as u32
}

/// `ceil(secs * fps)`; zero stays zero.
fn secs_to_frames_allow_zero(secs: f64, fps: f64) -> u32 {
    (secs * fps).ceil().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_at_30fps() {
        let plan = FramePlan::from_config(&DirectorConfig::default(), 30.0);
        assert_eq!(plan.cooldown, 60); // 2.0s
        assert_eq!(plan.min_hold, 30); // 1.0s
        assert_eq!(plan.arm, 6); // 0.2s
        assert_eq!(plan.stable, 0); // 0.0s
        assert_eq!(plan.hold_max, 15); // 0.5s
        assert_eq!(plan.suspect_confirm, 1); // 0.033s
        assert_eq!(plan.fallback_after, 60); // 2.0s
    }

    #[test]
    fn test_thresholds_scale_with_fps() {
        let config = DirectorConfig::default();
        let p30 = FramePlan::from_config(&config, 30.0);
        let p60 = FramePlan::from_config(&config, 60.0);
        assert_eq!(p60.cooldown, p30.cooldown * 2);
        assert_eq!(p60.fps, 60.0);
    }

    #[test]
    fn test_zero_fps_falls_back() {
        let config = DirectorConfig::default();
        let plan = FramePlan::from_config(&config, 0.0);
        assert_eq!(plan.fps, config.output_fps_fallback);
    }

    #[test]
    fn test_minimum_one_frame() {
        let config = DirectorConfig {
            arm_s: 0.001,
            ..Default::default()
        };
        let plan = FramePlan::from_config(&config, 30.0);
        assert_eq!(plan.arm, 1);
    }
}
