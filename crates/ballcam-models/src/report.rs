//! Structured end-of-run report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::camera::{CameraId, CameraRole};
use crate::decision::{HoldReason, SwitchEvent};

/// Fraction of written frames above which a camera is flagged as
/// dominating a multi-camera run.
pub const DOMINANCE_THRESHOLD: f64 = 0.90;

/// Per-input metadata gathered at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub camera_id: CameraId,
    pub role: CameraRole,
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

/// Phase-0 detection statistics for one camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Phase0CameraStats {
    pub frames_scanned: u64,
    pub valid_detections: u64,
    pub mean_conf: f64,
}

/// Summary of the startup scan that picked the initial camera.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Phase0Report {
    pub per_camera: BTreeMap<CameraId, Phase0CameraStats>,
    pub chosen: CameraId,
    /// Timeline position all streams were synced to when phase 0 ended.
    pub start_index: u64,
}

/// Writer-side summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WriterSummary {
    pub written: u64,
    pub n_target: u64,
    /// `written / f_out`, in seconds.
    pub duration_written: f64,
    pub output_fps: f64,
}

/// Scalar counters accumulated over the run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub frames_processed: u64,
    pub frames_written: u64,
    pub switches_applied: u64,
    pub fallback_scans: u64,
    pub detector_errors: u64,
    pub miss_streak_p95: u32,
}

/// Warning emitted when one camera dominates a multi-camera run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominanceWarning {
    pub camera_id: CameraId,
    /// Fraction of written frames in [0, 1].
    pub fraction: f64,
}

/// The structured run report, serialized to JSON at the end of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub streams: Vec<StreamInfo>,
    pub phase0: Phase0Report,
    pub camera_usage: BTreeMap<CameraId, u64>,
    pub switches: Vec<SwitchEvent>,
    pub hold_reasons: BTreeMap<HoldReason, u64>,
    pub counters: RunCounters,
    pub writer: WriterSummary,
    pub warnings: Vec<DominanceWarning>,
    /// Wall-clock processing time in seconds. Never influences pacing.
    pub processing_time: f64,
    pub cancelled: bool,
}

impl RunReport {
    /// Compute dominance warnings from the usage map. Only meaningful
    /// for multi-camera runs; single-camera runs produce no warning.
    pub fn dominance_warnings(
        usage: &BTreeMap<CameraId, u64>,
        camera_count: usize,
    ) -> Vec<DominanceWarning> {
        if camera_count < 2 {
            return Vec::new();
        }
        let total: u64 = usage.values().sum();
        if total == 0 {
            return Vec::new();
        }
        usage
            .iter()
            .filter_map(|(id, count)| {
                let fraction = *count as f64 / total as f64;
                (fraction > DOMINANCE_THRESHOLD).then_some(DominanceWarning {
                    camera_id: *id,
                    fraction,
                })
            })
            .collect()
    }
}

/// p95 of a sample set; zero for empty input.
pub fn percentile_95(samples: &mut [u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let rank = ((samples.len() as f64) * 0.95).ceil() as usize;
    samples[rank.saturating_sub(1).min(samples.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominance_warning_fires() {
        let mut usage = BTreeMap::new();
        usage.insert(CameraId(0), 95u64);
        usage.insert(CameraId(1), 5u64);

        let warnings = RunReport::dominance_warnings(&usage, 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].camera_id, CameraId(0));
        assert!((warnings[0].fraction - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_dominance_not_warned_at_even_split() {
        let mut usage = BTreeMap::new();
        usage.insert(CameraId(0), 60u64);
        usage.insert(CameraId(1), 40u64);
        assert!(RunReport::dominance_warnings(&usage, 2).is_empty());
    }

    #[test]
    fn test_dominance_skipped_for_single_camera() {
        let mut usage = BTreeMap::new();
        usage.insert(CameraId(0), 100u64);
        assert!(RunReport::dominance_warnings(&usage, 1).is_empty());
    }

    #[test]
    fn test_percentile_95() {
        let mut samples: Vec<u32> = (1..=100).collect();
        assert_eq!(percentile_95(&mut samples), 95);
        assert_eq!(percentile_95(&mut []), 0);
        assert_eq!(percentile_95(&mut [7]), 7);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport::default();
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("camera_usage"));
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
    }
}
