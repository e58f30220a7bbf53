//! Run report assembly and persistence.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{DirectorError, DirectorResult};
use ballcam_models::report::percentile_95;
use ballcam_models::{
    CameraId, HoldReason, Phase0Report, RunCounters, RunReport, StreamInfo, SwitchEvent,
    WriterSummary,
};

/// Accumulates everything the report needs while the run is ticking.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    pub streams: Vec<StreamInfo>,
    pub phase0: Phase0Report,
    camera_usage: BTreeMap<CameraId, u64>,
    switches: Vec<SwitchEvent>,
    hold_reasons: BTreeMap<HoldReason, u64>,
    miss_streak_samples: Vec<u32>,
    pub frames_processed: u64,
    pub fallback_scans: u64,
    pub detector_errors: u64,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One written frame attributed to a camera.
    pub fn count_written(&mut self, camera: CameraId) {
        *self.camera_usage.entry(camera).or_insert(0) += 1;
    }

    pub fn count_hold(&mut self, reason: HoldReason) {
        *self.hold_reasons.entry(reason).or_insert(0) += 1;
    }

    pub fn record_switch(&mut self, event: SwitchEvent) {
        info!(
            from = %event.from,
            to = %event.to,
            reason = %event.reason,
            ref_index = event.ref_index,
            "switch applied"
        );
        self.switches.push(event);
    }

    pub fn sample_miss_streak(&mut self, miss_streak: u32) {
        self.miss_streak_samples.push(miss_streak);
    }

    pub fn switches(&self) -> &[SwitchEvent] {
        &self.switches
    }

    pub fn last_switch_index(&self) -> Option<u64> {
        self.switches.last().map(|e| e.ref_index)
    }

    /// Assemble the final report.
    pub fn finish(
        mut self,
        writer: WriterSummary,
        processing_time: f64,
        cancelled: bool,
    ) -> RunReport {
        let camera_count = self.streams.len();
        let warnings = RunReport::dominance_warnings(&self.camera_usage, camera_count);
        for w in &warnings {
            warn!(
                camera = %w.camera_id,
                fraction = w.fraction,
                "camera dominates the highlight"
            );
        }

        let counters = RunCounters {
            frames_processed: self.frames_processed,
            frames_written: writer.written,
            switches_applied: self.switches.len() as u64,
            fallback_scans: self.fallback_scans,
            detector_errors: self.detector_errors,
            miss_streak_p95: percentile_95(&mut self.miss_streak_samples),
        };

        RunReport {
            streams: self.streams,
            phase0: self.phase0,
            camera_usage: self.camera_usage,
            switches: self.switches,
            hold_reasons: self.hold_reasons,
            counters,
            writer,
            warnings,
            processing_time,
            cancelled,
        }
    }
}

/// Write a report as pretty JSON.
pub fn write_report(report: &RunReport, path: impl AsRef<Path>) -> DirectorResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| DirectorError::config(format!("cannot serialize report: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| DirectorError::config(format!("cannot write report {}: {e}", path.display())))?;
    info!(path = %path.display(), "run report written");
    Ok(())
}
