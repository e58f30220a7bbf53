//! The orchestrator: timeline owner and invariant enforcer.
//!
//! Ticks one world frame at a time: read the active stream, detect,
//! stabilize, decide, and hand exactly one frame to the writer. The
//! authoritative timeline index `t_ref` always comes from the active
//! stream's true position; every committed switch passes a pre-flight
//! that hard-syncs the target to `t_ref` first, so no temporal jump is
//! ever observable downstream.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cancel::CancelFlag;
use crate::clock::FramePlan;
use crate::config::DirectorConfig;
use crate::detector::BallDetector;
use crate::error::{DirectorError, DirectorResult};
use crate::fallback::{bbox_is_sane, FallbackScanner};
use crate::report::ReportBuilder;
use crate::sticky::StickyTracker;
use crate::switcher::{Switcher, ZoneMap};
use crate::writer::PacedWriter;
use ballcam_media::{ball_candidates, DetectionBackend, FrameSink, FrameStream, OverlayInfo,
    SPORTS_BALL_CLASS_ID};
use ballcam_models::{
    camera::validate_roles, CameraId, CameraRole, DecisionAction, Frame, FramePixels,
    Phase0CameraStats, Phase0Report, RunReport, StickyOrigin, StreamInfo, SwitchEvent,
    SwitchReason, ZoneLabel,
};

/// Phase 0 never scans more than this much wall time per stream.
const PHASE0_TIME_CAP_S: f64 = 10.0;
/// FPS delta that counts as a re-observation.
const FPS_EPSILON: f64 = 0.01;

/// One camera owned by the orchestrator for the full run.
pub struct CameraUnit<S> {
    pub id: CameraId,
    pub role: CameraRole,
    pub stream: S,
}

/// The director pipeline, ready to run.
pub struct Orchestrator<S, B, K> {
    cameras: Vec<CameraUnit<S>>,
    backend: B,
    sink: K,
    config: DirectorConfig,
    cancel: CancelFlag,
    stream_infos: Vec<StreamInfo>,
}

impl<S: FrameStream, B: DetectionBackend, K: FrameSink> Orchestrator<S, B, K> {
    /// Validate the role assignment and build the orchestrator.
    pub fn new(
        cameras: Vec<CameraUnit<S>>,
        backend: B,
        sink: K,
        config: DirectorConfig,
        cancel: CancelFlag,
    ) -> DirectorResult<Self> {
        config.validate()?;
        let roles: Vec<(CameraId, CameraRole)> =
            cameras.iter().map(|c| (c.id, c.role)).collect();
        validate_roles(&roles)?;

        let fps0 = cameras[0].stream.fps();
        for unit in &cameras[1..] {
            if (unit.stream.fps() - fps0).abs() > FPS_EPSILON {
                warn!(
                    camera = %unit.id,
                    fps = unit.stream.fps(),
                    reference_fps = fps0,
                    "input FPS mismatch; switches may drift"
                );
            }
        }

        let stream_infos = cameras
            .iter()
            .map(|c| {
                let (width, height) = c.stream.frame_size();
                StreamInfo {
                    camera_id: c.id,
                    role: c.role,
                    source: c.stream.source_name().to_string(),
                    width,
                    height,
                    fps: c.stream.fps(),
                    duration: None,
                    codec: None,
                }
            })
            .collect();

        Ok(Self {
            cameras,
            backend,
            sink,
            config,
            cancel,
            stream_infos,
        })
    }

    /// Attach probe metadata for the run report.
    pub fn with_stream_infos(mut self, infos: Vec<StreamInfo>) -> Self {
        self.stream_infos = infos;
        self
    }

    /// Run to completion. Streams and the sink are released on every
    /// exit path; cancellation yields a normal report flagged
    /// `cancelled`.
    pub fn run(self) -> DirectorResult<RunReport> {
        let Orchestrator {
            mut cameras,
            backend,
            sink,
            config,
            cancel,
            stream_infos,
        } = self;

        let started = Instant::now();
        let roles: Vec<(CameraId, CameraRole)> =
            cameras.iter().map(|c| (c.id, c.role)).collect();
        let zone_map = ZoneMap::build(&roles, config.middle_opposite)?;

        let mut report = ReportBuilder::new();
        report.streams = stream_infos;

        let mut detector = BallDetector::new(backend, &config);

        // ---- Phase 0: pick the starting camera ----
        let (phase0, cancelled_in_phase0) =
            run_phase0(&mut cameras, &mut detector, &config, &cancel);
        let mut active = phase0.chosen;
        let mut t_ref = phase0.start_index;
        report.phase0 = phase0;

        if cancelled_in_phase0 {
            info!("cancelled during phase 0");
            let mut writer = PacedWriter::new(sink, config.duration_s, config.output_fps_fallback);
            let summary = writer.finalize()?;
            return Ok(report.finish(summary, started.elapsed().as_secs_f64(), true));
        }

        for unit in cameras.iter_mut() {
            if unit.id != active {
                if let Err(e) = unit.stream.seek(t_ref) {
                    warn!(camera = %unit.id, "phase 0 sync failed: {e}");
                }
            }
        }

        let fps = effective_fps(&cameras, active, &config);
        let mut plan = FramePlan::from_config(&config, fps);
        let mut sticky = StickyTracker::new(&config, &plan, active);
        let mut switcher = Switcher::new(&config, &plan, zone_map, active);
        let mut fallback = FallbackScanner::new(&config, &plan);
        let mut writer = PacedWriter::new(sink, config.duration_s, fps);

        let mut last_center_norm: Option<(f64, f64)> = None;
        let mut cancelled = false;

        info!(
            active = %active,
            t_ref,
            fps,
            n_target = writer.n_target(),
            "entering main loop"
        );

        // ---- Main loop ----
        while !writer.done() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // 1. Read the active frame; failover when the stream ends.
            let pixels = match read_with_retry(&mut cameras, active) {
                Some(px) => px,
                None => {
                    match failover(
                        &mut cameras,
                        &mut switcher,
                        &mut sticky,
                        &mut detector,
                        &mut report,
                        &config,
                        &mut plan,
                        &mut active,
                        t_ref,
                    )? {
                        Some((px, new_t_ref)) => {
                            t_ref = new_t_ref;
                            px
                        }
                        None => {
                            info!(t_ref, "all streams exhausted, ending run");
                            break;
                        }
                    }
                }
            };

            // 2. Authoritative timeline from the stream's true position.
            if let Some(stream) = find_stream(&mut cameras, active) {
                if let Ok(pos) = stream.position() {
                    t_ref = pos.saturating_sub(1);
                }
            }

            let frame_size = (pixels.width, pixels.height);
            let frame = Frame {
                camera_id: active,
                timeline_index: t_ref,
                pixels,
            };

            // 3. Detector -> Sticky -> Switcher.
            let detection = detector.detect(&frame);
            if detection.meta.error {
                report.detector_errors += 1;
            }

            let outcome = sticky.update(&detection, active, t_ref, frame_size);
            if outcome.origin == StickyOrigin::Accepted {
                fallback.notify_recovered();
            }

            let ncenter = outcome
                .center()
                .map(|c| frame.pixels.normalize(c));
            if outcome.origin == StickyOrigin::Accepted {
                last_center_norm = ncenter;
            }

            let decision = switcher.step(&outcome, ncenter, t_ref);

            // 4/5. Apply the decision, or scan for the lost ball.
            let mut out_pixels = frame.pixels;
            let mut out_camera = active;
            let mut out_zone: Option<ZoneLabel> = None;

            match decision.action {
                DecisionAction::Switch { to, reason, zone } => {
                    match pre_flight(&mut cameras, to, t_ref, &config, &mut detector)? {
                        PreFlight::Ready(target_px) => {
                            commit_switch(
                                &mut cameras,
                                &mut switcher,
                                &mut sticky,
                                &mut detector,
                                &mut report,
                                &config,
                                &mut plan,
                                &mut active,
                                t_ref,
                                to,
                                reason,
                                zone,
                                decision.exit_prob,
                            );
                            out_pixels = target_px;
                            out_camera = to;
                            out_zone = zone;
                            last_center_norm = None;
                        }
                        PreFlight::Unavailable => {
                            debug!(target = %to, t_ref, "pre-flight aborted: target unavailable");
                            report.count_hold(ballcam_models::HoldReason::TargetUnavailable);
                        }
                        PreFlight::NoBall => {
                            debug!(target = %to, t_ref, "pre-flight aborted: no ball on target");
                            report.count_hold(ballcam_models::HoldReason::TargetNoBall);
                        }
                    }
                }
                DecisionAction::Hold { reason } => {
                    report.count_hold(reason);

                    let near_exit = last_center_norm
                        .and_then(|(nx, ny)| {
                            switcher.zone_map().nearest_zone_distance(active, nx, ny)
                        })
                        .map(|d| d <= config.exit_proximity)
                        .unwrap_or(false);

                    if sticky.miss_streak() >= plan.fallback_after
                        && !switcher.in_cooldown()
                        && near_exit
                        && fallback.ready(t_ref)
                    {
                        report.fallback_scans += 1;
                        let all_ids: Vec<CameraId> = cameras.iter().map(|c| c.id).collect();
                        for candidate in fallback.candidates(&all_ids, active) {
                            scan_candidate(
                                &mut cameras,
                                candidate,
                                t_ref,
                                &config,
                                &mut detector,
                                &mut fallback,
                            );
                        }
                        match fallback.evaluate(t_ref) {
                            Some(target) => {
                                match pre_flight(&mut cameras, target, t_ref, &config, &mut detector)?
                                {
                                    PreFlight::Ready(target_px) => {
                                        commit_switch(
                                            &mut cameras,
                                            &mut switcher,
                                            &mut sticky,
                                            &mut detector,
                                            &mut report,
                                            &config,
                                            &mut plan,
                                            &mut active,
                                            t_ref,
                                            target,
                                            SwitchReason::FallbackConfirmed,
                                            None,
                                            decision.exit_prob,
                                        );
                                        out_pixels = target_px;
                                        out_camera = target;
                                        last_center_norm = None;
                                    }
                                    PreFlight::Unavailable => {
                                        report.count_hold(
                                            ballcam_models::HoldReason::TargetUnavailable,
                                        );
                                    }
                                    PreFlight::NoBall => {
                                        report
                                            .count_hold(ballcam_models::HoldReason::TargetNoBall);
                                    }
                                }
                            }
                            None => fallback.note_unconfirmed_attempt(t_ref),
                        }
                    }
                }
            }

            // 6. Hand the frame to the writer.
            if config.debug_overlay {
                let info = OverlayInfo {
                    camera_id: out_camera,
                    timeline_index: t_ref,
                    ball: outcome.bbox,
                    origin: outcome.origin,
                    zone: out_zone.map(|z| z.to_string()),
                    miss_streak: outcome.miss_streak,
                };
                ballcam_media::overlay::draw_overlay(&mut out_pixels, &info);
            }

            if writer.write(&out_pixels)? {
                report.count_written(out_camera);
            }
            report.frames_processed += 1;
            report.sample_miss_streak(outcome.miss_streak);
        }

        let summary = writer.finalize()?;
        let report = report.finish(summary, started.elapsed().as_secs_f64(), cancelled);
        info!(
            written = report.writer.written,
            switches = report.counters.switches_applied,
            cancelled,
            "run complete"
        );
        Ok(report)
    }
}

fn find_stream<S: FrameStream>(
    cameras: &mut [CameraUnit<S>],
    id: CameraId,
) -> Option<&mut S> {
    cameras
        .iter_mut()
        .find(|c| c.id == id)
        .map(|c| &mut c.stream)
}

fn effective_fps<S: FrameStream>(
    cameras: &[CameraUnit<S>],
    active: CameraId,
    config: &DirectorConfig,
) -> f64 {
    let fps = cameras
        .iter()
        .find(|c| c.id == active)
        .map(|c| c.stream.fps())
        .unwrap_or(0.0);
    if fps > 0.0 {
        fps
    } else {
        config.output_fps_fallback
    }
}

/// Read the active stream, retrying once on failure.
fn read_with_retry<S: FrameStream>(
    cameras: &mut [CameraUnit<S>],
    active: CameraId,
) -> Option<FramePixels> {
    let stream = find_stream(cameras, active)?;
    for attempt in 0..2 {
        match stream.read() {
            Ok(Some(px)) => return Some(px),
            Ok(None) => return None, // end of stream, no point retrying
            Err(e) if attempt == 0 => {
                warn!(camera = %active, "read failed, retrying once: {e}");
            }
            Err(e) => {
                warn!(camera = %active, "read failed twice: {e}");
            }
        }
    }
    None
}

/// Scan every stream for a bounded window and pick the camera with the
/// best (valid detections, mean confidence). Returns the report and
/// whether cancellation interrupted the scan.
fn run_phase0<S: FrameStream, B: DetectionBackend>(
    cameras: &mut [CameraUnit<S>],
    detector: &mut BallDetector<B>,
    config: &DirectorConfig,
    cancel: &CancelFlag,
) -> (Phase0Report, bool) {
    let mut per_camera = BTreeMap::new();
    let mut cancelled = false;

    'scan: for unit in cameras.iter_mut() {
        let fps = unit.stream.fps();
        let time_cap = if fps > 0.0 {
            (PHASE0_TIME_CAP_S * fps).ceil() as u64
        } else {
            config.phase0_scan_frames
        };
        let budget = config.phase0_scan_frames.min(time_cap);

        let mut stats = Phase0CameraStats::default();
        let mut conf_sum = 0.0;
        for _ in 0..budget {
            if cancel.is_cancelled() {
                cancelled = true;
                per_camera.insert(unit.id, stats);
                break 'scan;
            }
            let px = match unit.stream.read() {
                Ok(Some(px)) => px,
                _ => break,
            };
            stats.frames_scanned += 1;
            let Ok(raw) = detector.backend_mut().detect(&px) else {
                continue;
            };
            let best = ball_candidates(&raw, SPORTS_BALL_CLASS_ID, config.conf_threshold)
                .into_iter()
                .filter(|d| bbox_is_sane(&d.bbox, px.width, px.height))
                .map(|d| d.conf)
                .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
            if let Some(conf) = best {
                stats.valid_detections += 1;
                conf_sum += conf;
            }
        }
        if stats.valid_detections > 0 {
            stats.mean_conf = conf_sum / stats.valid_detections as f64;
        }
        info!(
            camera = %unit.id,
            frames = stats.frames_scanned,
            valid = stats.valid_detections,
            mean_conf = stats.mean_conf,
            "phase 0 scan"
        );
        per_camera.insert(unit.id, stats);
    }

    // Argmax by (valid detections, mean confidence), lowest id on ties.
    let chosen = per_camera
        .iter()
        .max_by(|(a_id, a), (b_id, b)| {
            a.valid_detections
                .cmp(&b.valid_detections)
                .then(
                    a.mean_conf
                        .partial_cmp(&b.mean_conf)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b_id.cmp(a_id))
        })
        .map(|(id, _)| *id)
        .unwrap_or_else(|| cameras.first().map(|c| c.id).unwrap_or_default());

    let start_index = find_stream(cameras, chosen)
        .and_then(|s| s.position().ok())
        .unwrap_or(0);

    info!(chosen = %chosen, start_index, "phase 0 complete");

    (
        Phase0Report {
            per_camera,
            chosen,
            start_index,
        },
        cancelled,
    )
}

enum PreFlight {
    Ready(FramePixels),
    Unavailable,
    NoBall,
}

/// Hard-sync the target to `t_ref` and read one frame. A sync reported
/// as successful whose true position diverged by more than one frame is
/// a fatal invariant violation; a one-frame divergence aborts the
/// switch so the ±0 boundary guarantee holds.
fn pre_flight<S: FrameStream, B: DetectionBackend>(
    cameras: &mut [CameraUnit<S>],
    target: CameraId,
    t_ref: u64,
    config: &DirectorConfig,
    detector: &mut BallDetector<B>,
) -> DirectorResult<PreFlight> {
    let Some(stream) = find_stream(cameras, target) else {
        return Ok(PreFlight::Unavailable);
    };

    if stream.seek(t_ref).is_err() {
        return Ok(PreFlight::Unavailable);
    }
    let px = match stream.read() {
        Ok(Some(px)) => px,
        _ => return Ok(PreFlight::Unavailable),
    };

    let got = match stream.position() {
        Ok(pos) => pos.saturating_sub(1),
        Err(_) => return Ok(PreFlight::Unavailable),
    };
    if got != t_ref {
        if got.abs_diff(t_ref) > 1 {
            let positions = collect_positions(cameras);
            error!(
                target = %target,
                t_ref,
                actual = got,
                ?positions,
                "hard-sync diverged, dumping stream positions"
            );
            return Err(DirectorError::InvariantViolation {
                camera: target,
                t_ref,
                actual: got,
            });
        }
        return Ok(PreFlight::Unavailable);
    }

    if config.pre_switch_require_ball {
        let Ok(raw) = detector.backend_mut().detect(&px) else {
            return Ok(PreFlight::NoBall);
        };
        let has_ball = ball_candidates(&raw, SPORTS_BALL_CLASS_ID, config.conf_threshold)
            .iter()
            .any(|d| bbox_is_sane(&d.bbox, px.width, px.height));
        if !has_ball {
            return Ok(PreFlight::NoBall);
        }
    }

    Ok(PreFlight::Ready(px))
}

fn collect_positions<S: FrameStream>(cameras: &mut [CameraUnit<S>]) -> BTreeMap<CameraId, u64> {
    cameras
        .iter_mut()
        .map(|c| (c.id, c.stream.position().unwrap_or(0)))
        .collect()
}

/// Commit an applied switch: log the event with every stream's true
/// position, reset the per-camera components, and re-derive frame-domain
/// thresholds when the new stream reports a different FPS.
#[allow(clippy::too_many_arguments)]
fn commit_switch<S: FrameStream, B: DetectionBackend>(
    cameras: &mut [CameraUnit<S>],
    switcher: &mut Switcher,
    sticky: &mut StickyTracker,
    detector: &mut BallDetector<B>,
    report: &mut ReportBuilder,
    config: &DirectorConfig,
    plan: &mut FramePlan,
    active: &mut CameraId,
    t_ref: u64,
    to: CameraId,
    reason: SwitchReason,
    zone: Option<ZoneLabel>,
    exit_prob: f64,
) {
    let stream_positions = collect_positions(cameras);
    report.record_switch(SwitchEvent {
        at: Utc::now(),
        ref_index: t_ref,
        from: *active,
        to,
        reason,
        zone,
        exit_prob,
        stream_positions,
    });

    switcher.apply_switch(to);
    sticky.notify_camera_switch(to);
    detector.reset_prior();
    *active = to;

    let new_fps = cameras
        .iter()
        .find(|c| c.id == to)
        .map(|c| c.stream.fps())
        .unwrap_or(plan.fps);
    if new_fps > 0.0 && (new_fps - plan.fps).abs() > FPS_EPSILON {
        info!(fps = new_fps, "FPS re-observed, rebuilding frame plan");
        *plan = FramePlan::from_config(config, new_fps);
        sticky.set_plan(plan);
        switcher.set_plan(plan);
    }
}

/// Failover after the active stream ended: hard-sync each sibling to
/// `t_ref` and take the first that reads.
#[allow(clippy::too_many_arguments)]
fn failover<S: FrameStream, B: DetectionBackend>(
    cameras: &mut [CameraUnit<S>],
    switcher: &mut Switcher,
    sticky: &mut StickyTracker,
    detector: &mut BallDetector<B>,
    report: &mut ReportBuilder,
    config: &DirectorConfig,
    plan: &mut FramePlan,
    active: &mut CameraId,
    t_ref: u64,
) -> DirectorResult<Option<(FramePixels, u64)>> {
    let ids: Vec<CameraId> = cameras
        .iter()
        .map(|c| c.id)
        .filter(|id| *id != *active)
        .collect();

    for id in ids {
        let Some(stream) = find_stream(cameras, id) else {
            continue;
        };
        if stream.seek(t_ref).is_err() {
            continue;
        }
        let px = match stream.read() {
            Ok(Some(px)) => px,
            _ => continue,
        };
        let new_t_ref = stream.position().map(|p| p.saturating_sub(1)).unwrap_or(t_ref);

        warn!(from = %*active, to = %id, t_ref, "active stream ended, failing over");
        commit_switch(
            cameras,
            switcher,
            sticky,
            detector,
            report,
            config,
            plan,
            active,
            new_t_ref,
            id,
            SwitchReason::ActiveStreamEnded,
            None,
            0.0,
        );
        return Ok(Some((px, new_t_ref)));
    }

    Ok(None)
}

/// Scan one fallback candidate: hard-sync, read, detect, sanity-check,
/// record the best surviving confidence.
fn scan_candidate<S: FrameStream, B: DetectionBackend>(
    cameras: &mut [CameraUnit<S>],
    candidate: CameraId,
    t_ref: u64,
    config: &DirectorConfig,
    detector: &mut BallDetector<B>,
    fallback: &mut FallbackScanner,
) {
    let Some(stream) = find_stream(cameras, candidate) else {
        return;
    };
    if stream.seek(t_ref).is_err() {
        return;
    }
    let px = match stream.read() {
        Ok(Some(px)) => px,
        _ => return,
    };
    let Ok(raw) = detector.backend_mut().detect(&px) else {
        return;
    };
    let best = ball_candidates(&raw, SPORTS_BALL_CLASS_ID, config.conf_threshold)
        .into_iter()
        .filter(|d| bbox_is_sane(&d.bbox, px.width, px.height))
        .map(|d| d.conf)
        .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
    if let Some(conf) = best {
        fallback.record(candidate, t_ref, conf);
    }
}
