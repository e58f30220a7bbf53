//! End-to-end pipeline scenarios over synthetic streams and a scripted
//! detection backend.
//!
//! Frames carry their camera id and timeline index in the first bytes
//! of the pixel buffer, so the backend can script per-camera detections
//! and the sink can audit exactly which frame of which camera was
//! written at every output position.

use ballcam_director::{CameraUnit, CancelFlag, DirectorConfig, DirectorError, Orchestrator};
use ballcam_media::{DetectionBackend, FrameSink, FrameStream, MediaError, MediaResult};
use ballcam_models::{
    BoundingBox, CameraId, CameraRole, FramePixels, RawDetection, SwitchReason, ZoneLabel,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const BALL_CLASS: usize = 32;

// ---- test doubles ----

fn encode_frame(camera: u32, index: u64) -> FramePixels {
    let mut px = FramePixels::black(WIDTH, HEIGHT);
    px.data[0] = camera as u8;
    px.data[1..9].copy_from_slice(&index.to_le_bytes());
    px
}

fn decode_frame(px: &FramePixels) -> (u32, u64) {
    let camera = px.data[0] as u32;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&px.data[1..9]);
    (camera, u64::from_le_bytes(bytes))
}

/// Seekable stream of tagged frames.
struct SyntheticStream {
    id: u32,
    name: String,
    fps: f64,
    pos: u64,
    /// Frames available; reads past this return end-of-stream.
    len: u64,
    /// All reads fail from this position on.
    fail_from: Option<u64>,
    /// Seeks silently land 5 frames late.
    broken_seek: bool,
}

impl SyntheticStream {
    fn new(id: u32, len: u64) -> Self {
        Self {
            id,
            name: format!("synthetic-{id}"),
            fps: 30.0,
            pos: 0,
            len,
            fail_from: None,
            broken_seek: false,
        }
    }

    fn failing_from(mut self, index: u64) -> Self {
        self.fail_from = Some(index);
        self
    }

    fn with_broken_seek(mut self) -> Self {
        self.broken_seek = true;
        self
    }
}

impl FrameStream for SyntheticStream {
    fn read(&mut self) -> MediaResult<Option<FramePixels>> {
        if let Some(fail_from) = self.fail_from {
            if self.pos >= fail_from {
                return Err(MediaError::stream_read(self.pos, "synthetic failure"));
            }
        }
        if self.pos >= self.len {
            return Ok(None);
        }
        let px = encode_frame(self.id, self.pos);
        self.pos += 1;
        Ok(Some(px))
    }

    fn seek(&mut self, frame_index: u64) -> MediaResult<()> {
        self.pos = if self.broken_seek {
            frame_index + 5
        } else {
            frame_index
        };
        Ok(())
    }

    fn position(&mut self) -> MediaResult<u64> {
        Ok(self.pos)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Backend scripted as a function of (camera, timeline index).
struct ScriptedBackend<F> {
    script: F,
}

impl<F> DetectionBackend for ScriptedBackend<F>
where
    F: FnMut(u32, u64) -> Vec<RawDetection>,
{
    fn detect(&mut self, pixels: &FramePixels) -> MediaResult<Vec<RawDetection>> {
        let (camera, index) = decode_frame(pixels);
        Ok((self.script)(camera, index))
    }
}

/// Sink recording (camera, index) of every written frame.
#[derive(Default)]
struct AuditSink {
    written: Vec<(u32, u64)>,
    finalized: bool,
}

impl FrameSink for &mut AuditSink {
    fn write(&mut self, pixels: &FramePixels) -> MediaResult<()> {
        self.written.push(decode_frame(pixels));
        Ok(())
    }

    fn finalize(&mut self) -> MediaResult<()> {
        self.finalized = true;
        Ok(())
    }
}

/// A ball detection centered at normalized coordinates.
fn ball(nx: f64, ny: f64, conf: f64) -> RawDetection {
    let cx = nx * WIDTH as f64;
    let cy = ny * HEIGHT as f64;
    RawDetection {
        bbox: BoundingBox::new(cx - 8.0, cy - 8.0, 16.0, 16.0),
        conf,
        class_id: BALL_CLASS,
    }
}

fn test_config() -> DirectorConfig {
    DirectorConfig {
        pitch_mask_enabled: false,
        phase0_scan_frames: 0,
        duration_s: 10.0,
        ..Default::default()
    }
}

fn left_right_cameras(len: u64) -> Vec<CameraUnit<SyntheticStream>> {
    vec![
        CameraUnit {
            id: CameraId(0),
            role: CameraRole::Left,
            stream: SyntheticStream::new(0, len),
        },
        CameraUnit {
            id: CameraId(1),
            role: CameraRole::Right,
            stream: SyntheticStream::new(1, len),
        },
    ]
}

/// S1 script: ball near mid-field on camera 0, drifts right from frame
/// 61, inside the RIGHT exit zone from frame 73; camera 1 sees it near
/// its own mid-field.
fn s1_script(camera: u32, index: u64) -> Vec<RawDetection> {
    match camera {
        0 => {
            let nx = if index <= 60 {
                0.5
            } else if index <= 72 {
                0.5 + 0.029 * (index - 60) as f64
            } else {
                (0.85 + 0.004 * (index - 73) as f64).min(0.99)
            };
            vec![ball(nx, 0.5, 0.7)]
        }
        _ => vec![ball(0.3, 0.5, 0.7)],
    }
}

// ---- scenarios ----

#[test]
fn s1_ball_exits_right_switches_once() {
    let mut sink = AuditSink::default();
    let backend = ScriptedBackend { script: s1_script };
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        test_config(),
        CancelFlag::new(),
    )
    .unwrap();

    let report = orchestrator.run().unwrap();

    // Exactly one switch, to camera 1, reason ball_in_exit_zone.
    assert_eq!(report.switches.len(), 1);
    let event = &report.switches[0];
    assert_eq!(event.from, CameraId(0));
    assert_eq!(event.to, CameraId(1));
    assert_eq!(event.reason, SwitchReason::BallInExitZone);
    assert_eq!(event.zone, Some(ZoneLabel::Right));
    // Zone entry at 73 plus the 6-frame arming window.
    assert_eq!(event.ref_index, 79);

    // Exactly 300 frames; usage sums to 300 and splits at the switch.
    assert_eq!(report.writer.written, 300);
    assert_eq!(report.writer.n_target, 300);
    let usage: u64 = report.camera_usage.values().sum();
    assert_eq!(usage, 300);
    assert_eq!(report.camera_usage[&CameraId(0)], 79);
    assert_eq!(report.camera_usage[&CameraId(1)], 221);

    // Sync-at-switch: the first post-switch frame is camera 1 at the
    // switch index exactly.
    let first_after = sink.written[79];
    assert_eq!(first_after, (1, 79));
    assert!(sink.finalized);
}

#[test]
fn s1_written_timeline_is_monotonic() {
    let mut sink = AuditSink::default();
    let backend = ScriptedBackend { script: s1_script };
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        test_config(),
        CancelFlag::new(),
    )
    .unwrap();
    orchestrator.run().unwrap();

    let mut last = 0u64;
    for (_, index) in &sink.written {
        assert!(*index >= last, "timeline regressed: {index} < {last}");
        last = *index;
    }
}

#[test]
fn s1_rerun_is_deterministic() {
    let run = || {
        let mut sink = AuditSink::default();
        let backend = ScriptedBackend { script: s1_script };
        let orchestrator = Orchestrator::new(
            left_right_cameras(1000),
            backend,
            &mut sink,
            test_config(),
            CancelFlag::new(),
        )
        .unwrap();
        let report = orchestrator.run().unwrap();
        report
            .switches
            .iter()
            .map(|e| (e.ref_index, e.from, e.to, e.reason, e.zone))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn s2_stationary_corner_ball_switches_from_middle() {
    // MIDDLE active, ball dead-still in its LEFT zone with oscillating
    // but healthy confidence: the stationary filter must not block the
    // switch toward LEFT.
    let cameras = vec![
        CameraUnit {
            id: CameraId(0),
            role: CameraRole::Left,
            stream: SyntheticStream::new(0, 1000),
        },
        CameraUnit {
            id: CameraId(1),
            role: CameraRole::Right,
            stream: SyntheticStream::new(1, 1000),
        },
        CameraUnit {
            id: CameraId(2),
            role: CameraRole::Middle,
            stream: SyntheticStream::new(2, 1000),
        },
    ];
    let backend = ScriptedBackend {
        script: |camera: u32, index: u64| {
            if camera == 2 {
                let conf = if index % 2 == 0 { 0.55 } else { 0.80 };
                vec![ball(0.05, 0.5, conf)]
            } else {
                Vec::new()
            }
        },
    };
    let config = DirectorConfig {
        phase0_scan_frames: 5,
        duration_s: 3.0,
        ..test_config()
    };

    let mut sink = AuditSink::default();
    let orchestrator =
        Orchestrator::new(cameras, backend, &mut sink, config, CancelFlag::new()).unwrap();
    let report = orchestrator.run().unwrap();

    // Phase 0 picked the only camera that sees the ball.
    assert_eq!(report.phase0.chosen, CameraId(2));

    assert_eq!(report.switches.len(), 1);
    let event = &report.switches[0];
    assert_eq!(event.from, CameraId(2));
    assert_eq!(event.to, CameraId(0));
    assert_eq!(event.zone, Some(ZoneLabel::Left));
    assert_eq!(event.reason, SwitchReason::BallInExitZone);
    // Min-hold (1s = 30 frames) gates the switch, arming is long past.
    assert_eq!(event.ref_index, report.phase0.start_index + 29);
}

#[test]
fn s4_fallback_recovers_lost_ball() {
    // Ball visible on camera 0 near the RIGHT zone until frame 40, then
    // gone everywhere except camera 1.
    let backend = ScriptedBackend {
        script: |camera: u32, index: u64| match camera {
            0 if index < 40 => vec![ball(0.80, 0.5, 0.7)],
            1 => vec![ball(0.5, 0.5, 0.45)],
            _ => Vec::new(),
        },
    };
    let config = DirectorConfig {
        phase0_scan_frames: 5,
        duration_s: 6.0,
        ..test_config()
    };

    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        config,
        CancelFlag::new(),
    )
    .unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.phase0.chosen, CameraId(0));
    assert_eq!(report.switches.len(), 1);
    let event = &report.switches[0];
    assert_eq!(event.to, CameraId(1));
    assert_eq!(event.reason, SwitchReason::FallbackConfirmed);
    // Lost at 40, fallback after 60 missed frames, three scans confirm.
    assert!(
        (99..=105).contains(&event.ref_index),
        "unexpected fallback index {}",
        event.ref_index
    );
    assert!(report.counters.fallback_scans >= 3);

    // No timeline regression across the fallback switch.
    let mut last = 0u64;
    for (_, index) in &sink.written {
        assert!(*index >= last);
        last = *index;
    }
}

#[test]
fn s5_target_unavailable_keeps_active() {
    // Camera 1 never yields a frame; the switch aborts in pre-flight
    // and the run carries on from camera 0.
    let cameras = vec![
        CameraUnit {
            id: CameraId(0),
            role: CameraRole::Left,
            stream: SyntheticStream::new(0, 1000),
        },
        CameraUnit {
            id: CameraId(1),
            role: CameraRole::Right,
            stream: SyntheticStream::new(1, 1000).failing_from(0),
        },
    ];
    let backend = ScriptedBackend { script: s1_script };
    let config = DirectorConfig {
        duration_s: 5.0,
        ..test_config()
    };

    let mut sink = AuditSink::default();
    let orchestrator =
        Orchestrator::new(cameras, backend, &mut sink, config, CancelFlag::new()).unwrap();
    let report = orchestrator.run().unwrap();

    assert!(report.switches.is_empty());
    let unavailable = report
        .hold_reasons
        .get(&ballcam_models::HoldReason::TargetUnavailable)
        .copied()
        .unwrap_or(0);
    assert!(unavailable >= 1, "pre-flight aborts must be recorded");
    assert!(sink.written.iter().all(|(camera, _)| *camera == 0));
    assert_eq!(report.writer.written, 150);
}

#[test]
fn s6_active_stream_end_fails_over() {
    // Camera 0 ends at frame 100 while camera 1 still has frames.
    let cameras = vec![
        CameraUnit {
            id: CameraId(0),
            role: CameraRole::Left,
            stream: SyntheticStream::new(0, 100),
        },
        CameraUnit {
            id: CameraId(1),
            role: CameraRole::Right,
            stream: SyntheticStream::new(1, 1000),
        },
    ];
    // Ball always mid-field: no zone-driven switch interferes.
    let backend = ScriptedBackend {
        script: |_camera: u32, _index: u64| vec![ball(0.5, 0.5, 0.7)],
    };
    let config = DirectorConfig {
        duration_s: 5.0,
        ..test_config()
    };

    let mut sink = AuditSink::default();
    let orchestrator =
        Orchestrator::new(cameras, backend, &mut sink, config, CancelFlag::new()).unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.switches.len(), 1);
    let event = &report.switches[0];
    assert_eq!(event.reason, SwitchReason::ActiveStreamEnded);
    assert_eq!(event.to, CameraId(1));

    // The run completed on the sibling.
    assert_eq!(report.writer.written, 150);
    assert_eq!(report.camera_usage[&CameraId(0)], 100);
    assert_eq!(report.camera_usage[&CameraId(1)], 50);

    // Failover hard-synced: no timeline regression at the boundary.
    let mut last = 0u64;
    for (_, index) in &sink.written {
        assert!(*index >= last);
        last = *index;
    }
}

#[test]
fn cooldown_enforced_between_switches() {
    // Ball parks in an exit zone of whichever camera is active, so the
    // switcher wants to ping-pong; cooldown must space the switches.
    let backend = ScriptedBackend {
        script: |camera: u32, index: u64| match camera {
            0 => {
                let nx = if index <= 60 { 0.5 } else { 0.95 };
                vec![ball(nx, 0.5, 0.7)]
            }
            _ => vec![ball(0.05, 0.5, 0.7)],
        },
    };

    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        test_config(),
        CancelFlag::new(),
    )
    .unwrap();
    let report = orchestrator.run().unwrap();

    assert!(
        report.switches.len() >= 3,
        "expected a ping-pong, got {} switches",
        report.switches.len()
    );
    for pair in report.switches.windows(2) {
        let gap = pair[1].ref_index - pair[0].ref_index;
        assert!(gap >= 60, "cooldown violated: gap {gap}");
    }
}

#[test]
fn broken_hard_sync_is_fatal() {
    let cameras = vec![
        CameraUnit {
            id: CameraId(0),
            role: CameraRole::Left,
            stream: SyntheticStream::new(0, 1000),
        },
        CameraUnit {
            id: CameraId(1),
            role: CameraRole::Right,
            stream: SyntheticStream::new(1, 1000).with_broken_seek(),
        },
    ];
    let backend = ScriptedBackend { script: s1_script };

    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        cameras,
        backend,
        &mut sink,
        test_config(),
        CancelFlag::new(),
    )
    .unwrap();

    match orchestrator.run() {
        Err(DirectorError::InvariantViolation { camera, .. }) => {
            assert_eq!(camera, CameraId(1));
        }
        other => panic!("expected invariant violation, got {other:?}"),
    }
}

#[test]
fn cancellation_is_clean() {
    let cancel = CancelFlag::new();
    cancel.cancel();

    let backend = ScriptedBackend { script: s1_script };
    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        test_config(),
        cancel,
    )
    .unwrap();

    let report = orchestrator.run().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.writer.written, 0);
    assert!(sink.finalized);
}

#[test]
fn pre_switch_ball_verification_blocks_empty_target() {
    // Camera 1 never sees the ball; with verification on, the switch
    // aborts with target_no_ball and camera 0 keeps the feed.
    let backend = ScriptedBackend {
        script: |camera: u32, index: u64| match camera {
            0 => s1_script(0, index),
            _ => Vec::new(),
        },
    };
    let config = DirectorConfig {
        pre_switch_require_ball: true,
        duration_s: 5.0,
        ..test_config()
    };

    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        config,
        CancelFlag::new(),
    )
    .unwrap();
    let report = orchestrator.run().unwrap();

    assert!(report.switches.is_empty());
    let no_ball = report
        .hold_reasons
        .get(&ballcam_models::HoldReason::TargetNoBall)
        .copied()
        .unwrap_or(0);
    assert!(no_ball >= 1);
    assert!(sink.written.iter().all(|(camera, _)| *camera == 0));
}

#[test]
fn dominance_warning_on_single_sided_run() {
    // Ball stays mid-field forever: no switches, camera 0 dominates.
    let backend = ScriptedBackend {
        script: |_camera: u32, _index: u64| vec![ball(0.5, 0.5, 0.7)],
    };
    let mut sink = AuditSink::default();
    let orchestrator = Orchestrator::new(
        left_right_cameras(1000),
        backend,
        &mut sink,
        test_config(),
        CancelFlag::new(),
    )
    .unwrap();
    let report = orchestrator.run().unwrap();

    assert!(report.switches.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].camera_id, CameraId(0));
    assert!(report.warnings[0].fraction > 0.99);
}
