//! Highlight director binary.

mod args;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Args;
use ballcam_director::{CancelFlag, DirectorConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("ballcam=info".parse().unwrap())
        .add_directive("ort=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("starting ballcam-worker");

    let args = Args::parse();
    let exit_code = run(args).await;
    std::process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let inputs = match args.parse_inputs() {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("invalid --input: {e}");
            return 2;
        }
    };

    let mut config = match &args.config {
        Some(path) => match DirectorConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                return 2;
            }
        },
        None => DirectorConfig::default(),
    };
    if let Some(duration) = args.duration {
        config.duration_s = duration;
    }
    if args.debug_overlay {
        config.debug_overlay = true;
    }
    apply_env_overrides(&mut config);
    if let Err(e) = config.validate() {
        error!("{e}");
        return 2;
    }

    if inputs.len() == 3 && !config.pre_switch_require_ball {
        info!("three cameras configured; consider pre_switch_require_ball=true");
    }

    // Probe inputs up front so the report carries real metadata and
    // broken files fail before any capture opens.
    let mut stream_infos = Vec::new();
    for (idx, (role, source)) in inputs.iter().enumerate() {
        match ballcam_media::probe_video(source).await {
            Ok(info) => {
                info!(
                    source,
                    role = %role,
                    fps = info.fps,
                    duration = info.duration,
                    codec = %info.codec,
                    "input probed"
                );
                stream_infos.push(ballcam_models::StreamInfo {
                    camera_id: ballcam_models::CameraId(idx as u32),
                    role: *role,
                    source: source.clone(),
                    width: info.width,
                    height: info.height,
                    fps: info.fps,
                    duration: Some(info.duration),
                    codec: Some(info.codec),
                });
            }
            Err(e) => warn!(source, "probe failed (continuing): {e}"),
        }
    }

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            ctrl_c_flag.cancel();
        }
    });

    let report_path = args.report.clone();
    let result =
        tokio::task::spawn_blocking(move || run_pipeline(args, inputs, config, stream_infos, cancel))
            .await;

    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!("run failed: {e}");
            return 1;
        }
        Err(e) => {
            error!("pipeline task panicked: {e}");
            return 1;
        }
    };

    if let Err(e) = ballcam_director::report::write_report(&report, &report_path) {
        error!("{e}");
        return 1;
    }

    info!(
        frames_written = report.writer.written,
        switches = report.counters.switches_applied,
        cancelled = report.cancelled,
        "done"
    );
    0
}

/// `BALLCAM_*` environment overrides for the most commonly tuned knobs.
fn apply_env_overrides(config: &mut DirectorConfig) {
    if let Some(v) = env_parse::<f64>("BALLCAM_DURATION_S") {
        config.duration_s = v;
    }
    if let Some(v) = env_parse::<bool>("BALLCAM_PRE_SWITCH_REQUIRE_BALL") {
        config.pre_switch_require_ball = v;
    }
    if let Some(v) = env_parse::<bool>("BALLCAM_PITCH_MASK") {
        config.pitch_mask_enabled = v;
    }
    if let Some(v) = env_parse::<bool>("BALLCAM_DEBUG_OVERLAY") {
        config.debug_overlay = v;
    }
    if let Some(v) = env_parse::<f64>("BALLCAM_COOLDOWN_S") {
        config.cooldown_s = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(feature = "opencv")]
fn run_pipeline(
    args: Args,
    inputs: Vec<(ballcam_models::CameraRole, String)>,
    config: DirectorConfig,
    stream_infos: Vec<ballcam_models::StreamInfo>,
    cancel: CancelFlag,
) -> Result<ballcam_models::RunReport, ballcam_director::DirectorError> {
    use ballcam_director::{CameraUnit, Orchestrator};
    use ballcam_media::{
        FrameStream, OrtBackendConfig, OrtBallBackend, VideoFileSink, VideoFileStream,
    };
    use ballcam_models::CameraId;

    let mut cameras = Vec::new();
    for (idx, (role, source)) in inputs.iter().enumerate() {
        let stream = VideoFileStream::open(source)?;
        cameras.push(CameraUnit {
            id: CameraId(idx as u32),
            role: *role,
            stream,
        });
    }

    let backend = OrtBallBackend::new(OrtBackendConfig {
        model_path: args.model.clone(),
        ..Default::default()
    })?;

    let fps = cameras
        .first()
        .map(|c| c.stream.fps())
        .filter(|f| *f > 0.0)
        .unwrap_or(config.output_fps_fallback);
    let sink = VideoFileSink::new(&args.output, fps);

    let orchestrator = Orchestrator::new(cameras, backend, sink, config, cancel)?;
    let orchestrator = if stream_infos.is_empty() {
        orchestrator
    } else {
        orchestrator.with_stream_infos(stream_infos)
    };
    orchestrator.run()
}

#[cfg(not(feature = "opencv"))]
fn run_pipeline(
    _args: Args,
    _inputs: Vec<(ballcam_models::CameraRole, String)>,
    _config: DirectorConfig,
    _stream_infos: Vec<ballcam_models::StreamInfo>,
    _cancel: CancelFlag,
) -> Result<ballcam_models::RunReport, ballcam_director::DirectorError> {
    Err(ballcam_director::DirectorError::config(
        "built without video support; rebuild with `--features opencv`",
    ))
}
