//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use ballcam_models::CameraRole;

/// Produce a single football highlight from 2-3 synchronized camera
/// feeds by always showing the camera that best contains the ball.
#[derive(Debug, Parser)]
#[command(name = "ballcam-worker", version, about)]
pub struct Args {
    /// Input stream as ROLE=PATH, where ROLE is LEFT, RIGHT or MIDDLE.
    /// Given two or three times; camera ids follow the argument order.
    #[arg(short = 'i', long = "input", value_name = "ROLE=PATH", required = true)]
    pub inputs: Vec<String>,

    /// Output video path.
    #[arg(short = 'o', long, default_value = "highlight.mp4")]
    pub output: String,

    /// Optional JSON config file; omitted fields use defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output duration in seconds (overrides the config).
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Path to the YOLOv8 ONNX model.
    #[arg(long, default_value = "models/yolov8n.onnx")]
    pub model: String,

    /// Where to write the structured run report.
    #[arg(long, default_value = "ballcam-report.json")]
    pub report: String,

    /// Draw the debug overlay on output frames.
    #[arg(long)]
    pub debug_overlay: bool,
}

impl Args {
    /// Parse `ROLE=PATH` pairs in argument order.
    pub fn parse_inputs(&self) -> Result<Vec<(CameraRole, String)>, String> {
        self.inputs
            .iter()
            .map(|raw| {
                let (role, path) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("expected ROLE=PATH, got '{raw}'"))?;
                let role: CameraRole = role
                    .parse()
                    .map_err(|e| format!("bad role in '{raw}': {e}"))?;
                if path.is_empty() {
                    return Err(format!("empty path in '{raw}'"));
                }
                Ok((role, path.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() {
        let args = Args::parse_from([
            "ballcam-worker",
            "-i",
            "LEFT=a.mp4",
            "-i",
            "right=b.mp4",
        ]);
        let inputs = args.parse_inputs().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], (CameraRole::Left, "a.mp4".to_string()));
        assert_eq!(inputs[1], (CameraRole::Right, "b.mp4".to_string()));
    }

    #[test]
    fn test_parse_inputs_rejects_bad_role() {
        let args = Args::parse_from(["ballcam-worker", "-i", "GOAL=a.mp4"]);
        assert!(args.parse_inputs().is_err());
    }

    #[test]
    fn test_parse_inputs_rejects_missing_path() {
        let args = Args::parse_from(["ballcam-worker", "-i", "LEFT"]);
        assert!(args.parse_inputs().is_err());
    }
}
