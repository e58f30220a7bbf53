//! YOLOv8 ONNX detection backend.
//!
//! Runs a stock YOLOv8 COCO model through ONNX Runtime. Hardware
//! execution providers (CUDA behind the `cuda` feature, CoreML behind
//! `coreml`) are registered ahead of CPU and ort falls back through the
//! list. The director only consumes the sports-ball class, but the
//! backend reports every class above the confidence floor so the
//! candidate filter stays in one place.

use std::path::Path;
use std::sync::Mutex;

use image::{imageops, ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::backend::DetectionBackend;
use crate::error::{MediaError, MediaResult};
use ballcam_models::{BoundingBox, FramePixels, RawDetection};

/// COCO class id of "sports ball".
pub const SPORTS_BALL_CLASS_ID: usize = 32;

/// Candidate columns in the YOLOv8 output.
const YOLO_CANDIDATES: usize = 8400;
/// Rows per candidate: cx, cy, w, h followed by 80 class scores.
const YOLO_ATTRS: usize = 84;
const COCO_CLASS_COUNT: usize = 80;
/// Name of the prediction tensor in exported YOLOv8 models.
const MODEL_OUTPUT: &str = "output0";

/// Configuration for the ONNX backend.
#[derive(Debug, Clone)]
pub struct OrtBackendConfig {
    /// Path to the ONNX model file
    pub model_path: String,
    /// Confidence floor applied before NMS
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Model input size (square)
    pub input_size: u32,
}

impl Default for OrtBackendConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.10,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// YOLOv8 object detector usable as a `DetectionBackend`.
pub struct OrtBallBackend {
    session: Mutex<Session>,
    config: OrtBackendConfig,
}

impl OrtBallBackend {
    /// Load the model. Returns an error if the file is missing or the
    /// session cannot be created.
    pub fn new(config: OrtBackendConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(load_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "detection backend initialized"
        );

        Ok(Self { session, config })
    }

    /// Build the model input straight from a BGR frame: resize while
    /// still in BGR (interpolation is channel-order agnostic), then fill
    /// the planar NCHW tensor with the BGR-to-RGB swap fused in.
    fn to_tensor(&self, pixels: &FramePixels) -> MediaResult<Value> {
        let expected = (pixels.width * pixels.height * 3) as usize;
        if pixels.data.len() != expected {
            return Err(MediaError::internal(format!(
                "frame buffer is {} bytes, expected {}",
                pixels.data.len(),
                expected
            )));
        }

        let bgr: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(pixels.width, pixels.height, pixels.data.clone())
                .ok_or_else(|| MediaError::internal("frame buffer does not match dimensions"))?;

        let side = self.config.input_size;
        let resized = imageops::resize(&bgr, side, side, imageops::FilterType::Triangle);

        let n = side as usize;
        let mut planes = Array4::<f32>::zeros((1, 3, n, n));
        for (x, y, px) in resized.enumerate_pixels() {
            let (xi, yi) = (x as usize, y as usize);
            // BGR bytes land in RGB plane order.
            planes[[0, 0, yi, xi]] = px[2] as f32 / 255.0;
            planes[[0, 1, yi, xi]] = px[1] as f32 / 255.0;
            planes[[0, 2, yi, xi]] = px[0] as f32 / 255.0;
        }

        let data = planes.into_raw_vec_and_offset().0;
        Tensor::from_array((vec![1usize, 3, n, n], data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("failed to build input tensor: {e}")))
    }

    /// Parse the flat `[1, 84, 8400]` prediction block into pixel-space
    /// detections and apply NMS. The block is attribute-major, so
    /// attribute `f` of candidate `i` lives at `f * 8400 + i`.
    fn postprocess(
        &self,
        data: &[f32],
        orig_width: u32,
        orig_height: u32,
    ) -> MediaResult<Vec<RawDetection>> {
        if data.len() != YOLO_ATTRS * YOLO_CANDIDATES {
            return Err(MediaError::detection_failed(format!(
                "model output has {} values, expected {} x {}",
                data.len(),
                YOLO_ATTRS,
                YOLO_CANDIDATES
            )));
        }
        let attr = |f: usize, i: usize| data[f * YOLO_CANDIDATES + i];

        let to_px_x = orig_width as f32 / self.config.input_size as f32;
        let to_px_y = orig_height as f32 / self.config.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..YOLO_CANDIDATES {
            let (class_id, score) = (0..COCO_CLASS_COUNT)
                .map(|c| (c, attr(4 + c, i)))
                .fold(
                    (0, 0.0f32),
                    |best, cur| if cur.1 > best.1 { cur } else { best },
                );
            if score < self.config.confidence_threshold {
                continue;
            }

            let cx = attr(0, i) * to_px_x;
            let cy = attr(1, i) * to_px_y;
            let w = (attr(2, i) * to_px_x).min(orig_width as f32);
            let h = (attr(3, i) * to_px_y).min(orig_height as f32);

            candidates.push(RawDetection {
                bbox: BoundingBox::new(
                    (cx - w / 2.0).max(0.0) as f64,
                    (cy - h / 2.0).max(0.0) as f64,
                    w as f64,
                    h as f64,
                ),
                conf: score as f64,
                class_id,
            });
        }

        Ok(non_maximum_suppression(
            candidates,
            self.config.nms_threshold as f64,
        ))
    }
}

impl DetectionBackend for OrtBallBackend {
    fn detect(&mut self, pixels: &FramePixels) -> MediaResult<Vec<RawDetection>> {
        let input = self.to_tensor(pixels)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("inference failed: {e}")))?;
        let predictions = outputs
            .get(MODEL_OUTPUT)
            .ok_or_else(|| {
                MediaError::detection_failed(format!("model has no {MODEL_OUTPUT} tensor"))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("bad output tensor: {e}")))?;

        let detections = self.postprocess(predictions.1, pixels.width, pixels.height)?;

        debug!(count = detections.len(), "backend detection completed");
        Ok(detections)
    }
}

/// Per-class Non-Maximum Suppression.
fn non_maximum_suppression(mut detections: Vec<RawDetection>, threshold: f64) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.conf
            .partial_cmp(&a.conf)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if detections[i].bbox.iou(&detections[j].bbox) > threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Load the model, registering hardware execution providers where the
/// build carries them. Providers fall back in registration order down
/// to CPU, so a missing driver degrades instead of failing the run.
fn load_session(model_path: &Path) -> MediaResult<Session> {
    let mut builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("session setup failed: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("session setup failed: {e}")))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    let builder = {
        use ort::execution_providers::CUDAExecutionProvider;
        info!("registering CUDA execution provider");
        builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| MediaError::internal(format!("CUDA registration failed: {e}")))?
    };

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    let builder = {
        use ort::execution_providers::CoreMLExecutionProvider;
        info!("registering CoreML execution provider");
        builder
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
            .map_err(|e| MediaError::internal(format!("CoreML registration failed: {e}")))?
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| MediaError::internal(format!("failed to load {}: {e}", model_path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, conf: f64, class_id: usize) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(x, 0.0, 20.0, 20.0),
            conf,
            class_id,
        }
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let dets = vec![det(0.0, 0.9, 32), det(2.0, 0.6, 32), det(200.0, 0.5, 32)];
        let kept = non_maximum_suppression(dets, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].conf - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_distinct_classes() {
        let dets = vec![det(0.0, 0.9, 32), det(2.0, 0.6, 0)];
        let kept = non_maximum_suppression(dets, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_config_default() {
        let config = OrtBackendConfig::default();
        assert_eq!(config.input_size, 640);
        assert!((config.nms_threshold - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_missing_model_errors() {
        let config = OrtBackendConfig {
            model_path: "/nonexistent/yolo.onnx".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            OrtBallBackend::new(config),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
