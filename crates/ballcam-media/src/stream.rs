//! Camera stream handles with true-position seek.
//!
//! The director never counts frames itself; the authoritative timeline
//! index always comes from `position()` after a successful read.

use crate::error::MediaResult;
#[cfg(feature = "opencv")]
use crate::error::MediaError;
use ballcam_models::FramePixels;

/// A seekable stream of decoded frames.
///
/// `read` returns `Ok(None)` at end of stream; real decode failures are
/// errors. `position` reports the index of the *next* frame the stream
/// would produce, so the frame just read lives at `position() - 1`.
pub trait FrameStream {
    /// Read and decode the next frame.
    fn read(&mut self) -> MediaResult<Option<FramePixels>>;

    /// Hard-sync: seek so that the next read produces `frame_index`.
    fn seek(&mut self, frame_index: u64) -> MediaResult<()>;

    /// True position: index of the next frame to be read.
    fn position(&mut self) -> MediaResult<u64>;

    /// Frames per second reported by the container.
    fn fps(&self) -> f64;

    /// Frame dimensions `(width, height)`.
    fn frame_size(&self) -> (u32, u32);

    /// Human-readable source identifier for logs.
    fn source_name(&self) -> &str;
}

/// OpenCV `VideoCapture`-backed stream.
#[cfg(feature = "opencv")]
pub struct VideoFileStream {
    capture: opencv::videoio::VideoCapture,
    source: String,
    fps: f64,
    width: u32,
    height: u32,
}

#[cfg(feature = "opencv")]
impl VideoFileStream {
    /// Open a video file or URL.
    pub fn open(source: &str) -> MediaResult<Self> {
        use opencv::prelude::*;
        use opencv::videoio::{self, VideoCapture};

        let capture =
            VideoCapture::from_file(source, videoio::CAP_ANY).map_err(|e| MediaError::StreamOpen {
                source_name: source.to_string(),
                message: e.to_string(),
            })?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(MediaError::StreamOpen {
                source_name: source.to_string(),
                message: "capture did not open".to_string(),
            });
        }

        let fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;

        if width == 0 || height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{source}: zero frame dimensions"
            )));
        }

        tracing::info!(source, fps, width, height, "opened video stream");

        Ok(Self {
            capture,
            source: source.to_string(),
            fps,
            width,
            height,
        })
    }
}

#[cfg(feature = "opencv")]
impl FrameStream for VideoFileStream {
    fn read(&mut self) -> MediaResult<Option<FramePixels>> {
        use opencv::core::Mat;
        use opencv::prelude::*;

        let mut mat = Mat::default();
        let index = self.position().unwrap_or(0);
        let ok = self
            .capture
            .read(&mut mat)
            .map_err(|e| MediaError::stream_read(index, e.to_string()))?;

        if !ok || mat.empty() {
            return Ok(None);
        }

        let data = mat
            .data_bytes()
            .map_err(|e| MediaError::stream_read(index, e.to_string()))?
            .to_vec();
        let width = mat.cols() as u32;
        let height = mat.rows() as u32;

        Ok(Some(FramePixels::new(width, height, data)))
    }

    fn seek(&mut self, frame_index: u64) -> MediaResult<()> {
        use opencv::prelude::*;
        use opencv::videoio;

        self.capture
            .set(videoio::CAP_PROP_POS_FRAMES, frame_index as f64)
            .map_err(|e| MediaError::stream_seek(frame_index, e.to_string()))?;
        Ok(())
    }

    fn position(&mut self) -> MediaResult<u64> {
        use opencv::prelude::*;
        use opencv::videoio;

        let pos = self
            .capture
            .get(videoio::CAP_PROP_POS_FRAMES)
            .map_err(|e| MediaError::internal(e.to_string()))?;
        Ok(pos.max(0.0) as u64)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn source_name(&self) -> &str {
        &self.source
    }
}
