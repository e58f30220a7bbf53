//! Output sink written by the paced writer.

use crate::error::MediaResult;
use ballcam_models::FramePixels;

/// A sink accepting finished frames.
///
/// Implementations initialize lazily on the first frame so resolution
/// and pixel format always match the stream.
pub trait FrameSink {
    /// Append one frame.
    fn write(&mut self, pixels: &FramePixels) -> MediaResult<()>;

    /// Flush and close the sink. Idempotent.
    fn finalize(&mut self) -> MediaResult<()>;
}

/// OpenCV `VideoWriter`-backed sink with lazy initialization.
#[cfg(feature = "opencv")]
pub struct VideoFileSink {
    path: String,
    fps: f64,
    writer: Option<opencv::videoio::VideoWriter>,
    finalized: bool,
}

#[cfg(feature = "opencv")]
impl VideoFileSink {
    /// Create a sink that will encode to `path` at `fps` once the first
    /// frame arrives.
    pub fn new(path: &str, fps: f64) -> Self {
        Self {
            path: path.to_string(),
            fps,
            writer: None,
            finalized: false,
        }
    }

    fn ensure_writer(&mut self, pixels: &FramePixels) -> MediaResult<()> {
        use crate::error::MediaError;
        use opencv::core::Size;
        use opencv::videoio::{VideoWriter, VideoWriterTrait};

        if self.writer.is_some() {
            return Ok(());
        }

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')
            .map_err(|e| MediaError::SinkWrite(e.to_string()))?;
        let size = Size::new(pixels.width as i32, pixels.height as i32);
        let writer = VideoWriter::new(&self.path, fourcc, self.fps, size, true)
            .map_err(|e| MediaError::SinkWrite(e.to_string()))?;

        tracing::info!(
            path = %self.path,
            fps = self.fps,
            width = pixels.width,
            height = pixels.height,
            "output sink initialized"
        );

        self.writer = Some(writer);
        Ok(())
    }
}

#[cfg(feature = "opencv")]
impl FrameSink for VideoFileSink {
    fn write(&mut self, pixels: &FramePixels) -> MediaResult<()> {
        use crate::error::MediaError;
        use opencv::core::{Mat, Mat_AUTO_STEP, CV_8UC3};
        use opencv::videoio::VideoWriterTrait;

        self.ensure_writer(pixels)?;

        // Wrap the BGR buffer without copying; VideoWriter copies on write.
        let mat = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                pixels.height as i32,
                pixels.width as i32,
                CV_8UC3,
                pixels.data.as_ptr() as *mut std::ffi::c_void,
                Mat_AUTO_STEP,
            )
        }
        .map_err(|e| MediaError::SinkWrite(e.to_string()))?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MediaError::SinkWrite("sink not initialized".to_string()))?;
        writer
            .write(&mat)
            .map_err(|e| MediaError::SinkWrite(e.to_string()))?;
        Ok(())
    }

    fn finalize(&mut self) -> MediaResult<()> {
        use crate::error::MediaError;
        use opencv::videoio::VideoWriterTrait;

        if self.finalized {
            return Ok(());
        }
        if let Some(writer) = self.writer.as_mut() {
            writer
                .release()
                .map_err(|e| MediaError::SinkWrite(e.to_string()))?;
        }
        self.finalized = true;
        Ok(())
    }
}

#[cfg(feature = "opencv")]
impl Drop for VideoFileSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
