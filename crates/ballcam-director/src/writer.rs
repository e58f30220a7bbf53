//! Deterministic frame pacing to a fixed-duration output.
//!
//! The writer stops on frame count alone: `⌊D · f_out⌋` frames, however
//! long processing takes. Wall-clock time never influences stopping.

use tracing::info;

use crate::error::DirectorResult;
use ballcam_media::{FrameSink, MediaResult};
use ballcam_models::{FramePixels, WriterSummary};

/// Paced writer around a lazily-initialized sink.
pub struct PacedWriter<K> {
    sink: K,
    output_fps: f64,
    n_target: u64,
    written: u64,
}

impl<K: FrameSink> PacedWriter<K> {
    /// Plan `⌊duration * fps⌋` output frames.
    pub fn new(sink: K, duration_s: f64, output_fps: f64) -> Self {
        let n_target = (duration_s * output_fps).floor().max(0.0) as u64;
        info!(n_target, output_fps, duration_s, "writer planned");
        Self {
            sink,
            output_fps,
            n_target,
            written: 0,
        }
    }

    /// Append one frame if the target has not been reached. Returns
    /// whether the frame was written; `false` means the run is complete.
    /// A failed write is retried once before the error propagates.
    pub fn write(&mut self, pixels: &FramePixels) -> MediaResult<bool> {
        if self.written >= self.n_target {
            return Ok(false);
        }
        if let Err(first) = self.sink.write(pixels) {
            tracing::warn!("sink write failed, retrying once: {first}");
            self.sink.write(pixels)?;
        }
        self.written += 1;
        Ok(true)
    }

    /// Have all target frames been written?
    pub fn done(&self) -> bool {
        self.written >= self.n_target
    }

    /// Frames written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Target frame count.
    pub fn n_target(&self) -> u64 {
        self.n_target
    }

    /// Finalize the sink and summarize.
    pub fn finalize(&mut self) -> DirectorResult<WriterSummary> {
        self.sink.finalize()?;
        let summary = WriterSummary {
            written: self.written,
            n_target: self.n_target,
            duration_written: if self.output_fps > 0.0 {
                self.written as f64 / self.output_fps
            } else {
                0.0
            },
            output_fps: self.output_fps,
        };
        info!(
            written = summary.written,
            n_target = summary.n_target,
            duration = summary.duration_written,
            "writer finalized"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballcam_media::MediaError;

    /// Sink counting frames, optionally failing.
    #[derive(Default)]
    struct CountingSink {
        frames: Vec<(u32, u32)>,
        finalized: bool,
        fail_next: bool,
        fail_always: bool,
    }

    impl FrameSink for CountingSink {
        fn write(&mut self, pixels: &FramePixels) -> MediaResult<()> {
            if self.fail_always {
                return Err(MediaError::SinkWrite("disk full".to_string()));
            }
            if self.fail_next {
                self.fail_next = false;
                return Err(MediaError::SinkWrite("transient".to_string()));
            }
            self.frames.push((pixels.width, pixels.height));
            Ok(())
        }

        fn finalize(&mut self) -> MediaResult<()> {
            self.finalized = true;
            Ok(())
        }
    }

    #[test]
    fn test_exact_frame_count() {
        let mut writer = PacedWriter::new(CountingSink::default(), 10.0, 30.0);
        assert_eq!(writer.n_target(), 300);

        let px = FramePixels::black(64, 36);
        let mut accepted = 0u64;
        for _ in 0..400 {
            if writer.write(&px).unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 300);
        assert!(writer.done());
        assert_eq!(writer.written(), 300);
    }

    #[test]
    fn test_duration_floor() {
        let writer = PacedWriter::new(CountingSink::default(), 1.05, 30.0);
        assert_eq!(writer.n_target(), 31); // floor(31.5)
    }

    #[test]
    fn test_transient_write_retried_once() {
        let sink = CountingSink {
            fail_next: true,
            ..Default::default()
        };
        let mut writer = PacedWriter::new(sink, 1.0, 30.0);
        let px = FramePixels::black(64, 36);
        assert!(writer.write(&px).unwrap());
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn test_persistent_write_fails() {
        let sink = CountingSink {
            fail_always: true,
            ..Default::default()
        };
        let mut writer = PacedWriter::new(sink, 1.0, 30.0);
        let px = FramePixels::black(64, 36);
        assert!(writer.write(&px).is_err());
        assert_eq!(writer.written(), 0);
    }

    #[test]
    fn test_finalize_summary() {
        let mut writer = PacedWriter::new(CountingSink::default(), 1.0, 25.0);
        let px = FramePixels::black(64, 36);
        for _ in 0..25 {
            writer.write(&px).unwrap();
        }
        let summary = writer.finalize().unwrap();
        assert_eq!(summary.written, 25);
        assert_eq!(summary.n_target, 25);
        assert!((summary.duration_written - 1.0).abs() < 1e-9);
    }
}
