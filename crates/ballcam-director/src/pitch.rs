//! HSV green-band pitch prior.
//!
//! Samples a small patch around a candidate center and reports whether
//! the surrounding pixels look like playing field. Works directly on the
//! BGR buffer so it stays backend-neutral.

use ballcam_models::FramePixels;

/// Green band in OpenCV HSV conventions (H in 0..180).
const HUE_MIN: f64 = 35.0;
const HUE_MAX: f64 = 85.0;
const SAT_MIN: f64 = 60.0;
const VAL_MIN: f64 = 40.0;

/// Half-width of the sampled patch, in pixels.
const PATCH_RADIUS: u32 = 8;
/// Sampling stride within the patch.
const PATCH_STEP: u32 = 2;
/// Fraction of sampled pixels that must be green.
const GREEN_FRACTION: f64 = 0.5;

/// Pitch prior over a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchMask;

impl PitchMask {
    /// Is the patch around `center` (pixel coordinates) predominantly
    /// pitch-green?
    pub fn is_on_pitch(&self, pixels: &FramePixels, center: (f64, f64)) -> bool {
        let cx = center.0.round().max(0.0) as u32;
        let cy = center.1.round().max(0.0) as u32;

        let x0 = cx.saturating_sub(PATCH_RADIUS);
        let y0 = cy.saturating_sub(PATCH_RADIUS);
        let x1 = (cx + PATCH_RADIUS).min(pixels.width.saturating_sub(1));
        let y1 = (cy + PATCH_RADIUS).min(pixels.height.saturating_sub(1));

        let mut total = 0u32;
        let mut green = 0u32;
        let mut y = y0;
        while y <= y1 {
            let mut x = x0;
            while x <= x1 {
                if let Some((b, g, r)) = pixels.pixel(x, y) {
                    total += 1;
                    let (h, s, v) = bgr_to_hsv(b, g, r);
                    if (HUE_MIN..=HUE_MAX).contains(&h) && s >= SAT_MIN && v >= VAL_MIN {
                        green += 1;
                    }
                }
                x += PATCH_STEP;
            }
            y += PATCH_STEP;
        }

        if total == 0 {
            return false;
        }
        green as f64 / total as f64 >= GREEN_FRACTION
    }
}

/// BGR to HSV in OpenCV conventions: H in 0..180, S and V in 0..255.
fn bgr_to_hsv(b: u8, g: u8, r: u8) -> (f64, f64, f64) {
    let b = b as f64;
    let g = g as f64;
    let r = r as f64;

    let max = b.max(g).max(r);
    let min = b.min(g).min(r);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (g - b) / delta
    } else if (max - g).abs() < f64::EPSILON {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    (h / 2.0, s, v)
}
