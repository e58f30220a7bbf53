//! Optional debug overlay drawn onto written frames.

use ballcam_models::{BoundingBox, CameraId, FramePixels, StickyOrigin};

/// What to draw on the outgoing frame.
#[derive(Debug, Clone)]
pub struct OverlayInfo {
    pub camera_id: CameraId,
    pub timeline_index: u64,
    pub ball: Option<BoundingBox>,
    pub origin: StickyOrigin,
    pub zone: Option<String>,
    pub miss_streak: u32,
}

/// Draw the overlay in place. No-op when built without OpenCV.
#[cfg(not(feature = "opencv"))]
pub fn draw_overlay(_pixels: &mut FramePixels, _info: &OverlayInfo) {}

/// Draw the overlay in place: ball box, status line.
#[cfg(feature = "opencv")]
pub fn draw_overlay(pixels: &mut FramePixels, info: &OverlayInfo) {
    use opencv::core::{Mat, Mat_AUTO_STEP, Point, Rect, Scalar, CV_8UC3};
    use opencv::imgproc;

    let mut mat = match unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            pixels.height as i32,
            pixels.width as i32,
            CV_8UC3,
            pixels.data.as_mut_ptr() as *mut std::ffi::c_void,
            Mat_AUTO_STEP,
        )
    } {
        Ok(m) => m,
        Err(_) => return,
    };

    let color = match info.origin {
        StickyOrigin::Accepted => Scalar::new(0.0, 255.0, 0.0, 0.0),
        StickyOrigin::Held => Scalar::new(0.0, 255.0, 255.0, 0.0),
        _ => Scalar::new(0.0, 0.0, 255.0, 0.0),
    };

    if let Some(bbox) = info.ball {
        let rect = Rect::new(
            bbox.x as i32,
            bbox.y as i32,
            bbox.width.max(1.0) as i32,
            bbox.height.max(1.0) as i32,
        );
        let _ = imgproc::rectangle(&mut mat, rect, color, 2, imgproc::LINE_8, 0);
    }

    let status = format!(
        "{} t={} {:?} miss={} zone={}",
        info.camera_id,
        info.timeline_index,
        info.origin,
        info.miss_streak,
        info.zone.as_deref().unwrap_or("-"),
    );
    let _ = imgproc::put_text(
        &mut mat,
        &status,
        Point::new(12, 28),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        color,
        2,
        imgproc::LINE_8,
        false,
    );
}
