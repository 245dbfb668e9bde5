//! Screenshot capture via the xcap crate.
//!
//! Region captures pick the monitor under the region's top-left corner and
//! crop the monitor image. Window bounds arrive in points while xcap returns
//! physical pixels, so offsets are scaled by the monitor's scale factor.

use super::{DeviceError, ImageSource, Region};
use image::{DynamicImage, GenericImageView};
use tracing::debug;
use xcap::Monitor;

/// [`ImageSource`] backed by the system display.
#[derive(Debug, Default)]
pub struct ScreenSource;

impl ScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSource for ScreenSource {
    fn capture(&mut self, region: Option<Region>) -> Result<DynamicImage, DeviceError> {
        let err = |e: xcap::XCapError| DeviceError::Capture(e.to_string());

        let monitor = match region {
            Some(r) => Monitor::from_point(r.x, r.y).map_err(err)?,
            None => primary_monitor()?,
        };

        let shot = DynamicImage::ImageRgba8(monitor.capture_image().map_err(err)?);
        if is_empty(shot.dimensions()) {
            return Err(DeviceError::Capture(
                "captured an empty image; check screen recording permission".into(),
            ));
        }

        let Some(r) = region else {
            return Ok(shot);
        };

        let scale = f64::from(monitor.scale_factor().map_err(err)?);
        let origin_x = monitor.x().map_err(err)?;
        let origin_y = monitor.y().map_err(err)?;
        let crop = scaled_crop(r, origin_x, origin_y, scale, shot.dimensions());
        debug!("Cropping {:?} out of {:?}", crop, shot.dimensions());
        let (x, y, w, h) = crop;
        Ok(shot.crop_imm(x, y, w, h))
    }
}

fn primary_monitor() -> Result<Monitor, DeviceError> {
    let monitors = Monitor::all().map_err(|e| DeviceError::Capture(e.to_string()))?;
    let primary = monitors
        .iter()
        .position(|m| m.is_primary().unwrap_or(false))
        .unwrap_or(0);
    monitors
        .into_iter()
        .nth(primary)
        .ok_or_else(|| DeviceError::Capture("no monitors detected".into()))
}

fn is_empty((w, h): (u32, u32)) -> bool {
    w == 0 || h == 0
}

/// Convert a region in points to a pixel crop clamped to the captured image.
fn scaled_crop(
    region: Region,
    origin_x: i32,
    origin_y: i32,
    scale: f64,
    (img_w, img_h): (u32, u32),
) -> (u32, u32, u32, u32) {
    let px = |v: f64| (v * scale).round().max(0.0) as u32;
    let x = px(f64::from(region.x - origin_x)).min(img_w.saturating_sub(1));
    let y = px(f64::from(region.y - origin_y)).min(img_h.saturating_sub(1));
    let w = px(f64::from(region.width)).clamp(1, img_w.saturating_sub(x).max(1));
    let h = px(f64::from(region.height)).clamp(1, img_h.saturating_sub(y).max(1));
    (x, y, w, h)
}
