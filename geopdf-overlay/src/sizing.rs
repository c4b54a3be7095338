//! Output raster sizing matched to the current map zoom.

use tracing::{trace, warn};

use crate::calibration::Calibration;
use crate::config::RenderConfig;
use crate::geometry::{PageRect, RasterSize};

/// Equatorial circumference of the Web Mercator sphere (meters)
pub const EARTH_CIRCUMFERENCE: f64 = 40075016.68557849;

/// Ground resolution of one screen pixel at `zoom`.
pub fn meters_per_pixel(zoom: f64, tile_size: u32) -> f64 {
    EARTH_CIRCUMFERENCE / 2f64.powf(zoom) / f64::from(tile_size)
}

/// Multiplier compensating for sampling loss along sheared axes.
pub fn distortion_factor(calibration: &Calibration) -> f64 {
    let (scale_x, scale_y) = calibration.transform().axis_scales();
    1.0 + scale_x.max(scale_y)
}

/// Device-pixel size for rasterizing `region` at the current zoom.
///
/// Each dimension is clamped to `[1, max_texture_size]`. Oversized requests
/// degrade resolution rather than fail.
pub fn output_size(
    region: &PageRect,
    calibration: &Calibration,
    zoom: f64,
    pixel_ratio: f64,
    render: &RenderConfig,
) -> RasterSize {
    let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
        pixel_ratio
    } else {
        warn!(pixel_ratio, "Invalid device pixel ratio, using 1.0");
        1.0
    };

    let mpp = meters_per_pixel(zoom, render.tile_size);
    let (span_x, span_y) = calibration
        .transform()
        .apply_linear(region.width, region.height);
    let distortion = distortion_factor(calibration);

    let width_px = (span_x / mpp).abs() * pixel_ratio * distortion;
    let height_px = (span_y / mpp).abs() * pixel_ratio * distortion;

    let size = RasterSize {
        width: clamp_dimension(width_px, render.max_texture_size),
        height: clamp_dimension(height_px, render.max_texture_size),
    };

    trace!(
        zoom,
        meters_per_pixel = mpp,
        distortion,
        requested = format!("{:.1}x{:.1}", width_px, height_px),
        output = format!("{}x{}", size.width, size.height),
        "Sized output raster"
    );

    size
}

fn clamp_dimension(pixels: f64, max: u32) -> u32 {
    let max = max.max(1);
    if !pixels.is_finite() {
        // Overflowing spans degrade to the maximum, NaN to the minimum
        return if pixels == f64::INFINITY { max } else { 1 };
    }
    // Saturating float-to-int cast, then clamp
    (pixels.ceil() as u32).clamp(1, max)
}
