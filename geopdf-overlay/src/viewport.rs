//! Projection of the visible map extent onto the page.

use tracing::trace;

use crate::calibration::Calibration;
use crate::geometry::{GeoBounds, PagePoint, PageRect, PageSize};
use crate::transform::lng_lat_to_page;

/// Page-space bounding box of the visible map extent.
///
/// The calibration may rotate or shear, so the image of the viewport is a
/// general quadrilateral. All four corners are projected and enclosed.
pub fn project_viewport(bounds: &GeoBounds, calibration: &Calibration) -> PageRect {
    let corners: [PagePoint; 4] = bounds
        .corners()
        .map(|corner| lng_lat_to_page(corner, calibration));

    let min_x = corners.iter().map(|c| c.x).fold(f64::MAX, f64::min);
    let max_x = corners.iter().map(|c| c.x).fold(f64::MIN, f64::max);
    let min_y = corners.iter().map(|c| c.y).fold(f64::MAX, f64::min);
    let max_y = corners.iter().map(|c| c.y).fold(f64::MIN, f64::max);

    trace!(
        bounds = ?bounds,
        page_bbox = format!("({:.1},{:.1})-({:.1},{:.1})", min_x, min_y, max_x, max_y),
        "Projected viewport to page space"
    );

    PageRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

/// Clip a page-space rectangle to `[0, width] × [0, height]`.
///
/// Returns `None` when there is no overlap with positive area. A rectangle
/// that only touches the page edge is not a zero-width region, it is no
/// region at all.
pub fn clip_to_page(rect: &PageRect, page: PageSize) -> Option<PageRect> {
    let x1 = rect.x.max(0.0);
    let y1 = rect.y.max(0.0);
    let x2 = rect.right().min(page.width);
    let y2 = rect.bottom().min(page.height);

    // Negated comparisons also reject NaN extents
    if !(x2 > x1 && y2 > y1) {
        return None;
    }

    Some(PageRect {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Project the viewport and clip it to the calibrated page.
pub fn visible_page_region(bounds: &GeoBounds, calibration: &Calibration) -> Option<PageRect> {
    clip_to_page(&project_viewport(bounds, calibration), calibration.page())
}
