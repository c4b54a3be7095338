//! Paged-document rendering.
//!
//! The overlay only needs two things from a document: the physical size of
//! its first page and the ability to rasterize a page region through an
//! affine page → pixel transform.

mod pdfium;

pub use pdfium::{PdfiumDocument, create_pdfium};

use std::future::Future;

use image::RgbaImage;

use crate::error::OverlayResult;
use crate::geometry::{PageRect, PageSize, RasterSize};

/// Page → output-pixel transform that maps a clipped page region exactly
/// onto the output raster's pixel grid.
///
/// As a PDF matrix this is `[scale_x, 0, 0, scale_y, translate_x, translate_y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl RenderTransform {
    pub fn for_region(region: &PageRect, size: RasterSize) -> Self {
        let scale_x = f64::from(size.width) / region.width;
        let scale_y = f64::from(size.height) / region.height;
        Self {
            scale_x,
            scale_y,
            translate_x: -region.x * scale_x,
            translate_y: -region.y * scale_y,
        }
    }

    pub fn to_matrix(&self) -> [f64; 6] {
        [
            self.scale_x,
            0.0,
            0.0,
            self.scale_y,
            self.translate_x,
            self.translate_y,
        ]
    }
}

/// A paged document that can rasterize regions of its first page.
pub trait PagedDocument: Send + Sync + 'static {
    /// Size of the first page in points
    fn page_size(&self) -> PageSize;

    /// Render the page through `transform` into a transparent `size` raster.
    fn render_region(
        &self,
        transform: RenderTransform,
        size: RasterSize,
    ) -> impl Future<Output = OverlayResult<RgbaImage>> + Send;
}
