//! Page region rendering using pdfium-render.
//!
//! Pdfium renders the clipped page region straight into a bitmap of the
//! output size, with the page → pixel transform applied as the render
//! matrix. Only the visible region is ever rasterized.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use pdfium_render::prelude::*;
use tracing::{debug, trace};

use super::{PagedDocument, RenderTransform};
use crate::error::{OverlayError, OverlayResult};
use crate::fetch::ResourceFetcher;
use crate::geometry::{PageSize, RasterSize};

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. `library_dir`, when given
/// 2. Current directory (./libpdfium.so)
/// 3. System library paths
pub fn create_pdfium(library_dir: Option<&Path>) -> OverlayResult<Pdfium> {
    for dir in library_search_dirs(library_dir) {
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)) {
            Ok(bindings) => {
                debug!(dir = %dir.display(), "Bound PDFium library");
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => trace!(dir = %dir.display(), error = ?e, "PDFium not found"),
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| document_error(format!("Failed to load PDFium library: {:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn library_search_dirs(library_dir: Option<&Path>) -> Vec<PathBuf> {
    let current = PathBuf::from("./");
    match library_dir {
        Some(dir) if dir != current.as_path() => vec![dir.to_path_buf(), current],
        _ => vec![current],
    }
}

/// First page of a PDF document held in memory.
pub struct PdfiumDocument {
    pdfium: Arc<Pdfium>,
    bytes: Arc<Vec<u8>>,
    page_size: PageSize,
}

impl PdfiumDocument {
    /// Load a PDF from a URL or path.
    pub async fn open(
        pdfium: Arc<Pdfium>,
        fetcher: &ResourceFetcher,
        location: &str,
    ) -> OverlayResult<Self> {
        let bytes = fetcher.fetch_bytes(location).await?;
        Self::from_bytes(pdfium, bytes)
    }

    /// Wrap PDF bytes, reading the first page's size.
    pub fn from_bytes(pdfium: Arc<Pdfium>, bytes: Vec<u8>) -> OverlayResult<Self> {
        let page_size = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| document_error(format!("Failed to load PDF: {}", e)))?;
            let page = document
                .pages()
                .get(0)
                .map_err(|e| document_error(format!("Failed to get first page: {}", e)))?;

            PageSize {
                width: page.width().value as f64,
                height: page.height().value as f64,
            }
        };

        debug!(
            bytes = bytes.len(),
            page_size = format!("{:.1}x{:.1}", page_size.width, page_size.height),
            "Opened PDF document"
        );

        Ok(Self {
            pdfium,
            bytes: Arc::new(bytes),
            page_size,
        })
    }
}

impl PagedDocument for PdfiumDocument {
    fn page_size(&self) -> PageSize {
        self.page_size
    }

    async fn render_region(
        &self,
        transform: RenderTransform,
        size: RasterSize,
    ) -> OverlayResult<RgbaImage> {
        let pdfium = self.pdfium.clone();
        let bytes = self.bytes.clone();

        tokio::task::spawn_blocking(move || {
            render_region_blocking(&pdfium, &bytes, transform, size)
        })
        .await
        .map_err(|e| OverlayError::Rasterization {
            source: Box::new(e),
        })?
    }
}

fn render_region_blocking(
    pdfium: &Pdfium,
    bytes: &[u8],
    transform: RenderTransform,
    size: RasterSize,
) -> OverlayResult<RgbaImage> {
    let config = region_render_config(transform, size)?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| rasterization_error(format!("Failed to load PDF for region render: {}", e)))?;
    let page = document
        .pages()
        .get(0)
        .map_err(|e| rasterization_error(format!("Failed to get page for region render: {}", e)))?;

    debug!(
        transform = ?transform.to_matrix(),
        output_size = format!("{}x{}", size.width, size.height),
        "Rendering page region"
    );

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| rasterization_error(format!("Failed to render page region: {}", e)))?;

    Ok(bitmap.as_image().to_rgba8())
}

/// Render settings drawing the page through `transform` into a transparent
/// bitmap of exactly `size` pixels.
fn region_render_config(
    transform: RenderTransform,
    size: RasterSize,
) -> OverlayResult<PdfRenderConfig> {
    let width = pixel_dimension(size.width)?;
    let height = pixel_dimension(size.height)?;

    PdfRenderConfig::new()
        .set_fixed_size(width, height)
        .set_clear_color(PdfColor::new(0, 0, 0, 0))
        .transform(
            transform.scale_x as f32,
            0.0,
            0.0,
            transform.scale_y as f32,
            transform.translate_x as f32,
            transform.translate_y as f32,
        )
        .map_err(|e| rasterization_error(format!("Invalid region transform: {}", e)))
}

fn pixel_dimension(pixels: u32) -> OverlayResult<Pixels> {
    match Pixels::try_from(pixels) {
        Ok(pixels) if pixels > 0 => Ok(pixels),
        _ => Err(rasterization_error(format!(
            "Output dimension out of range: {}",
            pixels
        ))),
    }
}

fn document_error(message: String) -> OverlayError {
    OverlayError::DocumentLoad {
        source: Box::new(std::io::Error::other(message)),
    }
}

fn rasterization_error(message: String) -> OverlayError {
    OverlayError::Rasterization {
        source: Box::new(std::io::Error::other(message)),
    }
}
