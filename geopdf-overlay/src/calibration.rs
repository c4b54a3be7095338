//! World-file calibration.
//!
//! A world file describes the pixel grid of the raster it was written for.
//! The overlay renders the PDF page instead, so the transform has to be
//! re-expressed in page points. This happens in two pure steps:
//! - `rescale`: per-axis scale from world-file units to page points
//! - `correct`: a single ratio fixing any remaining width mismatch between
//!   the declared raster and the page

mod affine;
mod world_file;

pub use affine::{AffineTransform, InverseAffine};
pub use world_file::WorldFile;

use tracing::debug;

use crate::error::CalibrationError;
use crate::geometry::{PagePoint, PageSize, PlanarPoint, RasterDimensions};

/// Corrected page ↔ planar transform plus the inputs it was derived from.
#[derive(Debug, Clone)]
pub struct Calibration {
    transform: AffineTransform,
    inverse: InverseAffine,
    source: RasterDimensions,
    page: PageSize,
}

impl Calibration {
    /// Build the calibration for a page from a parsed world file.
    pub fn new(
        world_file: &WorldFile,
        source: RasterDimensions,
        page: PageSize,
    ) -> Result<Self, CalibrationError> {
        if source.width == 0 || source.height == 0 {
            return Err(CalibrationError::EmptyRaster {
                width: source.width,
                height: source.height,
            });
        }
        if !(page.width > 0.0 && page.height > 0.0) {
            return Err(CalibrationError::EmptyPage {
                width: page.width,
                height: page.height,
            });
        }

        let raw = world_file.to_affine();
        let transform = correct(&raw, &rescale(&raw, source, page), source, page);

        let determinant = transform.determinant();
        let inverse = transform
            .inverse()
            .filter(|_| transform.is_finite())
            .ok_or(CalibrationError::Degenerate { determinant })?;

        debug!(
            a = transform.a,
            b = transform.b,
            d = transform.d,
            e = transform.e,
            c = transform.c,
            f = transform.f,
            page = format!("{:.1}x{:.1}", page.width, page.height),
            source = format!("{}x{}", source.width, source.height),
            "Calibrated world file to page points"
        );

        Ok(Self {
            transform,
            inverse,
            source,
            page,
        })
    }

    /// Parse world-file text and build the calibration in one step.
    pub fn from_world_file_text(
        text: &str,
        source: RasterDimensions,
        page: PageSize,
    ) -> Result<Self, CalibrationError> {
        Self::new(&WorldFile::parse(text)?, source, page)
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    pub fn source(&self) -> RasterDimensions {
        self.source
    }

    pub fn page(&self) -> PageSize {
        self.page
    }

    /// Page space → planar projected.
    pub fn page_to_planar(&self, p: PagePoint) -> PlanarPoint {
        self.transform.apply(p)
    }

    /// Planar projected → page space.
    pub fn planar_to_page(&self, p: PlanarPoint) -> PagePoint {
        self.inverse.apply(p)
    }
}

/// Rescale world-file rotation/scale coefficients into page-point units.
///
/// The origin (`C`, `F`) is expressed in the planar system and is left as is.
fn rescale(raw: &AffineTransform, source: RasterDimensions, page: PageSize) -> AffineTransform {
    let width_units = raw.a * f64::from(source.width);
    let height_units = (raw.e * f64::from(source.height)).abs();
    let scale_x = page.width / width_units;
    let scale_y = page.height / height_units;

    AffineTransform {
        a: raw.a * scale_x,
        b: raw.b * scale_x,
        d: raw.d * scale_y,
        e: raw.e * scale_y,
        ..*raw
    }
}

/// Scale the rescaled transform so the page width spans the same planar
/// distance as the declared raster width.
fn correct(
    raw: &AffineTransform,
    rescaled: &AffineTransform,
    source: RasterDimensions,
    page: PageSize,
) -> AffineTransform {
    let declared_width = raw.a * f64::from(source.width);
    let implied_width = rescaled.a * page.width;
    rescaled.scale_linear(declared_width / implied_width)
}
