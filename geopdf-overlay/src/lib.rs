//! Georeferenced PDF page overlays for slippy maps.
//!
//! A world file calibrates the first page of a PDF to a planar projected
//! coordinate system. As the map viewport settles, the visible part of the
//! page is rasterized at a resolution matched to the zoom and registered
//! with the map as a four-corner image source drawn by a raster layer.

pub mod calibration;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod map;
pub mod overlay;
pub mod pipeline;
pub mod sizing;
pub mod transform;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use calibration::{Calibration, WorldFile};
pub use error::{OverlayError, OverlayResult};
pub use overlay::PdfOverlay;
pub use pipeline::{PassOutcome, PassReport};
