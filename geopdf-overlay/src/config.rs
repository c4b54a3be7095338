//! Overlay configuration.
//!
//! Values are layered from an optional `geopdf-overlay.{toml,yaml,json}`
//! file and `GEOPDF__`-prefixed environment variables.

mod loader;

pub use loader::{load_app_config, load_app_config_from};

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::geometry::{GeoBounds, RasterDimensions};

/// Top-level configuration as read by the preview binary
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub preview: Option<PreviewConfig>,
}

/// Per-overlay construction options
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Identifier shared by the overlay's image, source and layer
    #[serde(default = "default_image_id")]
    pub image_id: String,

    /// PDF document location (http(s) URL, file:// URL or path)
    pub document_url: String,

    /// World-file location (http(s) URL, file:// URL or path)
    pub calibration_url: String,

    /// Pixel width of the raster the world file was written for
    pub source_image_width: u32,

    /// Pixel height of the raster the world file was written for
    pub source_image_height: u32,

    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Layer to insert the overlay below, if any
    #[serde(default)]
    pub insert_before_layer_id: Option<String>,
}

impl OverlayConfig {
    pub fn source_dimensions(&self) -> RasterDimensions {
        RasterDimensions {
            width: self.source_image_width,
            height: self.source_image_height,
        }
    }
}

/// Render pass tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Largest output bitmap dimension in device pixels
    #[serde(default = "default_max_texture_size")]
    pub max_texture_size: u32,

    /// Tile size the map's zoom levels are defined against
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Drop render passes that finish after a newer pass has started
    #[serde(default = "default_discard_stale_passes")]
    pub discard_stale_passes: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_texture_size: default_max_texture_size(),
            tile_size: default_tile_size(),
            discard_stale_passes: default_discard_stale_passes(),
        }
    }
}

/// Resource loading configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Settings for the one-shot preview binary
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub zoom: f64,

    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Directory containing libpdfium; system paths are searched otherwise
    #[serde(default)]
    pub pdfium_library_path: Option<PathBuf>,
}

impl PreviewConfig {
    pub fn bounds(&self) -> GeoBounds {
        GeoBounds::new(self.west, self.south, self.east, self.north)
    }
}

// ==================== Default Value Functions ====================

fn default_image_id() -> String {
    "pdf-overlay".to_string()
}

fn default_opacity() -> f64 {
    1.0
}

fn default_max_texture_size() -> u32 {
    4096
}

fn default_tile_size() -> u32 {
    512
}

fn default_discard_stale_passes() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("geopdf-overlay/{}", env!("CARGO_PKG_VERSION"))
}

fn default_pixel_ratio() -> f64 {
    1.0
}

fn default_output() -> PathBuf {
    PathBuf::from("overlay.png")
}
