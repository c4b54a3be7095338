//! Interface to the interactive map component.
//!
//! The map owns the viewport and the registry of images, sources and layers.
//! The overlay issues create/replace/delete requests against that registry
//! and listens for viewport changes through a subscription.

mod headless;

pub use headless::{CALL_LOG_CAPACITY, HeadlessMap, MapCall};

use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::mpsc;

use crate::error::MapError;
use crate::geometry::{GeoBounds, GeoQuad};

/// Bitmap registered with the map's image registry
#[derive(Debug, Clone)]
pub struct MapImage {
    pub pixels: Arc<RgbaImage>,
    pub pixel_ratio: f64,
}

/// Image source: a registered image pinned to four geographic corners
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    pub image_id: String,
    pub coordinates: GeoQuad,
}

/// Raster layer drawing an image source
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub id: String,
    pub source: String,
    pub opacity: f64,
}

/// Layer paint properties the overlay updates live
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaintProperty {
    RasterOpacity(f64),
}

/// A viewport-change notification, delivered after the viewport settles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportChange {
    pub bounds: GeoBounds,
    pub zoom: f64,
}

/// Identifier of a viewport subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receiving end of a viewport subscription
#[derive(Debug)]
pub struct ViewportSubscription {
    pub id: SubscriptionId,
    pub changes: mpsc::UnboundedReceiver<ViewportChange>,
}

/// Operations the overlay consumes from a map component.
///
/// Registry calls follow the usual map-engine rules: adding an id that
/// already exists and removing one that does not are errors, a source must
/// reference an existing image and a layer an existing source.
pub trait MapComponent: Send + Sync + 'static {
    /// Currently visible extent
    fn bounds(&self) -> GeoBounds;

    fn zoom(&self) -> f64;

    /// Device pixel ratio of the display the map renders to
    fn pixel_ratio(&self) -> f64;

    fn subscribe_viewport(&self) -> ViewportSubscription;

    fn unsubscribe_viewport(&self, id: SubscriptionId);

    fn has_image(&self, id: &str) -> bool;

    fn add_image(&self, id: &str, image: MapImage) -> Result<(), MapError>;

    fn remove_image(&self, id: &str) -> Result<(), MapError>;

    fn has_source(&self, id: &str) -> bool;

    fn add_source(&self, id: &str, source: ImageSource) -> Result<(), MapError>;

    fn remove_source(&self, id: &str) -> Result<(), MapError>;

    fn has_layer(&self, id: &str) -> bool;

    /// Ids of the layers drawing from `source_id`
    fn layers_using_source(&self, source_id: &str) -> Vec<String>;

    /// Add a layer, drawn below `before` when given
    fn add_layer(&self, layer: RasterLayer, before: Option<&str>) -> Result<(), MapError>;

    fn remove_layer(&self, id: &str) -> Result<(), MapError>;

    fn set_paint_property(&self, layer_id: &str, property: PaintProperty) -> Result<(), MapError>;

    /// Move a layer so it is drawn below `before` (or on top when `None`)
    fn move_layer(&self, id: &str, before: Option<&str>) -> Result<(), MapError>;
}
