//! In-memory map component.
//!
//! Keeps a registry with the same consistency rules as a browser map engine
//! and records the most recent calls made against it. Used by the preview
//! binary, which has no real map to draw into, and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{
    ImageSource, MapComponent, MapImage, PaintProperty, RasterLayer, SubscriptionId,
    ViewportChange, ViewportSubscription,
};
use crate::error::MapError;
use crate::geometry::GeoBounds;

/// A call received by the headless map
#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    Bounds,
    Zoom,
    PixelRatio,
    HasImage(String),
    AddImage {
        id: String,
        width: u32,
        height: u32,
    },
    RemoveImage(String),
    HasSource(String),
    AddSource {
        id: String,
        source: ImageSource,
    },
    RemoveSource(String),
    HasLayer(String),
    LayersUsingSource(String),
    AddLayer {
        layer: RasterLayer,
        before: Option<String>,
    },
    RemoveLayer(String),
    SetPaintProperty {
        layer_id: String,
        property: PaintProperty,
    },
    MoveLayer {
        id: String,
        before: Option<String>,
    },
}

impl MapCall {
    /// Whether the call changes the registry
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MapCall::AddImage { .. }
                | MapCall::RemoveImage(_)
                | MapCall::AddSource { .. }
                | MapCall::RemoveSource(_)
                | MapCall::AddLayer { .. }
                | MapCall::RemoveLayer(_)
                | MapCall::SetPaintProperty { .. }
                | MapCall::MoveLayer { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    bounds: GeoBounds,
    zoom: f64,
    pixel_ratio: f64,
}

#[derive(Default)]
struct Registry {
    images: HashMap<String, MapImage>,
    sources: HashMap<String, ImageSource>,
    /// Bottom to top
    layers: Vec<RasterLayer>,
}

impl Registry {
    fn layer_index(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    fn insertion_index(&self, before: Option<&str>) -> Result<usize, MapError> {
        match before {
            None => Ok(self.layers.len()),
            Some(before) => self.layer_index(before).ok_or_else(|| MapError::NotFound {
                kind: "layer",
                id: before.to_string(),
            }),
        }
    }
}

/// Calls kept in the log; older ones are dropped first
pub const CALL_LOG_CAPACITY: usize = 1024;

/// Headless [`MapComponent`] implementation
pub struct HeadlessMap {
    viewport: Mutex<Viewport>,
    registry: Mutex<Registry>,
    calls: Mutex<VecDeque<MapCall>>,
    subscribers: DashMap<u64, mpsc::UnboundedSender<ViewportChange>>,
    next_subscription: AtomicU64,
}

impl HeadlessMap {
    pub fn new(bounds: GeoBounds, zoom: f64, pixel_ratio: f64) -> Self {
        Self {
            viewport: Mutex::new(Viewport {
                bounds,
                zoom,
                pixel_ratio,
            }),
            registry: Mutex::new(Registry::default()),
            calls: Mutex::new(VecDeque::with_capacity(64)),
            subscribers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Move the viewport and notify every subscriber.
    ///
    /// Returns the number of subscribers notified.
    pub fn set_viewport(&self, bounds: GeoBounds, zoom: f64) -> usize {
        {
            let mut viewport = lock(&self.viewport);
            viewport.bounds = bounds;
            viewport.zoom = zoom;
        }

        let change = ViewportChange { bounds, zoom };
        // Subscribers whose receiver is gone are dropped
        self.subscribers.retain(|_, tx| tx.send(change).is_ok());
        let notified = self.subscribers.len();
        debug!(?bounds, zoom, notified, "Viewport changed");
        notified
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn image(&self, id: &str) -> Option<MapImage> {
        lock(&self.registry).images.get(id).cloned()
    }

    pub fn source(&self, id: &str) -> Option<ImageSource> {
        lock(&self.registry).sources.get(id).cloned()
    }

    pub fn layer(&self, id: &str) -> Option<RasterLayer> {
        let registry = lock(&self.registry);
        registry
            .layer_index(id)
            .map(|idx| registry.layers[idx].clone())
    }

    /// Layer ids, bottom to top
    pub fn layer_order(&self) -> Vec<String> {
        lock(&self.registry)
            .layers
            .iter()
            .map(|l| l.id.clone())
            .collect()
    }

    /// The most recent calls, oldest first, at most [`CALL_LOG_CAPACITY`]
    pub fn calls(&self) -> Vec<MapCall> {
        lock(&self.calls).iter().cloned().collect()
    }

    /// Calls that changed the registry
    pub fn mutations(&self) -> Vec<MapCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: MapCall) {
        trace!(?call, "Map call");
        let mut calls = lock(&self.calls);
        if calls.len() == CALL_LOG_CAPACITY {
            calls.pop_front();
        }
        calls.push_back(call);
    }
}

impl MapComponent for HeadlessMap {
    fn bounds(&self) -> GeoBounds {
        self.record(MapCall::Bounds);
        lock(&self.viewport).bounds
    }

    fn zoom(&self) -> f64 {
        self.record(MapCall::Zoom);
        lock(&self.viewport).zoom
    }

    fn pixel_ratio(&self) -> f64 {
        self.record(MapCall::PixelRatio);
        lock(&self.viewport).pixel_ratio
    }

    fn subscribe_viewport(&self) -> ViewportSubscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        debug!(subscription = id, "Viewport subscription added");
        ViewportSubscription {
            id: SubscriptionId(id),
            changes: rx,
        }
    }

    fn unsubscribe_viewport(&self, id: SubscriptionId) {
        if self.subscribers.remove(&id.0).is_some() {
            debug!(subscription = id.0, "Viewport subscription removed");
        }
    }

    fn has_image(&self, id: &str) -> bool {
        self.record(MapCall::HasImage(id.to_string()));
        lock(&self.registry).images.contains_key(id)
    }

    fn add_image(&self, id: &str, image: MapImage) -> Result<(), MapError> {
        self.record(MapCall::AddImage {
            id: id.to_string(),
            width: image.pixels.width(),
            height: image.pixels.height(),
        });
        let mut registry = lock(&self.registry);
        if registry.images.contains_key(id) {
            return Err(MapError::Duplicate {
                kind: "image",
                id: id.to_string(),
            });
        }
        registry.images.insert(id.to_string(), image);
        Ok(())
    }

    fn remove_image(&self, id: &str) -> Result<(), MapError> {
        self.record(MapCall::RemoveImage(id.to_string()));
        lock(&self.registry)
            .images
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MapError::NotFound {
                kind: "image",
                id: id.to_string(),
            })
    }

    fn has_source(&self, id: &str) -> bool {
        self.record(MapCall::HasSource(id.to_string()));
        lock(&self.registry).sources.contains_key(id)
    }

    fn add_source(&self, id: &str, source: ImageSource) -> Result<(), MapError> {
        self.record(MapCall::AddSource {
            id: id.to_string(),
            source: source.clone(),
        });
        let mut registry = lock(&self.registry);
        if registry.sources.contains_key(id) {
            return Err(MapError::Duplicate {
                kind: "source",
                id: id.to_string(),
            });
        }
        if !registry.images.contains_key(&source.image_id) {
            return Err(MapError::DanglingReference {
                kind: "source",
                id: id.to_string(),
                missing: format!("image {}", source.image_id),
            });
        }
        registry.sources.insert(id.to_string(), source);
        Ok(())
    }

    fn remove_source(&self, id: &str) -> Result<(), MapError> {
        self.record(MapCall::RemoveSource(id.to_string()));
        let mut registry = lock(&self.registry);
        if let Some(layer) = registry.layers.iter().find(|l| l.source == id) {
            return Err(MapError::InUse {
                kind: "source",
                id: id.to_string(),
                user: format!("layer {}", layer.id),
            });
        }
        registry
            .sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MapError::NotFound {
                kind: "source",
                id: id.to_string(),
            })
    }

    fn has_layer(&self, id: &str) -> bool {
        self.record(MapCall::HasLayer(id.to_string()));
        lock(&self.registry).layer_index(id).is_some()
    }

    fn layers_using_source(&self, source_id: &str) -> Vec<String> {
        self.record(MapCall::LayersUsingSource(source_id.to_string()));
        lock(&self.registry)
            .layers
            .iter()
            .filter(|l| l.source == source_id)
            .map(|l| l.id.clone())
            .collect()
    }

    fn add_layer(&self, layer: RasterLayer, before: Option<&str>) -> Result<(), MapError> {
        self.record(MapCall::AddLayer {
            layer: layer.clone(),
            before: before.map(str::to_string),
        });
        let mut registry = lock(&self.registry);
        if registry.layer_index(&layer.id).is_some() {
            return Err(MapError::Duplicate {
                kind: "layer",
                id: layer.id,
            });
        }
        if !registry.sources.contains_key(&layer.source) {
            return Err(MapError::DanglingReference {
                kind: "layer",
                id: layer.id,
                missing: format!("source {}", layer.source),
            });
        }
        let idx = registry.insertion_index(before)?;
        registry.layers.insert(idx, layer);
        Ok(())
    }

    fn remove_layer(&self, id: &str) -> Result<(), MapError> {
        self.record(MapCall::RemoveLayer(id.to_string()));
        let mut registry = lock(&self.registry);
        let idx = registry.layer_index(id).ok_or_else(|| MapError::NotFound {
            kind: "layer",
            id: id.to_string(),
        })?;
        registry.layers.remove(idx);
        Ok(())
    }

    fn set_paint_property(&self, layer_id: &str, property: PaintProperty) -> Result<(), MapError> {
        self.record(MapCall::SetPaintProperty {
            layer_id: layer_id.to_string(),
            property,
        });
        let mut registry = lock(&self.registry);
        let idx = registry
            .layer_index(layer_id)
            .ok_or_else(|| MapError::NotFound {
                kind: "layer",
                id: layer_id.to_string(),
            })?;
        match property {
            PaintProperty::RasterOpacity(opacity) => registry.layers[idx].opacity = opacity,
        }
        Ok(())
    }

    fn move_layer(&self, id: &str, before: Option<&str>) -> Result<(), MapError> {
        self.record(MapCall::MoveLayer {
            id: id.to_string(),
            before: before.map(str::to_string),
        });
        let mut registry = lock(&self.registry);
        let idx = registry.layer_index(id).ok_or_else(|| MapError::NotFound {
            kind: "layer",
            id: id.to_string(),
        })?;
        // Validate the target before detaching the layer
        registry.insertion_index(before)?;
        let layer = registry.layers.remove(idx);
        let target = registry.insertion_index(before)?;
        registry.layers.insert(target, layer);
        Ok(())
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeoQuad, LngLat};
    use image::RgbaImage;
    use std::sync::Arc;

    fn map() -> HeadlessMap {
        HeadlessMap::new(GeoBounds::new(0.0, 0.0, 1.0, 1.0), 10.0, 1.0)
    }

    fn image() -> MapImage {
        MapImage {
            pixels: Arc::new(RgbaImage::new(2, 2)),
            pixel_ratio: 1.0,
        }
    }

    fn quad() -> GeoQuad {
        GeoQuad {
            top_left: LngLat::new(0.0, 1.0),
            top_right: LngLat::new(1.0, 1.0),
            bottom_right: LngLat::new(1.0, 0.0),
            bottom_left: LngLat::new(0.0, 0.0),
        }
    }

    fn layer(id: &str) -> RasterLayer {
        RasterLayer {
            id: id.to_string(),
            source: id.to_string(),
            opacity: 1.0,
        }
    }

    fn register(map: &HeadlessMap, id: &str, before: Option<&str>) {
        map.add_image(id, image()).unwrap();
        map.add_source(
            id,
            ImageSource {
                image_id: id.to_string(),
                coordinates: quad(),
            },
        )
        .unwrap();
        map.add_layer(layer(id), before).unwrap();
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let map = map();
        register(&map, "plan", None);
        assert_eq!(
            map.add_image("plan", image()),
            Err(MapError::Duplicate {
                kind: "image",
                id: "plan".to_string()
            })
        );
        assert!(matches!(
            map.add_layer(layer("plan"), None),
            Err(MapError::Duplicate { kind: "layer", .. })
        ));
    }

    #[test]
    fn test_references_enforced() {
        let map = map();
        assert!(matches!(
            map.add_source(
                "plan",
                ImageSource {
                    image_id: "plan".to_string(),
                    coordinates: quad(),
                }
            ),
            Err(MapError::DanglingReference { kind: "source", .. })
        ));

        register(&map, "plan", None);
        assert!(matches!(
            map.remove_source("plan"),
            Err(MapError::InUse { kind: "source", .. })
        ));
        map.remove_layer("plan").unwrap();
        map.remove_source("plan").unwrap();
        map.remove_image("plan").unwrap();
        assert!(matches!(
            map.remove_image("plan"),
            Err(MapError::NotFound { kind: "image", .. })
        ));
    }

    #[test]
    fn test_layer_ordering() {
        let map = map();
        register(&map, "roads", None);
        register(&map, "labels", None);
        register(&map, "plan", Some("labels"));
        assert_eq!(map.layer_order(), vec!["roads", "plan", "labels"]);

        map.move_layer("plan", Some("roads")).unwrap();
        assert_eq!(map.layer_order(), vec!["plan", "roads", "labels"]);

        map.move_layer("plan", None).unwrap();
        assert_eq!(map.layer_order(), vec!["roads", "labels", "plan"]);

        assert!(map.move_layer("plan", Some("missing")).is_err());
        assert_eq!(map.layer_order(), vec!["roads", "labels", "plan"]);
    }

    #[test]
    fn test_paint_property_updates_layer() {
        let map = map();
        register(&map, "plan", None);
        map.set_paint_property("plan", PaintProperty::RasterOpacity(0.4))
            .unwrap();
        assert_eq!(map.layer("plan").unwrap().opacity, 0.4);
    }

    #[tokio::test]
    async fn test_viewport_notifications() {
        let map = map();
        let mut subscription = map.subscribe_viewport();
        let bounds = GeoBounds::new(10.0, 10.0, 11.0, 11.0);

        assert_eq!(map.set_viewport(bounds, 12.0), 1);
        let change = subscription.changes.recv().await.unwrap();
        assert_eq!(change, ViewportChange { bounds, zoom: 12.0 });
        assert_eq!(map.bounds(), bounds);

        map.unsubscribe_viewport(subscription.id);
        assert_eq!(map.set_viewport(bounds, 13.0), 0);
        assert!(subscription.changes.recv().await.is_none());
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let map = map();
        let subscription = map.subscribe_viewport();
        drop(subscription);
        assert_eq!(map.set_viewport(GeoBounds::new(0.0, 0.0, 2.0, 2.0), 3.0), 0);
        assert_eq!(map.subscriber_count(), 0);
    }

    #[test]
    fn test_call_log() {
        let map = map();
        register(&map, "plan", None);
        assert!(map.has_layer("plan"));
        assert_eq!(map.mutations().len(), 3);
        assert_eq!(map.calls().len(), 4);
        map.clear_calls();
        assert!(map.calls().is_empty());
    }

    #[test]
    fn test_call_log_keeps_most_recent_calls() {
        let map = map();
        for _ in 0..CALL_LOG_CAPACITY + 10 {
            map.zoom();
        }
        map.has_image("plan");

        let calls = map.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert_eq!(calls.last(), Some(&MapCall::HasImage("plan".to_string())));
        assert_eq!(calls[0], MapCall::Zoom);
    }

    #[test]
    fn test_layers_using_source() {
        let map = map();
        register(&map, "plan", None);
        map.add_layer(
            RasterLayer {
                id: "copy".to_string(),
                source: "plan".to_string(),
                opacity: 0.5,
            },
            None,
        )
        .unwrap();

        assert_eq!(map.layers_using_source("plan"), vec!["plan", "copy"]);
        assert!(map.layers_using_source("roads").is_empty());

        let query = MapCall::LayersUsingSource("plan".to_string());
        assert!(map.calls().contains(&query));
        assert!(!map.mutations().contains(&query));
    }
}
