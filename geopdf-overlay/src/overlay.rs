//! Overlay lifecycle: attach to a map, follow its viewport and keep the
//! registered page image in step with it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use metrics::{counter, histogram};
use pdfium_render::prelude::Pdfium;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::calibration::Calibration;
use crate::config::{AppConfig, OverlayConfig, RenderConfig};
use crate::document::{PagedDocument, PdfiumDocument};
use crate::error::{OverlayError, OverlayResult};
use crate::fetch::ResourceFetcher;
use crate::map::{MapComponent, PaintProperty, SubscriptionId, ViewportChange};
use crate::pipeline::{PassOutcome, PassPlan, PassReport, RenderPipeline};
use crate::transform::{GeoProjection, Proj4Projection};

/// Reports held for a consumer before new ones are dropped
const REPORT_QUEUE_CAPACITY: usize = 64;

/// Lifecycle flags shared by the render pipeline and the control operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayState {
    pub visible: bool,
    pub removed: bool,
    pub opacity: f64,
}

impl OverlayState {
    /// Whether a pass may draw into the map
    pub fn is_drawable(&self) -> bool {
        self.visible && !self.removed
    }
}

struct ActiveSubscription {
    id: SubscriptionId,
    cancel: CancellationToken,
}

struct OverlayInner<M: MapComponent, D: PagedDocument> {
    pipeline: RenderPipeline<M, D>,
    // Also serializes every registry mutation the overlay makes
    state: Mutex<OverlayState>,
    subscription: Mutex<Option<ActiveSubscription>>,
    reports: mpsc::Sender<PassReport>,
    pending_reports: Mutex<Option<mpsc::Receiver<PassReport>>>,
}

/// A georeferenced PDF page drawn on a map.
///
/// Every settled viewport change triggers a render pass that rasterizes the
/// visible part of the page at a resolution matched to the zoom and
/// registers it as an image source with a raster layer, all sharing the
/// overlay's image id.
pub struct PdfOverlay<M: MapComponent, D: PagedDocument> {
    inner: Arc<OverlayInner<M, D>>,
}

impl<M: MapComponent, D: PagedDocument> PdfOverlay<M, D> {
    /// Subscribe to the map's viewport and run the first pass.
    ///
    /// The first pass's result is the first entry on [`Self::pass_reports`].
    pub async fn attach(
        map: Arc<M>,
        document: Arc<D>,
        calibration: Calibration,
        projection: Arc<dyn GeoProjection>,
        config: &OverlayConfig,
        render: RenderConfig,
    ) -> Self {
        let (reports, pending) = mpsc::channel(REPORT_QUEUE_CAPACITY);
        let inner = Arc::new(OverlayInner {
            pipeline: RenderPipeline::new(
                map,
                document,
                calibration,
                projection,
                config.image_id.clone(),
                config.insert_before_layer_id.clone(),
                render,
            ),
            state: Mutex::new(OverlayState {
                visible: false,
                removed: false,
                opacity: clamp_opacity(config.opacity),
            }),
            subscription: Mutex::new(None),
            reports,
            pending_reports: Mutex::new(Some(pending)),
        });

        inner.subscribe();
        info!(overlay = %config.image_id, "Attached PDF overlay");

        let report = inner.enable().await;
        inner.publish(report);

        Self { inner }
    }

    /// Calibrate against the document's first page, then attach.
    pub async fn from_world_file(
        map: Arc<M>,
        document: Arc<D>,
        world_file: &str,
        projection: Arc<dyn GeoProjection>,
        config: &OverlayConfig,
        render: RenderConfig,
    ) -> OverlayResult<Self> {
        let calibration = Calibration::from_world_file_text(
            world_file,
            config.source_dimensions(),
            document.page_size(),
        )?;
        Ok(Self::attach(map, document, calibration, projection, config, render).await)
    }

    /// Show the overlay and run a pass immediately.
    ///
    /// After [`Self::remove`] this also resubscribes to viewport changes.
    pub async fn enable(&self) -> OverlayResult<PassOutcome> {
        self.inner.enable().await.result
    }

    /// Hide the overlay. The layer and source are removed; the image stays
    /// registered until the next pass or [`Self::remove`].
    pub fn disable(&self) -> OverlayResult<()> {
        let map = self.inner.pipeline.map.as_ref();
        let id = self.inner.pipeline.image_id();

        let mut state = self.inner.lock_state();
        state.visible = false;

        if map.has_layer(id) {
            map.remove_layer(id)?;
        }
        if map.has_source(id) {
            map.remove_source(id)?;
        }
        debug!(overlay = %id, "Disabled overlay");
        Ok(())
    }

    /// Detach from the map: drop the viewport subscription and everything
    /// registered under the overlay's id.
    pub fn remove(&self) -> OverlayResult<()> {
        let map = self.inner.pipeline.map.as_ref();
        let id = self.inner.pipeline.image_id();

        self.inner.unsubscribe();

        let mut state = self.inner.lock_state();
        state.visible = false;
        state.removed = true;

        if map.has_image(id) {
            map.remove_image(id)?;
        }
        if map.has_layer(id) {
            map.remove_layer(id)?;
        }
        if map.has_source(id) {
            map.remove_source(id)?;
        }
        info!(overlay = %id, "Removed overlay");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock_state().visible
    }

    /// Set layer opacity, clamped to `[0, 1]`. Applied live when the layer
    /// exists and remembered for future passes either way.
    pub fn set_opacity(&self, opacity: f64) -> OverlayResult<()> {
        let map = self.inner.pipeline.map.as_ref();
        let id = self.inner.pipeline.image_id();

        let clamped = clamp_opacity(opacity);
        let mut state = self.inner.lock_state();
        state.opacity = clamped;

        if map.has_layer(id) {
            map.set_paint_property(id, PaintProperty::RasterOpacity(clamped))?;
        }
        Ok(())
    }

    /// Draw the overlay directly below `layer_id`. No-op unless both layers
    /// exist.
    pub fn move_below(&self, layer_id: &str) -> OverlayResult<()> {
        let map = self.inner.pipeline.map.as_ref();
        let id = self.inner.pipeline.image_id();

        let _state = self.inner.lock_state();
        if map.has_layer(id) && map.has_layer(layer_id) {
            map.move_layer(id, Some(layer_id))?;
        } else {
            debug!(overlay = %id, target = %layer_id, "Layer missing, not moving overlay");
        }
        Ok(())
    }

    pub fn opacity(&self) -> f64 {
        self.inner.lock_state().opacity
    }

    pub fn image_id(&self) -> &str {
        self.inner.pipeline.image_id()
    }

    pub fn calibration(&self) -> &Calibration {
        self.inner.pipeline.calibration()
    }

    /// Results of passes triggered by attach and by viewport changes.
    ///
    /// Returns `None` after the first call. Reports are dropped while the
    /// queue is full.
    pub fn pass_reports(&self) -> Option<mpsc::Receiver<PassReport>> {
        lock(&self.inner.pending_reports).take()
    }
}

impl<M: MapComponent> PdfOverlay<M, PdfiumDocument> {
    /// Fetch the document and world file named in `config` and attach.
    pub async fn load(map: Arc<M>, pdfium: Arc<Pdfium>, config: &AppConfig) -> OverlayResult<Self> {
        let fetcher = ResourceFetcher::new(&config.fetch)?;
        let overlay = &config.overlay;

        let (document, world_file) = tokio::try_join!(
            PdfiumDocument::open(pdfium, &fetcher, &overlay.document_url),
            async {
                fetcher
                    .fetch_text(&overlay.calibration_url)
                    .await
                    .map_err(OverlayError::from)
            },
        )?;

        let projection = Arc::new(Proj4Projection::web_mercator()?);
        Self::from_world_file(
            map,
            Arc::new(document),
            &world_file,
            projection,
            overlay,
            config.render.clone(),
        )
        .await
    }
}

impl<M: MapComponent, D: PagedDocument> OverlayInner<M, D> {
    fn lock_state(&self) -> MutexGuard<'_, OverlayState> {
        lock(&self.state)
    }

    fn subscribe(self: &Arc<Self>) {
        let subscription = self.pipeline.map.subscribe_viewport();
        let cancel = CancellationToken::new();

        tokio::spawn(listen(
            Arc::downgrade(self),
            subscription.changes,
            cancel.clone(),
        ));

        let previous = lock(&self.subscription).replace(ActiveSubscription {
            id: subscription.id,
            cancel,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            self.pipeline.map.unsubscribe_viewport(previous.id);
        }
    }

    fn unsubscribe(&self) {
        let active = lock(&self.subscription).take();
        if let Some(active) = active {
            active.cancel.cancel();
            self.pipeline.map.unsubscribe_viewport(active.id);
            debug!(overlay = %self.pipeline.image_id(), "Viewport subscription dropped");
        }
    }

    async fn enable(self: &Arc<Self>) -> PassReport {
        let resubscribe = {
            let mut state = self.lock_state();
            state.visible = true;
            std::mem::replace(&mut state.removed, false)
        };
        if resubscribe {
            self.subscribe();
            info!(overlay = %self.pipeline.image_id(), "Re-attached overlay");
        }
        self.run_pass().await
    }

    async fn run_pass(&self) -> PassReport {
        let state = *self.lock_state();
        let (sequence, plan) = self.pipeline.plan(&state);

        let result = match plan {
            PassPlan::Skip(outcome) => Ok(outcome),
            PassPlan::Render(planned) => {
                counter!("geopdf_overlay_rasterizations_total").increment(1);
                histogram!("geopdf_overlay_raster_pixels")
                    .record(f64::from(planned.size.width) * f64::from(planned.size.height));

                self.pipeline
                    .rasterize(planned)
                    .await
                    .and_then(|rendered| {
                        let state = self.lock_state();
                        self.pipeline.register(&state, rendered)
                    })
            }
        };

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.error_code(),
        };
        counter!("geopdf_overlay_passes_total", "outcome" => label).increment(1);

        PassReport { sequence, result }
    }

    fn publish(&self, report: PassReport) {
        if let Err(e) = &report.result {
            warn!(
                overlay = %self.pipeline.image_id(),
                sequence = report.sequence,
                error = %e,
                "Render pass failed"
            );
        }
        if let Err(e) = self.reports.try_send(report) {
            trace!(overlay = %self.pipeline.image_id(), error = %e, "Pass report not queued");
        }
    }
}

impl<M: MapComponent, D: PagedDocument> Drop for OverlayInner<M, D> {
    fn drop(&mut self) {
        let active = self
            .subscription
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(active) = active {
            active.cancel.cancel();
            self.pipeline.map.unsubscribe_viewport(active.id);
        }
    }
}

/// Run a pass for each viewport change until cancelled or the overlay is
/// dropped.
async fn listen<M: MapComponent, D: PagedDocument>(
    overlay: Weak<OverlayInner<M, D>>,
    mut changes: mpsc::UnboundedReceiver<ViewportChange>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = changes.recv() => {
                let Some(change) = change else { break };
                let Some(overlay) = overlay.upgrade() else { break };

                trace!(bounds = ?change.bounds, zoom = change.zoom, "Viewport settled");
                tokio::spawn(async move {
                    let report = overlay.run_pass().await;
                    overlay.publish(report);
                });
            }
        }
    }
}

fn clamp_opacity(opacity: f64) -> f64 {
    if opacity.is_nan() {
        warn!("Opacity is NaN, using 1.0");
        return 1.0;
    }
    let clamped = opacity.clamp(0.0, 1.0);
    if clamped != opacity {
        warn!(opacity, clamped, "Opacity out of range, clamping");
    }
    clamped
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
