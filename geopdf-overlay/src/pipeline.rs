//! Render-and-register pipeline.
//!
//! A pass moves through three phases:
//! - `plan`: project the viewport, clip it to the page and size the raster
//! - `rasterize`: render the clipped region and compute its geographic quad
//! - `register`: replace the map's image, source and layer
//!
//! Only `register` touches the map registry, so a failure in the first two
//! phases leaves the previous registration exactly as it was.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use tracing::{debug, trace, warn};

use crate::calibration::Calibration;
use crate::config::RenderConfig;
use crate::document::{PagedDocument, RenderTransform};
use crate::error::{MapError, OverlayResult};
use crate::geometry::{GeoQuad, PageRect, RasterSize};
use crate::map::{ImageSource, MapComponent, MapImage, RasterLayer};
use crate::overlay::OverlayState;
use crate::sizing::output_size;
use crate::transform::{GeoProjection, page_rect_to_quad};
use crate::viewport::{clip_to_page, project_viewport};

/// How a render pass ended
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// The overlay was disabled or removed
    Disabled,
    /// The viewport does not intersect the page
    NothingVisible,
    /// A newer pass started while this one was rasterizing
    Superseded,
    Registered(Registration),
}

impl PassOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Disabled => "disabled",
            PassOutcome::NothingVisible => "nothing_visible",
            PassOutcome::Superseded => "superseded",
            PassOutcome::Registered(_) => "registered",
        }
    }
}

/// What a successful pass registered with the map
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub region: PageRect,
    pub size: RasterSize,
    pub quad: GeoQuad,
}

/// Result of one pass, as delivered on the overlay's report channel
#[derive(Debug)]
pub struct PassReport {
    pub sequence: u64,
    pub result: OverlayResult<PassOutcome>,
}

/// Output of the planning phase
#[derive(Debug, Clone, PartialEq)]
pub enum PassPlan {
    Skip(PassOutcome),
    Render(PlannedRender),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRender {
    pub sequence: u64,
    pub region: PageRect,
    pub size: RasterSize,
    pub transform: RenderTransform,
}

/// A rasterized region ready to be registered
#[derive(Debug)]
pub struct RenderedPass {
    pub sequence: u64,
    pub image: RgbaImage,
    pub registration: Registration,
}

pub(crate) struct RenderPipeline<M, D> {
    pub(crate) map: Arc<M>,
    document: Arc<D>,
    calibration: Calibration,
    projection: Arc<dyn GeoProjection>,
    image_id: String,
    insert_before: Option<String>,
    render: RenderConfig,
    latest_sequence: AtomicU64,
}

impl<M: MapComponent, D: PagedDocument> RenderPipeline<M, D> {
    pub(crate) fn new(
        map: Arc<M>,
        document: Arc<D>,
        calibration: Calibration,
        projection: Arc<dyn GeoProjection>,
        image_id: String,
        insert_before: Option<String>,
        render: RenderConfig,
    ) -> Self {
        Self {
            map,
            document,
            calibration,
            projection,
            image_id,
            insert_before,
            render,
            latest_sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn image_id(&self) -> &str {
        &self.image_id
    }

    pub(crate) fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Start a pass: take a sequence number, then project, clip and size.
    pub(crate) fn plan(&self, state: &OverlayState) -> (u64, PassPlan) {
        let sequence = self.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;

        if !state.is_drawable() {
            return (sequence, PassPlan::Skip(PassOutcome::Disabled));
        }

        let bounds = self.map.bounds();
        let projected = project_viewport(&bounds, &self.calibration);
        let Some(region) = clip_to_page(&projected, self.calibration.page()) else {
            debug!(
                overlay = %self.image_id,
                sequence,
                "Viewport does not intersect the page"
            );
            return (sequence, PassPlan::Skip(PassOutcome::NothingVisible));
        };

        let size = output_size(
            &region,
            &self.calibration,
            self.map.zoom(),
            self.map.pixel_ratio(),
            &self.render,
        );
        let transform = RenderTransform::for_region(&region, size);

        debug!(
            overlay = %self.image_id,
            sequence,
            region = format!(
                "({:.1},{:.1}) {:.1}x{:.1}",
                region.x, region.y, region.width, region.height
            ),
            output_size = format!("{}x{}", size.width, size.height),
            "Planned render pass"
        );

        (
            sequence,
            PassPlan::Render(PlannedRender {
                sequence,
                region,
                size,
                transform,
            }),
        )
    }

    /// Rasterize the planned region and derive its geographic corners.
    pub(crate) async fn rasterize(&self, plan: PlannedRender) -> OverlayResult<RenderedPass> {
        let image = self
            .document
            .render_region(plan.transform, plan.size)
            .await?;

        let quad = page_rect_to_quad(&plan.region, &self.calibration, self.projection.as_ref())?;
        trace!(overlay = %self.image_id, sequence = plan.sequence, quad = ?quad.to_array(), "Computed image corners");

        Ok(RenderedPass {
            sequence: plan.sequence,
            image,
            registration: Registration {
                region: plan.region,
                size: plan.size,
                quad,
            },
        })
    }

    /// Replace the image, source and layer registered under the overlay id.
    pub(crate) fn register(
        &self,
        state: &OverlayState,
        rendered: RenderedPass,
    ) -> OverlayResult<PassOutcome> {
        if !state.is_drawable() {
            return Ok(PassOutcome::Disabled);
        }

        if self.render.discard_stale_passes
            && self.latest_sequence.load(Ordering::SeqCst) != rendered.sequence
        {
            debug!(
                overlay = %self.image_id,
                sequence = rendered.sequence,
                latest = self.latest_sequence.load(Ordering::SeqCst),
                "Discarding superseded render pass"
            );
            return Ok(PassOutcome::Superseded);
        }

        let map = self.map.as_ref();
        let id = self.image_id.as_str();

        // The source is replaced below, which fails while another layer draws from it
        if let Some(user) = map
            .layers_using_source(id)
            .into_iter()
            .find(|layer| layer != id)
        {
            return Err(MapError::InUse {
                kind: "source",
                id: id.to_string(),
                user: format!("layer {}", user),
            }
            .into());
        }

        let RenderedPass {
            sequence,
            image,
            registration,
        } = rendered;

        if let Err(e) = self.replace_registration(image, registration.quad, state.opacity) {
            warn!(
                overlay = %id,
                sequence,
                error = %e,
                "Registration failed, removing partial overlay"
            );
            self.tear_down();
            return Err(e.into());
        }

        debug!(
            overlay = %id,
            sequence,
            size = format!("{}x{}", registration.size.width, registration.size.height),
            "Registered overlay image"
        );

        Ok(PassOutcome::Registered(registration))
    }

    fn replace_registration(
        &self,
        image: RgbaImage,
        quad: GeoQuad,
        opacity: f64,
    ) -> Result<(), MapError> {
        let map = self.map.as_ref();
        let id = self.image_id.as_str();

        // Image before source before layer; every add is preceded by removal
        if map.has_image(id) {
            map.remove_image(id)?;
        }
        map.add_image(
            id,
            MapImage {
                pixels: Arc::new(image),
                pixel_ratio: 1.0,
            },
        )?;

        if map.has_source(id) {
            if map.has_layer(id) {
                map.remove_layer(id)?;
            }
            map.remove_source(id)?;
        }
        map.add_source(
            id,
            ImageSource {
                image_id: id.to_string(),
                coordinates: quad,
            },
        )?;

        let before = self
            .insert_before
            .as_deref()
            .filter(|before| map.has_layer(before));
        map.add_layer(
            RasterLayer {
                id: id.to_string(),
                source: id.to_string(),
                opacity,
            },
            before,
        )
    }

    /// Remove whatever is registered under the overlay id, layer first.
    fn tear_down(&self) {
        let map = self.map.as_ref();
        let id = self.image_id.as_str();

        if map.has_layer(id)
            && let Err(e) = map.remove_layer(id)
        {
            warn!(overlay = %id, error = %e, "Failed to remove layer");
        }
        if map.has_source(id)
            && let Err(e) = map.remove_source(id)
        {
            // The image stays while a source still names it
            warn!(overlay = %id, error = %e, "Failed to remove source");
            return;
        }
        if map.has_image(id)
            && let Err(e) = map.remove_image(id)
        {
            warn!(overlay = %id, error = %e, "Failed to remove image");
        }
    }
}
