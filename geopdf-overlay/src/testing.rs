//! Shared test fixtures.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{Rgba, RgbaImage};
use tokio::sync::{oneshot, watch};

use crate::calibration::Calibration;
use crate::document::{PagedDocument, RenderTransform};
use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{GeoBounds, PagePoint, PageSize, RasterDimensions, RasterSize};
use crate::transform::{Proj4Projection, page_to_lng_lat};

pub const PAGE: PageSize = PageSize {
    width: 200.0,
    height: 200.0,
};

/// One world unit per page point, page origin at (500000, 4000000)
pub const WORLD_FILE: &str = "2.0\n0.0\n0.0\n-2.0\n500000\n4000000\n";

pub const SOURCE: RasterDimensions = RasterDimensions {
    width: 100,
    height: 100,
};

pub fn reference_calibration() -> Calibration {
    Calibration::from_world_file_text(WORLD_FILE, SOURCE, PAGE).unwrap()
}

/// Geographic bounds whose page-space image spans `(x0, y0)`..`(x1, y1)`
pub fn bounds_around(x0: f64, y0: f64, x1: f64, y1: f64) -> GeoBounds {
    let calibration = reference_calibration();
    let projection = Proj4Projection::web_mercator().unwrap();
    let tl = page_to_lng_lat(PagePoint::new(x0, y0), &calibration, &projection).unwrap();
    let br = page_to_lng_lat(PagePoint::new(x1, y1), &calibration, &projection).unwrap();
    GeoBounds::new(tl.lng, br.lat, br.lng, tl.lat)
}

/// Document that paints solid rasters and records every render request.
pub struct RecordingDocument {
    page: PageSize,
    renders: Mutex<Vec<(RenderTransform, RasterSize)>>,
    render_count: watch::Sender<usize>,
    fail_next: AtomicBool,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl RecordingDocument {
    pub fn new(page: PageSize) -> Self {
        let (render_count, _) = watch::channel(0);
        Self {
            page,
            renders: Mutex::new(Vec::new()),
            render_count,
            fail_next: AtomicBool::new(false),
            gates: Mutex::new(VecDeque::new()),
        }
    }

    pub fn renders(&self) -> Vec<(RenderTransform, RasterSize)> {
        self.renders.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        *self.render_count.borrow()
    }

    /// Make the next render call fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Hold the next render call until the returned sender fires
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub async fn wait_for_renders(&self, count: usize) {
        let mut rx = self.render_count.subscribe();
        rx.wait_for(|c| *c >= count).await.unwrap();
    }
}

impl PagedDocument for RecordingDocument {
    fn page_size(&self) -> PageSize {
        self.page
    }

    async fn render_region(
        &self,
        transform: RenderTransform,
        size: RasterSize,
    ) -> OverlayResult<RgbaImage> {
        self.renders.lock().unwrap().push((transform, size));
        self.render_count.send_modify(|c| *c += 1);

        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(OverlayError::Rasterization {
                source: Box::new(std::io::Error::other("render failed")),
            });
        }

        Ok(RgbaImage::from_pixel(
            size.width,
            size.height,
            Rgba([200, 30, 30, 255]),
        ))
    }
}
