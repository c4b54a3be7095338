use std::sync::Arc;

use serde_json::json;
use tracing::info;

use geopdf_overlay::config::load_app_config;
use geopdf_overlay::document::create_pdfium;
use geopdf_overlay::error::OverlayError;
use geopdf_overlay::map::HeadlessMap;
use geopdf_overlay::{PassOutcome, PdfOverlay};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting geopdf-overlay preview v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_app_config()?;
    let preview = config.preview.clone().ok_or_else(|| OverlayError::Config {
        message: "missing [preview] section".to_string(),
    })?;

    info!(
        document = %config.overlay.document_url,
        calibration = %config.overlay.calibration_url,
        zoom = preview.zoom,
        "Configuration loaded"
    );

    let pdfium = Arc::new(create_pdfium(preview.pdfium_library_path.as_deref())?);
    let map = Arc::new(HeadlessMap::new(
        preview.bounds(),
        preview.zoom,
        preview.pixel_ratio,
    ));

    let overlay = PdfOverlay::load(map.clone(), pdfium, &config).await?;
    let mut reports = overlay
        .pass_reports()
        .ok_or_else(|| OverlayError::Config {
            message: "pass reports already taken".to_string(),
        })?;

    let report = reports.recv().await.ok_or_else(|| OverlayError::Config {
        message: "overlay produced no initial pass".to_string(),
    })?;

    match report.result? {
        PassOutcome::Registered(registration) => {
            let image = map.image(overlay.image_id()).ok_or_else(|| OverlayError::Config {
                message: "registered image missing from map".to_string(),
            })?;
            image.pixels.save(&preview.output)?;

            info!(
                path = %preview.output.display(),
                width = registration.size.width,
                height = registration.size.height,
                "Wrote overlay raster"
            );

            let summary = json!({
                "image": preview.output,
                "size": registration.size,
                "coordinates": registration.quad.to_array(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        outcome => {
            info!(outcome = outcome.label(), "Nothing to write");
        }
    }

    overlay.remove()?;
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // RUST_LOG wins; default to info for the crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("geopdf_overlay=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
