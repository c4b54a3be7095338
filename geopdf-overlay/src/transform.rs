//! Conversions between geographic, planar projected and page coordinates.

mod projection;

pub use projection::Proj4Projection;

use std::f64::consts::PI;

use crate::calibration::Calibration;
use crate::error::OverlayResult;
use crate::geometry::{GeoQuad, LngLat, PagePoint, PageRect, PlanarPoint};

/// Spherical Earth radius used by Web Mercator (meters)
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Latitude at which spherical Mercator maps the world to a square
pub const MAX_MERCATOR_LATITUDE: f64 = 85.0511287798066;

/// Inverse projection from the planar system back to longitude/latitude.
pub trait GeoProjection: Send + Sync {
    fn to_geographic(&self, p: PlanarPoint) -> OverlayResult<LngLat>;
}

/// Geographic → planar, closed-form spherical Mercator.
///
/// Latitude is clamped to ±[`MAX_MERCATOR_LATITUDE`]; the poles have no
/// finite Mercator image.
pub fn lng_lat_to_planar(ll: LngLat) -> PlanarPoint {
    let lat = ll.lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let x = EARTH_RADIUS * ll.lng * PI / 180.0;
    let y = EARTH_RADIUS * (PI / 4.0 + lat * PI / 360.0).tan().ln();
    PlanarPoint::new(x, y)
}

/// Planar → page space.
pub fn planar_to_page(p: PlanarPoint, calibration: &Calibration) -> PagePoint {
    calibration.planar_to_page(p)
}

/// Page space → planar.
pub fn page_to_planar(p: PagePoint, calibration: &Calibration) -> PlanarPoint {
    calibration.page_to_planar(p)
}

/// Planar → geographic, delegated to the projection backend.
pub fn planar_to_lng_lat(p: PlanarPoint, projection: &dyn GeoProjection) -> OverlayResult<LngLat> {
    projection.to_geographic(p)
}

/// Geographic → page space.
pub fn lng_lat_to_page(ll: LngLat, calibration: &Calibration) -> PagePoint {
    planar_to_page(lng_lat_to_planar(ll), calibration)
}

/// Page space → geographic.
pub fn page_to_lng_lat(
    p: PagePoint,
    calibration: &Calibration,
    projection: &dyn GeoProjection,
) -> OverlayResult<LngLat> {
    planar_to_lng_lat(page_to_planar(p, calibration), projection)
}

/// Geographic corners of a page rectangle, in image-source winding order.
pub fn page_rect_to_quad(
    rect: &PageRect,
    calibration: &Calibration,
    projection: &dyn GeoProjection,
) -> OverlayResult<GeoQuad> {
    let [tl, tr, br, bl] = rect.corners();
    Ok(GeoQuad {
        top_left: page_to_lng_lat(tl, calibration, projection)?,
        top_right: page_to_lng_lat(tr, calibration, projection)?,
        bottom_right: page_to_lng_lat(br, calibration, projection)?,
        bottom_left: page_to_lng_lat(bl, calibration, projection)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PageSize, RasterDimensions};

    fn calibration() -> Calibration {
        Calibration::from_world_file_text(
            "2.0\n0.0\n0.0\n-2.0\n4187000\n7509000\n",
            RasterDimensions {
                width: 1000,
                height: 1000,
            },
            PageSize {
                width: 500.0,
                height: 500.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_forward_mercator_known_values() {
        let origin = lng_lat_to_planar(LngLat::new(0.0, 0.0));
        assert!(origin.x.abs() < 1e-9);
        assert!(origin.y.abs() < 1e-9);

        let east = lng_lat_to_planar(LngLat::new(180.0, 0.0));
        assert!((east.x - 20037508.342789244).abs() < 1e-6);

        // 85.0511287798 degrees is the square-world latitude limit
        let north = lng_lat_to_planar(LngLat::new(0.0, 85.0511287798));
        assert!((north.y - 20037508.342789244).abs() < 1.0);
    }

    #[test]
    fn test_poles_clamp_to_mercator_limit() {
        let limit = lng_lat_to_planar(LngLat::new(10.0, MAX_MERCATOR_LATITUDE));
        let north = lng_lat_to_planar(LngLat::new(10.0, 90.0));
        let south = lng_lat_to_planar(LngLat::new(10.0, -90.0));

        assert!(north.y.is_finite());
        assert_eq!(north, limit);
        assert!((south.y + limit.y).abs() < 1e-6);
        assert_eq!(south.x, limit.x);
    }

    #[test]
    fn test_page_planar_round_trip() {
        let calibration = calibration();
        let p = PagePoint::new(321.0, 99.5);
        let back = planar_to_page(page_to_planar(p, &calibration), &calibration);
        assert!((back.x - p.x).abs() < 1e-6);
        assert!((back.y - p.y).abs() < 1e-6);
    }

    #[test]
    fn test_geographic_page_round_trip() {
        let calibration = calibration();
        let projection = Proj4Projection::web_mercator().unwrap();
        let p = PagePoint::new(250.0, 125.0);
        let ll = page_to_lng_lat(p, &calibration, &projection).unwrap();
        let back = lng_lat_to_page(ll, &calibration);
        assert!((back.x - p.x).abs() < 1e-4, "x {}", back.x);
        assert!((back.y - p.y).abs() < 1e-4, "y {}", back.y);
    }

    #[test]
    fn test_quad_winding() {
        let calibration = calibration();
        let projection = Proj4Projection::web_mercator().unwrap();
        let quad = page_rect_to_quad(
            &PageRect {
                x: 0.0,
                y: 0.0,
                width: 500.0,
                height: 500.0,
            },
            &calibration,
            &projection,
        )
        .unwrap();

        // Page y grows downwards while latitude grows northwards
        assert!(quad.top_left.lat > quad.bottom_left.lat);
        assert!(quad.top_right.lng > quad.top_left.lng);
        assert!((quad.top_left.lat - quad.top_right.lat).abs() < 1e-9);
        assert!((quad.bottom_right.lng - quad.top_right.lng).abs() < 1e-9);
    }
}
