//! Coordinate and extent types shared by the overlay pipeline.
//!
//! Three coordinate spaces are involved:
//! - geographic (`LngLat`, degrees, WGS84)
//! - planar projected (`PlanarPoint`, spherical Web Mercator meters)
//! - page space (`PagePoint`, PDF points with the origin at the top-left of the page)

use serde::{Deserialize, Serialize};

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Point in the planar projected system (meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Point in page space (points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Physical page size in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

/// Declared pixel dimensions of the raster the world file was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterDimensions {
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [PagePoint; 4] {
        [
            PagePoint::new(self.x, self.y),
            PagePoint::new(self.right(), self.y),
            PagePoint::new(self.right(), self.bottom()),
            PagePoint::new(self.x, self.bottom()),
        ]
    }
}

/// Visible extent of the map, as reported by the map component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Corners in SW, SE, NE, NW order.
    pub fn corners(&self) -> [LngLat; 4] {
        [
            LngLat::new(self.west, self.south),
            LngLat::new(self.east, self.south),
            LngLat::new(self.east, self.north),
            LngLat::new(self.west, self.north),
        ]
    }
}

/// Corner coordinates of an image source.
///
/// Winding order is top-left, top-right, bottom-right, bottom-left, which is
/// what map components expect for image sources. Projection shear means the
/// quad is generally not a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoQuad {
    pub top_left: LngLat,
    pub top_right: LngLat,
    pub bottom_right: LngLat,
    pub bottom_left: LngLat,
}

impl GeoQuad {
    pub fn to_array(&self) -> [[f64; 2]; 4] {
        [
            [self.top_left.lng, self.top_left.lat],
            [self.top_right.lng, self.top_right.lat],
            [self.bottom_right.lng, self.bottom_right.lat],
            [self.bottom_left.lng, self.bottom_left.lat],
        ]
    }
}

/// Output bitmap size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RasterSize {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_corner_winding() {
        let rect = PageRect {
            x: 1.0,
            y: 2.0,
            width: 3.0,
            height: 4.0,
        };
        let [tl, tr, br, bl] = rect.corners();
        assert_eq!(tl, PagePoint::new(1.0, 2.0));
        assert_eq!(tr, PagePoint::new(4.0, 2.0));
        assert_eq!(br, PagePoint::new(4.0, 6.0));
        assert_eq!(bl, PagePoint::new(1.0, 6.0));
    }
}
