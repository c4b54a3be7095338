//! Planar → geographic inverse projection backed by proj4rs.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::GeoProjection;
use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{LngLat, PlanarPoint};

/// Spherical Web Mercator (EPSG:3857)
const WEB_MERCATOR: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

/// Longitude/latitude on the same sphere. EPSG:3857 treats spherical
/// latitudes as WGS84 latitudes, so no datum shift may be applied.
const GEOGRAPHIC: &str = "+proj=longlat +a=6378137 +b=6378137 +no_defs";

/// Inverse projection from EPSG:3857 to EPSG:4326.
pub struct Proj4Projection {
    source: Proj,
    target: Proj,
}

impl std::fmt::Debug for Proj4Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proj4Projection")
            .field("source", &"EPSG:3857")
            .field("target", &"EPSG:4326")
            .finish_non_exhaustive()
    }
}

impl Proj4Projection {
    pub fn web_mercator() -> OverlayResult<Self> {
        let source = Proj::from_proj_string(WEB_MERCATOR).map_err(|e| OverlayError::Projection {
            message: format!("Invalid source projection EPSG:3857: {e:?}"),
        })?;
        let target = Proj::from_proj_string(GEOGRAPHIC).map_err(|e| OverlayError::Projection {
            message: format!("Invalid target projection EPSG:4326: {e:?}"),
        })?;

        Ok(Self { source, target })
    }
}

impl GeoProjection for Proj4Projection {
    fn to_geographic(&self, p: PlanarPoint) -> OverlayResult<LngLat> {
        let mut point = (p.x, p.y, 0.0);

        transform(&self.source, &self.target, &mut point).map_err(|e| {
            OverlayError::Projection {
                message: format!("Transform of ({}, {}) failed: {e:?}", p.x, p.y),
            }
        })?;

        // Geographic output is in radians
        Ok(LngLat::new(point.0.to_degrees(), point.1.to_degrees()))
    }
}
