use geo::Geometry;
use wkt::{ToWkt, TryFromWkt};

use crate::{
    geometry::{CanonicalPolygon, ShapeGeometry},
    Error, Result,
};

pub fn to_wkt(canonical: &CanonicalPolygon) -> String {
    canonical.to_geometry().wkt_string()
}

/// Host supplied WKT of a single shape, in the working frame
pub fn shape_geometry_from_wkt(wkt: &str) -> Result<ShapeGeometry> {
    let geometry = Geometry::<f64>::try_from_wkt_str(wkt).map_err(|e| Error::WktError(e.to_string()))?;
    ShapeGeometry::try_from(geometry)
}
