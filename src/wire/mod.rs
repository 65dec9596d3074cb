//! Conversions at the edges: GeoJSON for compute jobs and host shape sets,
//! WKT and acres for what the host is told.
pub mod area;
pub mod geojson;
pub mod wkt;

pub use self::area::acres;
pub use self::geojson::{
    canonical_from_feature, canonical_from_geometry, feature_buffer, feature_id, feature_source,
    features_from_str, shape_geometry_from_feature, shape_to_feature, to_feature,
};
pub use self::wkt::{shape_geometry_from_wkt, to_wkt};
