use geo::{Coord, Geometry};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::{
    geometry::{CanonicalPolygon, ShapeGeometry, SourceTag},
    Error, Result,
};

/// A feature carrying a canonical polygon and the shape's identity
pub fn to_feature(
    canonical: &CanonicalPolygon,
    id: i64,
    source: SourceTag,
    buffer_feet: Option<f64>,
) -> Feature {
    feature_with(&canonical.to_geometry(), id, source, buffer_feet)
}

/// A feature carrying a raw shape geometry, circles become a point with a `radius` property
pub fn shape_to_feature(
    geometry: &ShapeGeometry,
    id: i64,
    source: SourceTag,
    buffer_feet: Option<f64>,
) -> Feature {
    let geo_geometry = match geometry {
        ShapeGeometry::Point(p) => Geometry::Point(*p),
        ShapeGeometry::Line(l) => Geometry::LineString(l.clone()),
        ShapeGeometry::Polygon(p) => Geometry::Polygon(p.clone()),
        ShapeGeometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        ShapeGeometry::Circle { center, .. } => Geometry::Point(geo::Point::from(*center)),
    };

    let mut feature = feature_with(&geo_geometry, id, source, buffer_feet);
    if let ShapeGeometry::Circle { radius, .. } = geometry {
        feature.set_property("radius", *radius);
    }
    feature
}

fn feature_with(geometry: &Geometry, id: i64, source: SourceTag, buffer_feet: Option<f64>) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), JsonValue::from(id));
    properties.insert("source".to_string(), JsonValue::from(source.as_str()));
    if let Some(buffer) = buffer_feet {
        properties.insert("buffer".to_string(), JsonValue::from(buffer));
    }

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn canonical_from_feature(feature: &Feature) -> Result<CanonicalPolygon> {
    let geometry = feature.geometry.clone().ok_or(Error::EmptyGeometry)?;
    canonical_from_geometry(geometry)
}

pub fn canonical_from_geometry(geometry: geojson::Geometry) -> Result<CanonicalPolygon> {
    CanonicalPolygon::try_from(Geometry::<f64>::try_from(geometry)?)
}

/// The raw shape a feature describes. A point with a positive `radius` property is a circle.
pub fn shape_geometry_from_feature(feature: &Feature) -> Result<ShapeGeometry> {
    let geometry = feature.geometry.clone().ok_or(Error::EmptyGeometry)?;
    let shape = ShapeGeometry::try_from(Geometry::<f64>::try_from(geometry)?)?;

    match (shape, number_property(feature, "radius")) {
        (ShapeGeometry::Point(p), Some(radius)) if radius > 0. => Ok(ShapeGeometry::Circle {
            center: Coord { x: p.x(), y: p.y() },
            radius,
        }),
        (shape, _) => Ok(shape),
    }
}

pub fn feature_id(feature: &Feature) -> Option<i64> {
    feature.property("id").and_then(JsonValue::as_i64)
}

/// The feature's own buffer in feet, if it has a usable one
pub fn feature_buffer(feature: &Feature) -> Option<f64> {
    number_property(feature, "buffer").filter(|b| *b > 0.)
}

pub fn feature_source(feature: &Feature) -> SourceTag {
    feature
        .property("source")
        .and_then(JsonValue::as_str)
        .map(SourceTag::from_property)
        .unwrap_or_default()
}

/// Every feature in a GeoJSON text, whatever its top level object is
pub fn features_from_str(contents: &str) -> Result<Vec<Feature>> {
    Ok(match contents.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(FeatureCollection { features, .. }) => features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature::from(geometry)],
    })
}

// numbers sometimes arrive as strings from form fields
fn number_property(feature: &Feature, key: &str) -> Option<f64> {
    match feature.property(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
