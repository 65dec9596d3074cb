use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::CanonicalPolygon;
use crate::{Error, Result};

/// Where a shape came from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceTag {
    Draw,
    Upload,
    Server,
    #[default]
    Unknown,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Draw => "draw",
            SourceTag::Upload => "upload",
            SourceTag::Server => "server",
            SourceTag::Unknown => "unknown",
        }
    }

    /// Lenient parse of a `source` property, anything unrecognized is `Unknown`
    pub fn from_property(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "draw" => SourceTag::Draw,
            "upload" => SourceTag::Upload,
            "server" => SourceTag::Server,
            _ => SourceTag::Unknown,
        }
    }
}

impl Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrawMode {
    Point,
    Line,
    #[default]
    Polygon,
    Circle,
}

/// The raw geometry of a shape in the working frame, as drawn or imported
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeGeometry {
    Point(Point),
    Line(LineString),
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
    Circle { center: Coord, radius: f64 },
}

impl ShapeGeometry {
    pub fn kind(&self) -> &'static str {
        match self {
            ShapeGeometry::Point(_) => "Point",
            ShapeGeometry::Line(_) => "LineString",
            ShapeGeometry::Polygon(_) => "Polygon",
            ShapeGeometry::MultiPolygon(_) => "MultiPolygon",
            ShapeGeometry::Circle { .. } => "Circle",
        }
    }
}

impl TryFrom<Geometry> for ShapeGeometry {
    type Error = Error;

    fn try_from(geometry: Geometry) -> Result<Self> {
        match geometry {
            Geometry::Point(p) => Ok(ShapeGeometry::Point(p)),
            Geometry::Line(l) => Ok(ShapeGeometry::Line(LineString::new(vec![l.start, l.end]))),
            Geometry::LineString(l) => Ok(ShapeGeometry::Line(l)),
            Geometry::Polygon(p) => Ok(ShapeGeometry::Polygon(p)),
            Geometry::MultiPolygon(mp) => Ok(ShapeGeometry::MultiPolygon(mp)),
            Geometry::MultiPoint(_) => Err(Error::UnsupportedGeometry("MultiPoint".to_string())),
            Geometry::MultiLineString(_) => {
                Err(Error::UnsupportedGeometry("MultiLineString".to_string()))
            }
            Geometry::GeometryCollection(_) => {
                Err(Error::UnsupportedGeometry("GeometryCollection".to_string()))
            }
            Geometry::Rect(_) => Err(Error::UnsupportedGeometry("Rect".to_string())),
            Geometry::Triangle(_) => Err(Error::UnsupportedGeometry("Triangle".to_string())),
        }
    }
}

impl From<CanonicalPolygon> for ShapeGeometry {
    fn from(canonical: CanonicalPolygon) -> Self {
        match canonical {
            CanonicalPolygon::Polygon(p) => ShapeGeometry::Polygon(p),
            CanonicalPolygon::MultiPolygon(mp) => ShapeGeometry::MultiPolygon(mp),
        }
    }
}

/// A committed shape. The canonical polygon is derived from the geometry and buffer
/// and is recomputed whenever either changes.
#[derive(Debug, Clone)]
pub struct Shape {
    pub tracking_id: i64,
    pub geometry: ShapeGeometry,
    pub buffer_feet: Option<f64>,
    pub source: SourceTag,
    pub selected: bool,
    // bumped on every edit of the geometry
    pub revision: u64,
    pub canonical: CanonicalPolygon,
}

impl Shape {
    pub fn new(
        tracking_id: i64,
        geometry: ShapeGeometry,
        buffer_feet: Option<f64>,
        source: SourceTag,
        canonical: CanonicalPolygon,
    ) -> Self {
        Shape {
            tracking_id,
            geometry,
            buffer_feet,
            source,
            selected: false,
            revision: 0,
            canonical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, MultiPoint};

    #[test]
    fn only_the_five_shape_kinds_convert() {
        let p = Geometry::Point(point!(x: 1., y: 2.));
        assert_eq!(ShapeGeometry::try_from(p).unwrap().kind(), "Point");

        let mp = Geometry::MultiPoint(MultiPoint::from(vec![(0., 0.), (1., 1.)]));
        match ShapeGeometry::try_from(mp) {
            Err(Error::UnsupportedGeometry(kind)) => assert_eq!(kind, "MultiPoint"),
            other => panic!("expected an unsupported geometry error, got {other:?}"),
        }
    }

    #[test]
    fn source_tags_parse_leniently() {
        assert_eq!(SourceTag::from_property("Server"), SourceTag::Server);
        assert_eq!(SourceTag::from_property("draw"), SourceTag::Draw);
        assert_eq!(SourceTag::from_property("kml"), SourceTag::Unknown);
    }
}
