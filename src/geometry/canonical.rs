use geo::{Area, Coord, CoordsIter, Geometry, MapCoords, MultiPolygon, Polygon, Relate, Within};

use crate::{Error, Result};

/// A shape reduced to something with an area: a single polygon or a multi-polygon,
/// in whatever frame it was produced in (normally the working frame)
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalPolygon {
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

impl CanonicalPolygon {
    /// The result of a boolean operation. A single member collapses to a polygon,
    /// no members means there is nothing left.
    pub fn from_multi(mut multi: MultiPolygon) -> Option<Self> {
        multi.0.retain(|p| !p.exterior().0.is_empty());
        match multi.0.len() {
            0 => None,
            1 => multi.0.pop().map(CanonicalPolygon::Polygon),
            _ => Some(CanonicalPolygon::MultiPolygon(multi)),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, CanonicalPolygon::MultiPolygon(_))
    }

    pub fn to_multi(&self) -> MultiPolygon {
        match self {
            CanonicalPolygon::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            CanonicalPolygon::MultiPolygon(mp) => mp.clone(),
        }
    }

    pub fn into_polygons(self) -> Vec<Polygon> {
        match self {
            CanonicalPolygon::Polygon(p) => vec![p],
            CanonicalPolygon::MultiPolygon(mp) => mp.0,
        }
    }

    pub fn to_geometry(&self) -> Geometry {
        match self {
            CanonicalPolygon::Polygon(p) => Geometry::Polygon(p.clone()),
            CanonicalPolygon::MultiPolygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }

    /// Vertex count used by the simplification policy:
    /// the outer ring of a polygon, every ring of every member of a multi-polygon
    pub fn vertex_count(&self) -> usize {
        match self {
            CanonicalPolygon::Polygon(p) => p.exterior().0.len(),
            CanonicalPolygon::MultiPolygon(mp) => mp
                .0
                .iter()
                .map(|p| p.exterior().0.len() + p.interiors().iter().map(|r| r.0.len()).sum::<usize>())
                .sum(),
        }
    }

    /// Planar area in squared frame units
    pub fn area(&self) -> f64 {
        match self {
            CanonicalPolygon::Polygon(p) => p.unsigned_area(),
            CanonicalPolygon::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            CanonicalPolygon::Polygon(p) => p.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()),
            CanonicalPolygon::MultiPolygon(mp) => {
                mp.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
            }
        }
    }

    pub fn is_within(&self, other: &CanonicalPolygon) -> bool {
        if !self.is_finite() || !other.is_finite() {
            return false;
        }
        match (self, other) {
            (CanonicalPolygon::Polygon(a), CanonicalPolygon::Polygon(b)) => a.is_within(b),
            (a, b) => a.to_multi().relate(&b.to_multi()).is_within(),
        }
    }
}

impl From<Polygon> for CanonicalPolygon {
    fn from(p: Polygon) -> Self {
        CanonicalPolygon::Polygon(p)
    }
}

impl From<MultiPolygon> for CanonicalPolygon {
    fn from(mp: MultiPolygon) -> Self {
        CanonicalPolygon::MultiPolygon(mp)
    }
}

impl TryFrom<Geometry> for CanonicalPolygon {
    type Error = Error;

    fn try_from(geometry: Geometry) -> Result<Self> {
        match geometry {
            Geometry::Polygon(p) => Ok(CanonicalPolygon::Polygon(p)),
            Geometry::MultiPolygon(mp) => Ok(CanonicalPolygon::MultiPolygon(mp)),
            Geometry::Rect(r) => Ok(CanonicalPolygon::Polygon(r.to_polygon())),
            Geometry::Triangle(t) => Ok(CanonicalPolygon::Polygon(t.to_polygon())),
            other => Err(Error::UnsupportedGeometry(
                match other {
                    Geometry::Point(_) => "Point",
                    Geometry::Line(_) => "Line",
                    Geometry::LineString(_) => "LineString",
                    Geometry::MultiPoint(_) => "MultiPoint",
                    Geometry::MultiLineString(_) => "MultiLineString",
                    _ => "GeometryCollection",
                }
                .to_string(),
            )),
        }
    }
}

impl MapCoords<f64, f64> for CanonicalPolygon {
    type Output = CanonicalPolygon;

    fn map_coords(&self, func: impl Fn(Coord) -> Coord + Copy) -> Self::Output {
        match self {
            CanonicalPolygon::Polygon(p) => CanonicalPolygon::Polygon(p.map_coords(func)),
            CanonicalPolygon::MultiPolygon(mp) => CanonicalPolygon::MultiPolygon(mp.map_coords(func)),
        }
    }

    fn try_map_coords<E>(
        &self,
        func: impl Fn(Coord) -> std::result::Result<Coord, E> + Copy,
    ) -> std::result::Result<Self::Output, E> {
        Ok(match self {
            CanonicalPolygon::Polygon(p) => CanonicalPolygon::Polygon(p.try_map_coords(func)?),
            CanonicalPolygon::MultiPolygon(mp) => {
                CanonicalPolygon::MultiPolygon(mp.try_map_coords(func)?)
            }
        })
    }
}
