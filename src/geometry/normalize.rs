use geo::{BoundingRect, Buffer, Coord, LineString, MapCoords, Point, Polygon};

use super::{merge, resolve, simplify_if_greater_than, CanonicalPolygon, ShapeGeometry};
use crate::{consts, parameters::GeometryParameters, project::Frames, Error, Result};

/// Turns any supported shape into a polygon in the working frame.
pub struct Normalizer {
    params: GeometryParameters,
    frames: Frames,
}

impl Normalizer {
    pub fn new(params: GeometryParameters) -> Result<Self> {
        let frames = Frames::new(params.working_epsg)?;
        Ok(Normalizer { params, frames })
    }

    pub fn params(&self) -> &GeometryParameters {
        &self.params
    }

    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    /// `buffer_feet` is the shape's own buffer, falling back to the default buffer
    /// when missing or not positive. Only points and lines are buffered.
    pub fn normalize(&self, geometry: &ShapeGeometry, buffer_feet: Option<f64>) -> Result<CanonicalPolygon> {
        let buffer = resolve_buffer(buffer_feet, self.params.default_buffer_feet);

        match geometry {
            ShapeGeometry::Polygon(p) => Ok(CanonicalPolygon::Polygon(p.clone())),
            ShapeGeometry::MultiPolygon(mp) => Ok(CanonicalPolygon::MultiPolygon(mp.clone())),
            ShapeGeometry::Circle { center, radius } => {
                if !(*radius > 0.) {
                    return Err(Error::EmptyGeometry);
                }
                Ok(CanonicalPolygon::Polygon(circle_polygon(
                    *center,
                    *radius,
                    self.params.circle_vertices,
                )))
            }
            ShapeGeometry::Point(p) => self.buffer_point(p, buffer),
            ShapeGeometry::Line(line) => self.buffer_line(line, buffer),
        }
    }

    // same path as a line, the buffer of a point is a circle in the local frame
    fn buffer_point(&self, point: &Point, buffer_feet: f64) -> Result<CanonicalPolygon> {
        let radius = consts::feet_to_meters(buffer_feet);
        if !(radius > 0.) {
            return Err(Error::EmptyGeometry);
        }

        let center = self.frames.to_geographic(point)?.map_coords(truncate);
        let local = self.frames.local_metric(center.0)?;
        let origin = local.to_local(&center)?;

        let circle = circle_polygon(origin.0, radius, self.params.circle_vertices);
        let mut disc = CanonicalPolygon::Polygon(local.to_geographic(&circle)?);
        simplify_if_greater_than(self.params.simplify_limit, &mut disc);

        self.frames.to_working(&disc)
    }

    // working -> geographic -> truncate -> buffer in meters -> simplify -> working
    fn buffer_line(&self, line: &LineString, buffer_feet: f64) -> Result<CanonicalPolygon> {
        if line.0.is_empty() || !(buffer_feet > 0.) {
            return Err(Error::EmptyGeometry);
        }

        let geographic = self.frames.to_geographic(line)?.map_coords(truncate);
        let center = geographic
            .bounding_rect()
            .ok_or(Error::EmptyGeometry)?
            .center();

        let local = self.frames.local_metric(center)?;
        let buffered = local
            .to_local(&geographic)?
            .buffer(consts::feet_to_meters(buffer_feet));

        let mut corridor =
            CanonicalPolygon::from_multi(local.to_geographic(&buffered)?).ok_or(Error::EmptyGeometry)?;
        simplify_if_greater_than(self.params.simplify_limit, &mut corridor);

        self.frames.to_working(&corridor)
    }
}

/// A shape's own buffer wins unless it is missing or not positive
pub fn resolve_buffer(shape_buffer: Option<f64>, default_buffer: f64) -> f64 {
    match shape_buffer {
        Some(b) if b > 0. => b,
        _ => default_buffer,
    }
}

/// Repairs and flattens one normalized shape the way the compute unit does
/// before reporting it: polygons are resolved, multi-polygons merged member by member.
pub fn flatten_shape(polygon: CanonicalPolygon, skip_resolve: bool, skip_merge: bool) -> CanonicalPolygon {
    match polygon {
        CanonicalPolygon::Polygon(p) if skip_resolve => CanonicalPolygon::Polygon(p),
        CanonicalPolygon::Polygon(p) => {
            let original = CanonicalPolygon::Polygon(p);
            resolve(&original).pop().unwrap_or(original)
        }
        CanonicalPolygon::MultiPolygon(mp) if skip_merge => CanonicalPolygon::MultiPolygon(mp),
        CanonicalPolygon::MultiPolygon(mp) => {
            let members = mp.0.iter().cloned().map(CanonicalPolygon::Polygon).collect();
            merge(members, skip_resolve)
                .region
                .unwrap_or(CanonicalPolygon::MultiPolygon(mp))
        }
    }
}

fn truncate(c: Coord) -> Coord {
    let factor = 10f64.powi(consts::COORD_PRECISION);
    Coord {
        x: (c.x * factor).round() / factor,
        y: (c.y * factor).round() / factor,
    }
}

fn circle_polygon(center: Coord, radius: f64, vertices: usize) -> Polygon {
    let n = vertices.max(3);
    let ring: Vec<Coord> = (0..n)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / n as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();

    Polygon::new(LineString::new(ring), vec![])
}
