use geo::{Coord, MapCoords};
use proj4rs::{transform::transform, Proj};

use crate::{consts::GEOGRAPHIC_EPSG, Result};

/// The two frames shapes live in: the projected working frame the map is drawn in
/// and the geographic frame (degrees) used for buffering, simplification and areas.
pub struct Frames {
    working: Proj,
    working_is_latlong: bool,
    geographic: Proj,
}

impl Frames {
    pub fn new(working_epsg: u16) -> Result<Self> {
        Ok(Frames {
            working: Proj::from_epsg_code(working_epsg)?,
            working_is_latlong: working_epsg == GEOGRAPHIC_EPSG,
            geographic: Proj::from_epsg_code(GEOGRAPHIC_EPSG)?,
        })
    }

    pub fn to_geographic<G>(&self, geometry: &G) -> Result<G::Output>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| {
            reproject(&self.working, &self.geographic, c, self.working_is_latlong, true)
        })
    }

    pub fn to_working<G>(&self, geometry: &G) -> Result<G::Output>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| {
            reproject(&self.geographic, &self.working, c, true, self.working_is_latlong)
        })
    }

    /// A transverse mercator frame in meters centered on `center` (degrees),
    /// close enough to isometric around the center for buffering by a distance.
    pub fn local_metric(&self, center: Coord) -> Result<LocalFrame<'_>> {
        let definition = format!(
            "+proj=tmerc +lat_0={} +lon_0={} +k=1 +x_0=0 +y_0=0 +ellps=WGS84 +units=m +no_defs",
            center.y, center.x
        );
        Ok(LocalFrame {
            geographic: &self.geographic,
            local: Proj::from_proj_string(&definition)?,
        })
    }
}

pub struct LocalFrame<'a> {
    geographic: &'a Proj,
    local: Proj,
}

impl LocalFrame<'_> {
    pub fn to_local<G>(&self, geometry: &G) -> Result<G::Output>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| reproject(self.geographic, &self.local, c, true, false))
    }

    pub fn to_geographic<G>(&self, geometry: &G) -> Result<G::Output>
    where
        G: MapCoords<f64, f64>,
    {
        geometry.try_map_coords(|c| reproject(&self.local, self.geographic, c, false, true))
    }
}

// proj4rs works in radians for geographic frames, everything outside this module is in degrees
fn reproject(src: &Proj, dst: &Proj, c: Coord, src_latlong: bool, dst_latlong: bool) -> Result<Coord> {
    let mut point = if src_latlong {
        (c.x.to_radians(), c.y.to_radians())
    } else {
        (c.x, c.y)
    };

    transform(src, dst, &mut point)?;

    if dst_latlong {
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    } else {
        Ok(Coord {
            x: point.0,
            y: point.1,
        })
    }
}
