use geo::GeodesicArea;

use crate::{consts::SQM_PER_ACRE, geometry::CanonicalPolygon, project::Frames};

/// Geodesic area of a working frame polygon in acres, rounded to two decimals.
/// Anything that cannot be measured counts as zero.
pub fn acres(frames: &Frames, canonical: &CanonicalPolygon) -> f64 {
    if !canonical.is_finite() {
        return 0.;
    }
    let square_meters = match frames.to_geographic(canonical) {
        Ok(CanonicalPolygon::Polygon(p)) => p.geodesic_area_unsigned(),
        Ok(CanonicalPolygon::MultiPolygon(mp)) => mp.geodesic_area_unsigned(),
        Err(e) => {
            log::warn!("Could not measure a polygon: {e}");
            return 0.;
        }
    };

    let acres = (square_meters / SQM_PER_ACRE * 100.).round() / 100.;
    if acres.is_finite() {
        acres
    } else {
        0.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    #[test]
    fn a_square_furlong_is_ten_acres() {
        let frames = Frames::new(4326).unwrap();

        // 201.168 m on each side near the equator, in degrees
        let dx = 201.168 / 111_319.49;
        let dy = 201.168 / 110_574.;
        let furlong = Polygon::new(
            LineString::from(vec![(0., 0.), (dx, 0.), (dx, dy), (0., dy)]),
            vec![],
        );

        let area = acres(&frames, &CanonicalPolygon::Polygon(furlong));
        assert!((area - 10.).abs() < 0.1, "{area}");
    }

    #[test]
    fn broken_polygons_measure_zero() {
        let frames = Frames::new(4326).unwrap();
        let broken = Polygon::new(
            LineString::from(vec![(f64::NAN, 0.), (1., 0.), (1., 1.)]),
            vec![],
        );
        assert_eq!(acres(&frames, &CanonicalPolygon::Polygon(broken)), 0.);
    }
}
