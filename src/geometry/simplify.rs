use geo::{Area, MultiPolygon, Polygon, Simplify};

use super::CanonicalPolygon;
use crate::consts::SIMPLIFY_TOLERANCE;

// halvings of the tolerance tried before giving up on a collapsing ring
const MAX_TOLERANCE_HALVINGS: usize = 8;

/// Simplifies `geometry` in place if its vertex count reaches `limit`.
/// Runs on geographic coordinates, the tolerance is in degrees.
/// Returns whether the geometry was touched.
pub fn simplify_if_greater_than(limit: usize, geometry: &mut CanonicalPolygon) -> bool {
    if geometry.vertex_count() < limit {
        return false;
    }

    let mut tolerance = SIMPLIFY_TOLERANCE;
    for _ in 0..MAX_TOLERANCE_HALVINGS {
        let simplified = match geometry {
            CanonicalPolygon::Polygon(p) => CanonicalPolygon::Polygon(p.simplify(tolerance)),
            CanonicalPolygon::MultiPolygon(mp) => {
                CanonicalPolygon::MultiPolygon(mp.simplify(tolerance))
            }
        };

        // a thin corridor can collapse to a sliver, retry finer instead of losing the shape
        if is_valid_after_simplify(&simplified) {
            *geometry = simplified;
            return true;
        }
        tolerance /= 2.;
    }

    log::warn!(
        "Could not simplify a geometry of {} vertices without collapsing it, keeping it as is",
        geometry.vertex_count()
    );
    false
}

fn is_valid_after_simplify(geometry: &CanonicalPolygon) -> bool {
    match geometry {
        CanonicalPolygon::Polygon(p) => ring_survived(p),
        CanonicalPolygon::MultiPolygon(MultiPolygon(polygons)) => {
            !polygons.is_empty() && polygons.iter().all(ring_survived)
        }
    }
}

fn ring_survived(polygon: &Polygon) -> bool {
    polygon.exterior().0.len() >= 4 && polygon.unsigned_area() > 0.
}
