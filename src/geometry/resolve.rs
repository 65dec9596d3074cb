use geo::{
    algorithm::line_intersection::{line_intersection, LineIntersection},
    Area, BooleanOps, Coord, Line, LineString, MultiPolygon, Polygon,
};
use std::cmp::Reverse;

use super::{merge::checked_op, CanonicalPolygon};
use crate::{Error, Result};

// upper bound on splits for pathological rings
const MAX_SPLITS: usize = 10_000;

/// Repairs a self-intersecting polygon into a valid polygon or multi-polygon.
/// Multi-polygons are returned as they are, only single polygons are repaired.
/// Never fails: if the polygon cannot be split the original is returned.
pub fn resolve(polygon: &CanonicalPolygon) -> Vec<CanonicalPolygon> {
    let p = match polygon {
        CanonicalPolygon::MultiPolygon(_) => return vec![polygon.clone()],
        CanonicalPolygon::Polygon(p) => p,
    };

    let parts = match unkink(p) {
        Ok(parts) => parts,
        Err(e) => {
            log::warn!("Leaving a self-intersecting polygon unrepaired: {e}");
            return vec![polygon.clone()];
        }
    };

    // already simple
    if parts.len() == 1 && p.interiors().is_empty() {
        return vec![polygon.clone()];
    }

    let mut parts: Vec<CanonicalPolygon> = parts.into_iter().map(CanonicalPolygon::Polygon).collect();
    order_by_containment(&mut parts);

    let mut parts = parts.into_iter();
    let Some(mut result) = parts.next() else {
        return vec![polygon.clone()];
    };
    let mut backup = result.clone();

    for part in parts {
        let step = if !result.is_multi() && part.is_within(&result) {
            checked_op(&result, &part, |a, b| a.difference(b))
        } else {
            checked_op(&result, &part, |a, b| a.union(b))
        };

        match step.ok().and_then(CanonicalPolygon::from_multi) {
            Some(next) => {
                result = next;
                backup = result.clone();
            }
            None => result = backup.clone(),
        }
    }

    // holes of the original are cut out of the repaired outline
    if !p.interiors().is_empty() {
        let holes = CanonicalPolygon::MultiPolygon(MultiPolygon::new(
            p.interiors()
                .iter()
                .map(|ring| Polygon::new(ring.clone(), vec![]))
                .collect(),
        ));
        if let Some(cut) = checked_op(&result, &holes, |a, b| a.difference(b))
            .ok()
            .and_then(CanonicalPolygon::from_multi)
        {
            result = cut;
        }
    }

    vec![result]
}

/// Parts contained in another part sort first, parts that are not comparable keep their order.
/// Multi-polygon parts are never ranked against anything.
fn order_by_containment(parts: &mut [CanonicalPolygon]) {
    let depths: Vec<usize> = parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if part.is_multi() {
                return 0;
            }
            parts
                .iter()
                .enumerate()
                .filter(|(j, other)| *j != i && !other.is_multi() && part.is_within(other))
                .count()
        })
        .collect();

    let mut ranked: Vec<(usize, CanonicalPolygon)> = depths.into_iter().zip(parts.iter().cloned()).collect();
    // stable, so equal ranks keep their relative order
    ranked.sort_by_key(|(depth, _)| Reverse(*depth));

    for (slot, (_, part)) in parts.iter_mut().zip(ranked) {
        *slot = part;
    }
}

/// Splits the outer ring of a polygon into simple rings at every self-intersection.
/// A simple polygon comes back as a single ring. Interiors are not split.
pub fn unkink(polygon: &Polygon) -> Result<Vec<Polygon>> {
    let ring = open_ring(polygon.exterior());
    if ring.len() < 3 {
        return Err(Error::UnkinkError("fewer than three distinct vertices".to_string()));
    }

    let mut pending = vec![ring];
    let mut simple = vec![];
    let mut splits = 0;

    while let Some(ring) = pending.pop() {
        match first_crossing(&ring)? {
            None => simple.push(ring),
            Some((i, j, crossing)) => {
                splits += 1;
                if splits > MAX_SPLITS {
                    return Err(Error::UnkinkError("too many self-intersections".to_string()));
                }

                // the loop between the two crossing edges, and what is left without it
                let mut inner = vec![crossing];
                inner.extend_from_slice(&ring[i + 1..=j]);

                let mut outer = ring[..=i].to_vec();
                outer.push(crossing);
                outer.extend_from_slice(&ring[j + 1..]);

                for part in [inner, outer] {
                    let part = dedup_ring(part);
                    if part.len() >= 3 {
                        pending.push(part);
                    }
                }
            }
        }
    }

    let polygons: Vec<Polygon> = simple
        .into_iter()
        .map(|ring| Polygon::new(LineString::new(ring), vec![]))
        .filter(|p| p.unsigned_area() > 0.)
        .collect();

    if polygons.is_empty() {
        return Err(Error::UnkinkError("the polygon has no area".to_string()));
    }
    Ok(polygons)
}

// the first pair of non-adjacent edges that cross, as edge start indices and the crossing point
fn first_crossing(ring: &[Coord]) -> Result<Option<(usize, usize, Coord)>> {
    let n = ring.len();
    let edge = |k: usize| Line::new(ring[k], ring[(k + 1) % n]);

    for i in 0..n {
        for j in (i + 2)..n {
            // the first and last edges share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            match line_intersection(edge(i), edge(j)) {
                None => (),
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    return Ok(Some((i, j, intersection)));
                }
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(Error::UnkinkError("overlapping edges".to_string()));
                }
            }
        }
    }
    Ok(None)
}

fn open_ring(ring: &LineString) -> Vec<Coord> {
    dedup_ring(ring.0.clone())
}

// drops repeated consecutive vertices and the closing vertex
fn dedup_ring(mut ring: Vec<Coord>) -> Vec<Coord> {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Contains, Point};

    fn bowtie() -> Polygon {
        // crosses itself at (5, 5)
        polygon![(x: 0., y: 0.), (x: 10., y: 10.), (x: 10., y: 0.), (x: 0., y: 10.)]
    }

    #[test]
    fn simple_polygons_come_back_unchanged() {
        let square = CanonicalPolygon::Polygon(
            polygon![(x: 0., y: 0.), (x: 4., y: 0.), (x: 4., y: 4.), (x: 0., y: 4.)],
        );
        let resolved = resolve(&square);
        assert_eq!(resolved, vec![square]);
    }

    #[test]
    fn multi_polygons_are_not_repaired() {
        let multi = CanonicalPolygon::MultiPolygon(MultiPolygon::new(vec![bowtie()]));
        assert_eq!(resolve(&multi), vec![multi]);
    }

    #[test]
    fn bowtie_splits_into_two_triangles() {
        let parts = unkink(&bowtie()).unwrap();
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!((part.unsigned_area() - 25.).abs() < 1e-9);
        }
    }

    #[test]
    fn bowtie_resolves_to_both_lobes() {
        let resolved = resolve(&CanonicalPolygon::Polygon(bowtie()));
        assert_eq!(resolved.len(), 1);

        // the lobes only touch at the crossing, nothing is gained or lost
        let region = &resolved[0];
        assert!((region.area() - 50.).abs() < 1e-4);

        let multi = region.to_multi();
        // left and right lobes, the top and bottom wedges stay outside
        assert!(multi.contains(&Point::new(2., 5.)));
        assert!(multi.contains(&Point::new(8., 5.)));
        assert!(!multi.contains(&Point::new(5., 2.)));
        assert!(!multi.contains(&Point::new(5., 8.)));
    }

    #[test]
    fn strip_with_three_crossings_keeps_all_area() {
        // a strip twisted three times: two end triangles and two diamonds
        let twisted = polygon![
            (x: 0., y: 0.),
            (x: 10., y: 2.),
            (x: 20., y: 0.),
            (x: 30., y: 2.),
            (x: 30., y: 0.),
            (x: 20., y: 2.),
            (x: 10., y: 0.),
            (x: 0., y: 2.),
        ];
        let parts = unkink(&twisted).unwrap();
        assert_eq!(parts.len(), 4);

        let total: f64 = parts.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - 30.).abs() < 1e-9);

        let resolved = resolve(&CanonicalPolygon::Polygon(twisted));
        assert_eq!(resolved.len(), 1);
        assert!((resolved[0].area() - 30.).abs() < 1e-4);
    }

    #[test]
    fn degenerate_rings_fail_open() {
        let sliver = CanonicalPolygon::Polygon(polygon![(x: 0., y: 0.), (x: 1., y: 1.)]);
        assert_eq!(resolve(&sliver), vec![sliver]);
    }

    #[test]
    fn contained_parts_rank_first() {
        let outer = CanonicalPolygon::Polygon(
            polygon![(x: 0., y: 0.), (x: 10., y: 0.), (x: 10., y: 10.), (x: 0., y: 10.)],
        );
        let inner = CanonicalPolygon::Polygon(
            polygon![(x: 2., y: 2.), (x: 4., y: 2.), (x: 4., y: 4.), (x: 2., y: 4.)],
        );
        let apart = CanonicalPolygon::Polygon(
            polygon![(x: 20., y: 0.), (x: 21., y: 0.), (x: 21., y: 1.)],
        );

        let mut parts = vec![outer.clone(), apart.clone(), inner.clone()];
        order_by_containment(&mut parts);
        assert_eq!(parts, vec![inner, outer, apart]);
    }
}
