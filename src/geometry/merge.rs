use geo::{BooleanOps, Buffer, MultiPolygon};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{resolve, CanonicalPolygon};
use crate::{consts::MERGE_DELTA, Error, Result};

/// The outcome of a merge. `dropped` holds the input indices that could not be
/// unioned even after the buffered retry and are missing from `region`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Merged {
    pub region: Option<CanonicalPolygon>,
    pub dropped: Vec<usize>,
}

/// Folds an ordered list of polygons into one region.
/// Never fails, an item that cannot be unioned is left out and reported in `dropped`.
pub fn merge(polygons: Vec<CanonicalPolygon>, skip_resolve: bool) -> Merged {
    if polygons.len() < 2 {
        return Merged {
            region: polygons.into_iter().next(),
            dropped: vec![],
        };
    }

    let polygons: Vec<CanonicalPolygon> = if skip_resolve {
        polygons
    } else {
        polygons
            .into_iter()
            .map(|p| resolve(&p).pop().unwrap_or(p))
            .collect()
    };

    let mut dropped = vec![];
    let mut items = polygons.into_iter().enumerate();
    let mut acc = None;

    // the accumulator starts at the first item that is usable at all
    for (i, item) in items.by_ref() {
        if item.is_finite() {
            acc = Some(item);
            break;
        }
        log::warn!("Dropping polygon {i} from the merge, it has non-finite coordinates");
        dropped.push(i);
    }
    let Some(mut acc) = acc else {
        return Merged { region: None, dropped };
    };

    for (i, item) in items {
        match union_or_retry(&acc, &item, |a, b| a.union(b)) {
            Some(next) => acc = next,
            None => {
                log::warn!("Dropping polygon {i} from the merge, the union failed twice");
                dropped.push(i);
            }
        }
    }

    Merged {
        region: Some(acc),
        dropped,
    }
}

fn union_or_retry(
    acc: &CanonicalPolygon,
    item: &CanonicalPolygon,
    union: impl Fn(&MultiPolygon, &MultiPolygon) -> MultiPolygon,
) -> Option<CanonicalPolygon> {
    if let Some(united) = checked_op(acc, item, &union)
        .ok()
        .and_then(CanonicalPolygon::from_multi)
    {
        return Some(united);
    }

    log::debug!("Union failed, retrying with operands grown by {MERGE_DELTA}");
    let grown_acc = grow(acc)?;
    let grown_item = grow(item)?;
    checked_op(&grown_acc, &grown_item, &union)
        .ok()
        .and_then(CanonicalPolygon::from_multi)
}

fn grow(polygon: &CanonicalPolygon) -> Option<CanonicalPolygon> {
    if !polygon.is_finite() {
        return None;
    }
    let multi = polygon.to_multi();
    catch_unwind(AssertUnwindSafe(|| multi.buffer(MERGE_DELTA)))
        .ok()
        .and_then(CanonicalPolygon::from_multi)
}

/// Runs a boolean operation on two polygons, turning degenerate input,
/// non-finite output and panics inside the kernel into `UnionFailed`.
pub(crate) fn checked_op(
    a: &CanonicalPolygon,
    b: &CanonicalPolygon,
    op: impl FnOnce(&MultiPolygon, &MultiPolygon) -> MultiPolygon,
) -> Result<MultiPolygon> {
    if !a.is_finite() || !b.is_finite() {
        return Err(Error::UnionFailed);
    }
    let (a, b) = (a.to_multi(), b.to_multi());

    let out = catch_unwind(AssertUnwindSafe(|| op(&a, &b))).map_err(|_| Error::UnionFailed)?;

    let finite = CanonicalPolygon::MultiPolygon(out);
    if !finite.is_finite() {
        return Err(Error::UnionFailed);
    }
    Ok(finite.to_multi())
}
