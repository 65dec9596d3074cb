use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::consts;

/// Parameters steering normalization, repair and merging.
/// Shared by the controller and the compute unit so both derive the same canonical polygons.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParameters {
    pub default_buffer_feet: f64,

    // skip self-intersection repair / skip merging the parts of a single shape
    pub skip_resolve: bool,
    pub skip_merge: bool,
    // bulk imports are trusted to be simple already
    pub upload_skip_resolve: bool,

    // vertex counts at which buffered shapes / the displayed region get simplified
    pub simplify_limit: usize,
    pub display_simplify_limit: usize,

    pub circle_vertices: usize,
    pub working_epsg: u16,
}

impl Default for GeometryParameters {
    fn default() -> Self {
        Self {
            default_buffer_feet: consts::DEFAULT_BUFFER_FEET,
            skip_resolve: false,
            skip_merge: false,
            upload_skip_resolve: true,
            simplify_limit: consts::SIMPLIFY_LIMIT,
            display_simplify_limit: consts::DISPLAY_SIMPLIFY_LIMIT,
            circle_vertices: consts::CIRCLE_VERTICES,
            working_epsg: consts::WORKING_EPSG,
        }
    }
}

/// What the controller does with a merged region that was computed
/// from an older shape set than one it has already seen or requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleResultPolicy {
    #[default]
    DropStale,
    LastWriteWins,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParameters {
    pub geometry: GeometryParameters,

    // pause between per-item results handed to the host
    pub item_delivery_delay: Duration,
    pub stale_results: StaleResultPolicy,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self {
            geometry: Default::default(),
            item_delivery_delay: Duration::from_millis(consts::ITEM_DELIVERY_DELAY_MS),
            stale_results: Default::default(),
        }
    }
}
