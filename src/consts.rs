// international foot
pub const FEET_TO_METERS: f64 = 0.3048;
pub const SQM_PER_ACRE: f64 = 4046.85642;

pub const WORKING_EPSG: u16 = 3857; // web mercator, the frame the map widget draws in
pub const GEOGRAPHIC_EPSG: u16 = 4326;

pub const CIRCLE_VERTICES: usize = 32;

pub const DEFAULT_BUFFER_FEET: f64 = 50.;

pub const SIMPLIFY_LIMIT: usize = 1000;
pub const DISPLAY_SIMPLIFY_LIMIT: usize = 500;
pub const SIMPLIFY_TOLERANCE: f64 = 0.001; // degrees, simplification runs in the geographic frame

// decimal places kept when truncating geographic coordinates before buffering
pub const COORD_PRECISION: i32 = 6;

// outward margin for the retried union of two degenerate operands, in working frame units
pub const MERGE_DELTA: f64 = 0.1;

// the compute side never assigns ids, this marks "not a shape id"
pub const UNASSIGNED_ID: i64 = -1;

pub const ITEM_DELIVERY_DELAY_MS: u64 = 5;

/// Converts a length in feet to meters.
pub fn feet_to_meters(feet: f64) -> f64 {
    feet * FEET_TO_METERS
}
