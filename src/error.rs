use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// crate specific Error enum
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported geometry type: {0}. Shapes must be a Point, Line, Polygon, MultiPolygon or Circle")]
    UnsupportedGeometry(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ProjError(#[from] proj4rs::errors::Error),
    #[error(transparent)]
    GeoJsonError(#[from] geojson::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error("Could not parse WKT: {0}")]
    WktError(String),
    #[error("Could not split the polygon into simple parts: {0}")]
    UnkinkError(String),
    #[error("The union of two polygons failed")]
    UnionFailed,
    #[error("The geometry has no area")]
    EmptyGeometry,
    #[error("Cannot {gesture} while {from}")]
    InvalidTransition {
        from: crate::controller::EditState,
        gesture: &'static str,
    },
    #[error("The {0} tool is not enabled")]
    ToolDisabled(&'static str),
    #[error("{0} cannot be used as a tracking id")]
    InvalidTrackingId(i64),
    #[error("No shape with tracking id {0}")]
    UnknownShape(i64),
    #[error("The compute unit has hung up")]
    ComputeUnitDisconnected,
}
