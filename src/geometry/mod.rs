pub mod canonical;
pub mod merge;
pub mod normalize;
pub mod resolve;
pub mod shape;
pub mod simplify;

pub use self::canonical::CanonicalPolygon;
pub use self::merge::{merge, Merged};
pub use self::normalize::{flatten_shape, Normalizer};
pub use self::resolve::{resolve, unkink};
pub use self::shape::{DrawMode, Shape, ShapeGeometry, SourceTag};
pub use self::simplify::simplify_if_greater_than;
