pub mod frames;

pub use self::frames::{Frames, LocalFrame};
