pub mod backend;
pub mod comms;
pub mod consts;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod parameters;
pub mod project;
pub mod wire;

pub use backend::ComputeBackend;
pub use controller::{Controller, EditState, Session, ToolState};
pub use parameters::{GeometryParameters, SessionParameters, StaleResultPolicy};

pub use error::{Error, Result};
