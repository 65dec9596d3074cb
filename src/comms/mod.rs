pub mod channel;
pub mod messages;

pub use self::channel::ComputeComms;
