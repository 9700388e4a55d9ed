pub mod primitive;
pub mod registry;
pub mod walker;

pub use walker::{walk, LiveDataPacket, WalkSummary};
