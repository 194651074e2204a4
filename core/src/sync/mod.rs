pub mod matcher;
pub mod synchronizer;

pub use matcher::{FrameMatcher, SyncConfig};
pub use synchronizer::Synchronizer;
