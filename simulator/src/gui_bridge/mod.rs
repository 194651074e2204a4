pub mod bridge;
pub mod model;

pub use bridge::StatusBridge;
pub use model::StatusModel;
