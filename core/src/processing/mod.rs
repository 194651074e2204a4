pub mod backend;
pub mod cube;
pub mod heatmap;
pub mod processor;

pub use backend::{
    AccelerationHandle, AcceleratedBackend, ExecutionPath, ExecutionPathCell, PathEvent,
    SoftwareBackend, SpectrumBackend,
};
pub use processor::{ProcessorConfig, RadarProcessor, RadarWorker};
