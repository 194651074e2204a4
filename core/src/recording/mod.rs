pub mod layout;
pub mod recorder;
pub mod session;
pub mod writer;

pub use layout::SessionLayout;
pub use recorder::{CaptureDescriptor, RecorderConfig, SessionRecorder};
pub use session::{unix_now, RecorderState, Session, SessionSummary};
pub use writer::{HeatmapRecord, ImagingRecord, PersistenceWorker, WriteTask};
