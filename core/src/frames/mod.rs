pub mod optical;
pub mod radar;
pub mod synced;

pub use optical::{ImagingFrame, Landmark, LandmarkFrame, POSE_LANDMARK_COUNT};
pub use radar::{RangeAzimuthHeatmap, RangeDopplerHeatmap, RawAdcFrame};
pub use synced::{ModalityFrame, RadarFrame, SyncedFrameSet};
