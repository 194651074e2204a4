pub mod synth;

pub use synth::{SynthImagingSource, SynthLandmarkSource, SynthRadarSource, SyntheticClock};
