use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor modalities feeding the capture pipeline.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Radar,
    Imaging,
    Landmarks,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Radar, Modality::Imaging, Modality::Landmarks];

    pub fn label(&self) -> &'static str {
        match self {
            Modality::Radar => "radar",
            Modality::Imaging => "imaging",
            Modality::Landmarks => "landmarks",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// ADC cube dimensions for one raw radar frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdcParams {
    pub chirps: usize,
    pub rx: usize,
    pub tx: usize,
    pub samples: usize,
    pub iq: usize,
    pub bytes_per_sample: usize,
}

impl AdcParams {
    /// Factory defaults for the TI IWR1843 front end.
    pub fn iwr1843() -> Self {
        Self {
            chirps: 255,
            rx: 4,
            tx: 2,
            samples: 256,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    /// Exact byte length of one raw frame. Any other length is malformed.
    pub fn frame_bytes(&self) -> usize {
        self.chirps * self.rx * self.tx * self.samples * self.iq * self.bytes_per_sample
    }

    /// Number of 16-bit values in one raw frame.
    pub fn frame_samples(&self) -> usize {
        self.chirps * self.rx * self.tx * self.samples * self.iq
    }

    /// Virtual array size used for the azimuth transform: first two TX
    /// across all RX antennas.
    pub fn virtual_antennas(&self) -> usize {
        self.tx.min(2) * self.rx
    }

    /// Rejects dimension sets the deinterleaver cannot express.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.iq != 2 {
            return Err(PipelineError::MalformedCube(format!(
                "expected 2 IQ components, got {}",
                self.iq
            )));
        }
        if self.bytes_per_sample != 2 {
            return Err(PipelineError::MalformedCube(format!(
                "expected 2 bytes per sample, got {}",
                self.bytes_per_sample
            )));
        }
        if self.samples % 2 != 0 {
            return Err(PipelineError::MalformedCube(format!(
                "range sample count {} must be even for paired IQ interleave",
                self.samples
            )));
        }
        if self.chirps == 0 || self.rx == 0 || self.tx == 0 || self.samples == 0 {
            return Err(PipelineError::MalformedCube(
                "zero-sized ADC dimension".into(),
            ));
        }
        Ok(())
    }
}

impl Default for AdcParams {
    fn default() -> Self {
        Self::iwr1843()
    }
}

/// Behavior of a bounded queue when the producer finds it full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Producer waits for space.
    Block,
    /// Oldest queued entry is evicted and counted as dropped.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => f.write_str("block"),
            OverflowPolicy::DropOldest => f.write_str("drop-oldest"),
        }
    }
}

/// Disposition of frames whose synchronization window expires without a
/// complete match. Fixed for the whole session, never per-frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedPolicy {
    /// Emit a partial frame set with the absent modalities flagged.
    EmitPartial,
    /// Drop the pending frame and count it.
    Drop,
}

impl fmt::Display for UnmatchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedPolicy::EmitPartial => f.write_str("emit-partial"),
            UnmatchedPolicy::Drop => f.write_str("drop"),
        }
    }
}

/// Common error type across the pipeline. None of these are fatal to the
/// process; `StorageWriteFailure` is fatal to the active session.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("malformed cube: {0}")]
    MalformedCube(String),
    #[error("packet sequence gap: expected {expected}, got {got}")]
    PacketSequenceGap { expected: u64, got: u64 },
    #[error("acceleration unavailable: {0}")]
    AccelerationUnavailable(String),
    #[error("processing timeout: {elapsed_ms:.1} ms exceeded the {budget_ms:.1} ms budget")]
    ProcessingTimeout { elapsed_ms: f64, budget_ms: f64 },
    #[error("sync timeout on {modality} frame {sequence}")]
    SyncTimeout { modality: Modality, sequence: u64 },
    #[error("storage write failure: {0}")]
    StorageWriteFailure(String),
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Outcome of polling a frame source.
#[derive(Debug)]
pub enum SourcePoll<F> {
    /// A new frame is available.
    Frame(F),
    /// Nothing ready yet; poll again shortly.
    Pending,
    /// The source will never deliver another frame.
    Exhausted,
}

/// Frames that can flow through modality queues.
pub trait CaptureFrame {
    fn sequence(&self) -> u64;
    /// Capture timestamp in seconds. Monotonic per source instance.
    fn timestamp(&self) -> f64;
}

/// Per-modality frame delivery boundary. The collaborator owning the device
/// implements this; `next_frame` must not block beyond a short timeout, and
/// returned timestamps must never regress. A malformed unit is reported as
/// an error here and never passed downstream.
pub trait FrameSource: Send {
    type Frame: CaptureFrame + Send;

    fn modality(&self) -> Modality;
    fn next_frame(&mut self) -> PipelineResult<SourcePoll<Self::Frame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iwr1843_frame_is_exactly_two_megabytes_ish() {
        let params = AdcParams::iwr1843();
        assert_eq!(params.frame_bytes(), 2_088_960);
        assert_eq!(params.frame_samples(), 1_044_480);
        assert_eq!(params.virtual_antennas(), 8);
        params.validate().unwrap();
    }

    #[test]
    fn odd_sample_count_is_rejected() {
        let params = AdcParams {
            samples: 255,
            ..AdcParams::iwr1843()
        };
        assert!(matches!(
            params.validate(),
            Err(PipelineError::MalformedCube(_))
        ));
    }

    #[test]
    fn modality_labels_are_stable() {
        assert_eq!(Modality::Radar.to_string(), "radar");
        assert_eq!(Modality::Landmarks.to_string(), "landmarks");
    }
}
