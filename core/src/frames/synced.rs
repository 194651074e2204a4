use crate::frames::optical::{ImagingFrame, LandmarkFrame};
use crate::frames::radar::{RangeAzimuthHeatmap, RangeDopplerHeatmap, RawAdcFrame};
use crate::prelude::{CaptureFrame, Modality};
use std::collections::BTreeMap;

/// Heatmap pair emitted by the radar processor, optionally carrying the
/// originating cube for raw persistence.
#[derive(Debug, Clone)]
pub struct RadarFrame {
    pub range_doppler: RangeDopplerHeatmap,
    pub range_azimuth: RangeAzimuthHeatmap,
    pub raw: Option<RawAdcFrame>,
    pub sequence: u64,
    pub timestamp: f64,
}

/// Uniform payload for the modality queues feeding the synchronizer.
#[derive(Debug, Clone)]
pub enum ModalityFrame {
    Radar(RadarFrame),
    Imaging(ImagingFrame),
    Landmarks(LandmarkFrame),
}

impl ModalityFrame {
    pub fn modality(&self) -> Modality {
        match self {
            ModalityFrame::Radar(_) => Modality::Radar,
            ModalityFrame::Imaging(_) => Modality::Imaging,
            ModalityFrame::Landmarks(_) => Modality::Landmarks,
        }
    }
}

impl CaptureFrame for ModalityFrame {
    fn sequence(&self) -> u64 {
        match self {
            ModalityFrame::Radar(f) => f.sequence,
            ModalityFrame::Imaging(f) => f.sequence,
            ModalityFrame::Landmarks(f) => f.sequence,
        }
    }

    fn timestamp(&self) -> f64 {
        match self {
            ModalityFrame::Radar(f) => f.timestamp,
            ModalityFrame::Imaging(f) => f.timestamp,
            ModalityFrame::Landmarks(f) => f.timestamp,
        }
    }
}

impl From<ImagingFrame> for ModalityFrame {
    fn from(frame: ImagingFrame) -> Self {
        ModalityFrame::Imaging(frame)
    }
}

impl From<LandmarkFrame> for ModalityFrame {
    fn from(frame: LandmarkFrame) -> Self {
        ModalityFrame::Landmarks(frame)
    }
}

impl From<RadarFrame> for ModalityFrame {
    fn from(frame: RadarFrame) -> Self {
        ModalityFrame::Radar(frame)
    }
}

/// One matched, jointly-timestamped bundle of per-modality frames.
///
/// The reference timestamp is the earliest contributing timestamp and the
/// offset metric is the largest pairwise gap achieved by the match.
#[derive(Debug, Clone)]
pub struct SyncedFrameSet {
    pub reference_timestamp: f64,
    pub max_offset_ms: f64,
    pub frames: BTreeMap<Modality, ModalityFrame>,
    pub missing: Vec<Modality>,
}

impl SyncedFrameSet {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn timestamp_of(&self, modality: Modality) -> Option<f64> {
        self.frames.get(&modality).map(|f| f.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::optical::POSE_LANDMARK_COUNT;
    use crate::frames::Landmark;

    #[test]
    fn modality_frame_reports_inner_identity() {
        let landmarks = LandmarkFrame::new(
            vec![
                Landmark {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    confidence: 1.0
                };
                POSE_LANDMARK_COUNT
            ],
            9,
            2.5,
        )
        .unwrap();
        let frame = ModalityFrame::from(landmarks);
        assert_eq!(frame.modality(), Modality::Landmarks);
        assert_eq!(frame.sequence(), 9);
        assert_eq!(frame.timestamp(), 2.5);
    }

    #[test]
    fn partial_flag_follows_missing_list() {
        let set = SyncedFrameSet {
            reference_timestamp: 1.0,
            max_offset_ms: 0.0,
            frames: BTreeMap::new(),
            missing: vec![Modality::Imaging],
        };
        assert!(set.is_partial());
    }
}
