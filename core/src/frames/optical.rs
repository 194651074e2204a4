use crate::prelude::{CaptureFrame, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Fixed cardinality of one pose-landmark frame (full-body pose model).
pub const POSE_LANDMARK_COUNT: usize = 33;

/// One pose landmark in image coordinates with a detection confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub confidence: f32,
}

/// Ordered landmark tuple set extracted from one imaging frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub points: Vec<Landmark>,
    pub sequence: u64,
    pub timestamp: f64,
}

impl LandmarkFrame {
    /// Rejects any cardinality other than [`POSE_LANDMARK_COUNT`]; partial
    /// detections are a malformed unit at this boundary.
    pub fn new(points: Vec<Landmark>, sequence: u64, timestamp: f64) -> PipelineResult<Self> {
        if points.len() != POSE_LANDMARK_COUNT {
            return Err(PipelineError::MalformedCube(format!(
                "landmark frame: expected {} points, got {}",
                POSE_LANDMARK_COUNT,
                points.len()
            )));
        }
        Ok(Self {
            points,
            sequence,
            timestamp,
        })
    }
}

impl CaptureFrame for LandmarkFrame {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// One captured camera frame with an optional landmark annotation.
#[derive(Debug, Clone)]
pub struct ImagingFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
    pub sequence: u64,
    pub timestamp: f64,
    pub landmarks: Option<LandmarkFrame>,
}

impl ImagingFrame {
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        pixels: Vec<u8>,
        sequence: u64,
        timestamp: f64,
    ) -> PipelineResult<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(PipelineError::MalformedCube(format!(
                "imaging frame: expected {} bytes for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
            sequence,
            timestamp,
            landmarks: None,
        })
    }

    pub fn with_landmarks(mut self, landmarks: LandmarkFrame) -> Self {
        self.landmarks = Some(landmarks);
        self
    }
}

impl CaptureFrame for ImagingFrame {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(v: f32) -> Landmark {
        Landmark {
            x: v,
            y: v,
            z: 0.0,
            confidence: 0.9,
        }
    }

    #[test]
    fn landmark_frame_enforces_cardinality() {
        let points = vec![point(1.0); POSE_LANDMARK_COUNT];
        assert!(LandmarkFrame::new(points, 0, 0.0).is_ok());
        let short = vec![point(1.0); POSE_LANDMARK_COUNT - 1];
        assert!(matches!(
            LandmarkFrame::new(short, 0, 0.0),
            Err(PipelineError::MalformedCube(_))
        ));
    }

    #[test]
    fn imaging_frame_rejects_mismatched_buffer() {
        assert!(ImagingFrame::new(4, 4, 3, vec![0; 48], 0, 0.0).is_ok());
        assert!(matches!(
            ImagingFrame::new(4, 4, 3, vec![0; 47], 0, 0.0),
            Err(PipelineError::MalformedCube(_))
        ));
    }

    #[test]
    fn imaging_frame_carries_optional_annotation() {
        let annotation =
            LandmarkFrame::new(vec![point(2.0); POSE_LANDMARK_COUNT], 5, 1.5).unwrap();
        let frame = ImagingFrame::new(4, 4, 3, vec![0; 48], 5, 1.5)
            .unwrap()
            .with_landmarks(annotation);
        assert_eq!(frame.landmarks.as_ref().map(|l| l.points.len()), Some(33));
    }
}
