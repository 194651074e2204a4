use crate::prelude::{AdcParams, CaptureFrame, PipelineError, PipelineResult};
use ndarray::Array2;

/// One raw ADC cube captured from the radar front end.
///
/// Byte length must equal `params.frame_bytes()` exactly; the constructors
/// reject anything else rather than truncating or padding.
#[derive(Debug, Clone)]
pub struct RawAdcFrame {
    pub params: AdcParams,
    pub samples: Vec<i16>,
    pub sequence: u64,
    pub timestamp: f64,
}

impl RawAdcFrame {
    pub fn from_samples(
        params: AdcParams,
        samples: Vec<i16>,
        sequence: u64,
        timestamp: f64,
    ) -> PipelineResult<Self> {
        let expected = params.frame_samples();
        if samples.len() != expected {
            return Err(PipelineError::MalformedCube(format!(
                "expected {} int16 values ({} bytes), got {}",
                expected,
                params.frame_bytes(),
                samples.len()
            )));
        }
        Ok(Self {
            params,
            samples,
            sequence,
            timestamp,
        })
    }

    pub fn from_bytes(
        params: AdcParams,
        bytes: &[u8],
        sequence: u64,
        timestamp: f64,
    ) -> PipelineResult<Self> {
        if bytes.len() != params.frame_bytes() {
            return Err(PipelineError::MalformedCube(format!(
                "expected {} bytes, got {}",
                params.frame_bytes(),
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::from_samples(params, samples, sequence, timestamp)
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * self.params.bytes_per_sample
    }

    /// Fixed-length little-endian record for raw persistence.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for value in &self.samples {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

impl CaptureFrame for RawAdcFrame {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// 2-D magnitude map over range and doppler bins, normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct RangeDopplerHeatmap {
    pub bins: Array2<f32>,
    pub sequence: u64,
    pub timestamp: f64,
}

/// 2-D magnitude map over range and azimuth bins, normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct RangeAzimuthHeatmap {
    pub bins: Array2<f32>,
    pub sequence: u64,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_params() -> AdcParams {
        AdcParams {
            chirps: 2,
            rx: 2,
            tx: 2,
            samples: 4,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    #[test]
    fn frame_round_trips_through_bytes() {
        let params = tiny_params();
        let values: Vec<i16> = (0..params.frame_samples() as i16).collect();
        let frame = RawAdcFrame::from_samples(params, values.clone(), 7, 1.25).unwrap();
        let bytes = frame.to_le_bytes();
        assert_eq!(bytes.len(), params.frame_bytes());
        let back = RawAdcFrame::from_bytes(params, &bytes, 7, 1.25).unwrap();
        assert_eq!(back.samples, values);
    }

    #[test]
    fn wrong_length_is_malformed() {
        let params = AdcParams::iwr1843();
        let short = vec![0u8; params.frame_bytes() - 1];
        assert!(matches!(
            RawAdcFrame::from_bytes(params, &short, 0, 0.0),
            Err(PipelineError::MalformedCube(_))
        ));
        let long = vec![0i16; params.frame_samples() + 4];
        assert!(matches!(
            RawAdcFrame::from_samples(params, long, 0, 0.0),
            Err(PipelineError::MalformedCube(_))
        ));
    }

    #[test]
    fn iwr1843_frame_byte_length_matches_documented_constant() {
        let params = AdcParams::iwr1843();
        let frame =
            RawAdcFrame::from_samples(params, vec![0i16; params.frame_samples()], 1, 0.1).unwrap();
        assert_eq!(frame.byte_len(), 2_088_960);
    }
}
