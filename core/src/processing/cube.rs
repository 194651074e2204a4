use crate::frames::RawAdcFrame;
use crate::prelude::{PipelineError, PipelineResult};
use ndarray::{s, Array3};
use num_complex::Complex32;

/// Deinterleaves a raw int16 cube into complex samples over
/// (chirp, virtual antenna, range sample).
///
/// The capture card emits 16-bit values in interleaved pairs: two in-phase
/// samples followed by their two quadrature counterparts. The virtual array
/// spans the first two TX antennas across every RX antenna.
pub fn complex_cube(frame: &RawAdcFrame) -> PipelineResult<Array3<Complex32>> {
    let p = &frame.params;
    p.validate()?;
    if frame.samples.len() != p.frame_samples() {
        return Err(PipelineError::MalformedCube(format!(
            "expected {} int16 values, got {}",
            p.frame_samples(),
            frame.samples.len()
        )));
    }

    let virt = p.virtual_antennas();
    let tx_used = p.tx.min(2);
    let groups = p.samples / 2;
    let mut cube = Array3::<Complex32>::zeros((p.chirps, virt, p.samples));

    for c in 0..p.chirps {
        for t in 0..tx_used {
            for r in 0..p.rx {
                let v = t * p.rx + r;
                for g in 0..groups {
                    let base = (((c * p.tx + t) * p.rx + r) * groups + g) * 4;
                    let i0 = frame.samples[base] as f32;
                    let i1 = frame.samples[base + 1] as f32;
                    let q0 = frame.samples[base + 2] as f32;
                    let q1 = frame.samples[base + 3] as f32;
                    cube[(c, v, 2 * g)] = Complex32::new(i0, q0);
                    cube[(c, v, 2 * g + 1)] = Complex32::new(i1, q1);
                }
            }
        }
    }

    Ok(cube)
}

/// Zero-pads the antenna axis up to `angle_bins` for the azimuth transform.
pub fn pad_azimuth(cube: &Array3<Complex32>, angle_bins: usize) -> PipelineResult<Array3<Complex32>> {
    let (chirps, virt, samples) = cube.dim();
    if angle_bins < virt {
        return Err(PipelineError::MalformedCube(format!(
            "angle bin count {} smaller than virtual array {}",
            angle_bins, virt
        )));
    }
    let mut padded = Array3::<Complex32>::zeros((chirps, angle_bins, samples));
    padded.slice_mut(s![.., ..virt, ..]).assign(cube);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::AdcParams;

    fn tiny_params() -> AdcParams {
        AdcParams {
            chirps: 1,
            rx: 1,
            tx: 1,
            samples: 4,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    #[test]
    fn deinterleave_pairs_i_then_q() {
        // One chirp, one antenna, four range samples: [I0 I1 Q0 Q1 I2 I3 Q2 Q3]
        let frame = RawAdcFrame::from_samples(tiny_params(), vec![1, 2, 10, 20, 3, 4, 30, 40], 0, 0.0)
            .unwrap();
        let cube = complex_cube(&frame).unwrap();
        assert_eq!(cube.dim(), (1, 1, 4));
        assert_eq!(cube[(0, 0, 0)], Complex32::new(1.0, 10.0));
        assert_eq!(cube[(0, 0, 1)], Complex32::new(2.0, 20.0));
        assert_eq!(cube[(0, 0, 2)], Complex32::new(3.0, 30.0));
        assert_eq!(cube[(0, 0, 3)], Complex32::new(4.0, 40.0));
    }

    #[test]
    fn virtual_array_uses_first_two_tx_only() {
        let params = AdcParams {
            chirps: 1,
            rx: 2,
            tx: 3,
            samples: 2,
            iq: 2,
            bytes_per_sample: 2,
        };
        let total = params.frame_samples();
        let values: Vec<i16> = (0..total as i16).collect();
        let frame = RawAdcFrame::from_samples(params, values, 0, 0.0).unwrap();
        let cube = complex_cube(&frame).unwrap();
        // 3 TX in the raw layout, but only 2x2 = 4 virtual antennas kept.
        assert_eq!(cube.dim(), (1, 4, 2));
    }

    #[test]
    fn pad_azimuth_preserves_data_and_rejects_shrink() {
        let frame =
            RawAdcFrame::from_samples(tiny_params(), vec![1, 2, 10, 20, 3, 4, 30, 40], 0, 0.0)
                .unwrap();
        let cube = complex_cube(&frame).unwrap();
        let padded = pad_azimuth(&cube, 8).unwrap();
        assert_eq!(padded.dim(), (1, 8, 4));
        assert_eq!(padded[(0, 0, 0)], cube[(0, 0, 0)]);
        assert_eq!(padded[(0, 5, 0)], Complex32::new(0.0, 0.0));
        assert!(pad_azimuth(&padded, 4).is_err());
    }
}
