use ndarray::{Array3, Axis};
use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::collections::HashMap;
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse across frames.
///
/// Plans are cached per transform length so the three axis passes of a
/// cube reuse their twiddle tables from frame to frame.
pub struct FftHelper {
    planner: FftPlanner<f32>,
    plans: HashMap<usize, Arc<dyn Fft<f32>>>,
}

impl FftHelper {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn plan(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        Arc::clone(
            self.plans
                .entry(len)
                .or_insert_with(|| self.planner.plan_fft_forward(len)),
        )
    }

    /// In-place forward FFT along one axis of a complex cube.
    pub fn forward_axis(&mut self, cube: &mut Array3<Complex32>, axis: Axis) {
        let len = cube.len_of(axis);
        if len == 0 {
            return;
        }
        let fft = self.plan(len);
        let mut lane_buf = vec![Complex32::zero(); len];
        for mut lane in cube.lanes_mut(axis) {
            for (slot, value) in lane_buf.iter_mut().zip(lane.iter()) {
                *slot = *value;
            }
            fft.process(&mut lane_buf);
            for (value, slot) in lane.iter_mut().zip(lane_buf.iter()) {
                *value = *slot;
            }
        }
    }
}

impl Default for FftHelper {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotates one axis by half its length, moving the zero-frequency bin to
/// the center (numpy `fftshift` semantics, including odd lengths).
pub fn fftshift_axis(cube: &mut Array3<Complex32>, axis: Axis) {
    let len = cube.len_of(axis);
    let shift = len / 2;
    if shift == 0 {
        return;
    }
    let mut lane_buf = vec![Complex32::zero(); len];
    for mut lane in cube.lanes_mut(axis) {
        for (slot, value) in lane_buf.iter_mut().zip(lane.iter()) {
            *slot = *value;
        }
        for (i, value) in lane.iter_mut().enumerate() {
            *value = lane_buf[(i + len - shift) % len];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn impulse_transforms_to_flat_spectrum() {
        let mut cube = Array3::<Complex32>::zeros((1, 1, 8));
        cube[(0, 0, 0)] = Complex32::new(1.0, 0.0);
        let mut helper = FftHelper::new();
        helper.forward_axis(&mut cube, Axis(2));
        for i in 0..8 {
            assert!((cube[(0, 0, i)].norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn dc_lane_collects_the_sum() {
        let mut cube = Array3::<Complex32>::from_elem((1, 1, 4), Complex32::new(1.0, 0.0));
        let mut helper = FftHelper::new();
        helper.forward_axis(&mut cube, Axis(2));
        assert!((cube[(0, 0, 0)].re - 4.0).abs() < 1e-6);
        for i in 1..4 {
            assert!(cube[(0, 0, i)].norm() < 1e-6);
        }
    }

    #[test]
    fn fftshift_matches_numpy_for_even_and_odd_lengths() {
        let mut even = Array3::<Complex32>::zeros((1, 1, 4));
        for i in 0..4 {
            even[(0, 0, i)] = Complex32::new(i as f32, 0.0);
        }
        fftshift_axis(&mut even, Axis(2));
        let got: Vec<f32> = (0..4).map(|i| even[(0, 0, i)].re).collect();
        assert_eq!(got, vec![2.0, 3.0, 0.0, 1.0]);

        let mut odd = Array3::<Complex32>::zeros((1, 1, 5));
        for i in 0..5 {
            odd[(0, 0, i)] = Complex32::new(i as f32, 0.0);
        }
        fftshift_axis(&mut odd, Axis(2));
        let got: Vec<f32> = (0..5).map(|i| odd[(0, 0, i)].re).collect();
        assert_eq!(got, vec![3.0, 4.0, 0.0, 1.0, 2.0]);
    }
}
