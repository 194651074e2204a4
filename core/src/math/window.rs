use ndarray::Array3;
use num_complex::Complex32;
use std::f32::consts::PI;

/// Symmetric Hann window of the given length.
pub fn hann(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / (len - 1) as f32).cos())
        .collect()
}

/// Multiplies every chirp's range samples by the window, in place.
/// The cube is indexed (chirp, antenna, range sample).
pub fn apply_per_chirp(cube: &mut Array3<Complex32>, window: &[f32]) {
    let (chirps, antennas, samples) = cube.dim();
    let len = window.len().min(samples);
    for c in 0..chirps {
        for a in 0..antennas {
            for (s, coeff) in window.iter().enumerate().take(len) {
                cube[(c, a, s)] *= *coeff;
            }
        }
    }
}
