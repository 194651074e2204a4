use crate::prelude::AdcParams;
use ndarray::{Array2, Array3};
use num_complex::Complex32;

/// Floor applied before the log so empty bins stay finite.
const MIN_POWER: f32 = 1e-12;

/// Range-doppler heatmap shape for the given dims: (range bins, doppler bins).
pub fn range_doppler_shape(params: &AdcParams) -> (usize, usize) {
    (params.samples, params.chirps)
}

/// Range-azimuth heatmap shape: (range bins, azimuth bins).
pub fn range_azimuth_shape(params: &AdcParams, angle_bins: usize) -> (usize, usize) {
    (params.samples, angle_bins)
}

/// Collapses the shifted spectrum (doppler, azimuth, range) into the
/// range-doppler magnitude map: log power summed over azimuth, transposed
/// to range-major, normalized to [0, 1], range axis flipped.
pub fn range_doppler(spectrum: &Array3<Complex32>) -> Array2<f32> {
    let (chirps, bins, samples) = spectrum.dim();
    let mut map = Array2::<f32>::zeros((samples, chirps));
    for d in 0..chirps {
        for s in 0..samples {
            let mut power = 0.0f32;
            for a in 0..bins {
                power += spectrum[(d, a, s)].norm_sqr();
            }
            map[(s, d)] = power.max(MIN_POWER).log10();
        }
    }
    normalize(&mut map);
    flip_range_axis(&mut map);
    map
}

/// Collapses the shifted spectrum into the range-azimuth magnitude map:
/// log power summed over doppler, transposed, normalized, range flipped.
pub fn range_azimuth(spectrum: &Array3<Complex32>) -> Array2<f32> {
    let (chirps, bins, samples) = spectrum.dim();
    let mut map = Array2::<f32>::zeros((samples, bins));
    for a in 0..bins {
        for s in 0..samples {
            let mut power = 0.0f32;
            for d in 0..chirps {
                power += spectrum[(d, a, s)].norm_sqr();
            }
            map[(s, a)] = power.max(MIN_POWER).log10();
        }
    }
    normalize(&mut map);
    flip_range_axis(&mut map);
    map
}

fn normalize(map: &mut Array2<f32>) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for value in map.iter() {
        min = min.min(*value);
        max = max.max(*value);
    }
    let span = max - min + 1e-10;
    for value in map.iter_mut() {
        *value = (*value - min) / span;
    }
}

fn flip_range_axis(map: &mut Array2<f32>) {
    let rows = map.nrows();
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        for col in 0..map.ncols() {
            map.swap((top, col), (bottom, col));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn spectrum() -> Array3<Complex32> {
        let mut cube = Array3::<Complex32>::zeros((3, 5, 4));
        for ((d, a, s), value) in cube.indexed_iter_mut() {
            *value = Complex32::new((d * 7 + a * 3 + s) as f32, 0.25);
        }
        cube
    }

    #[test]
    fn shapes_are_pure_functions_of_dims() {
        let params = AdcParams::iwr1843();
        assert_eq!(range_doppler_shape(&params), (256, 255));
        assert_eq!(range_azimuth_shape(&params, 256), (256, 256));

        let cube = spectrum();
        assert_eq!(range_doppler(&cube).dim(), (4, 3));
        assert_eq!(range_azimuth(&cube).dim(), (4, 5));
    }

    #[test]
    fn maps_are_normalized_to_unit_interval() {
        for map in [range_doppler(&spectrum()), range_azimuth(&spectrum())] {
            let mut min = f32::INFINITY;
            let mut max = f32::NEG_INFINITY;
            for v in map.iter() {
                assert!(v.is_finite());
                min = min.min(*v);
                max = max.max(*v);
            }
            assert!(min >= 0.0 && max <= 1.0);
        }
    }

    #[test]
    fn zero_spectrum_stays_finite() {
        let cube = Array3::<Complex32>::zeros((2, 2, 2));
        let map = range_doppler(&cube);
        for v in map.iter() {
            assert!(v.is_finite());
        }
    }
}
