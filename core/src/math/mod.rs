pub mod fft;
pub mod window;

pub use fft::{fftshift_axis, FftHelper};
