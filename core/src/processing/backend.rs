use crate::math::{fftshift_axis, FftHelper};
use crate::prelude::{PipelineError, PipelineResult};
use ndarray::{Array3, Axis};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Which transform implementation is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Accelerated,
    Software,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Accelerated => f.write_str("accelerated"),
            ExecutionPath::Software => f.write_str("software"),
        }
    }
}

/// One path decision, recorded in session metadata.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PathEvent {
    pub timestamp: f64,
    pub path: ExecutionPath,
}

/// Observable execution-path state shared with status consumers.
///
/// A session records at most one switch: accelerated at start, software
/// after a fallback decision. The cell refuses to oscillate back.
#[derive(Debug)]
pub struct ExecutionPathCell {
    inner: Mutex<PathState>,
}

#[derive(Debug)]
struct PathState {
    current: ExecutionPath,
    history: Vec<PathEvent>,
}

impl ExecutionPathCell {
    pub fn new(initial: ExecutionPath, timestamp: f64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PathState {
                current: initial,
                history: vec![PathEvent {
                    timestamp,
                    path: initial,
                }],
            }),
        })
    }

    pub fn switch_to_software(&self, timestamp: f64) {
        if let Ok(mut state) = self.inner.lock() {
            if state.current != ExecutionPath::Software {
                state.current = ExecutionPath::Software;
                state.history.push(PathEvent {
                    timestamp,
                    path: ExecutionPath::Software,
                });
            }
        }
    }

    pub fn current(&self) -> ExecutionPath {
        self.inner
            .lock()
            .map(|s| s.current)
            .unwrap_or(ExecutionPath::Software)
    }

    pub fn history(&self) -> Vec<PathEvent> {
        self.inner
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }
}

/// Hardware FFT device handle supplied by the embedding application.
///
/// Device discovery and configuration stay with the collaborator; the
/// processor only drives the transform. The handle performs an in-place
/// forward FFT along all three axes of the cube.
pub trait AccelerationHandle: Send {
    fn fft3(&mut self, cube: &mut Array3<Complex32>) -> Result<(), String>;
}

/// Strategy seam between the accelerated and software transform paths.
/// Both must produce numerically equivalent spectra for identical input.
pub trait SpectrumBackend: Send {
    fn path(&self) -> ExecutionPath;

    /// Full three-axis forward transform with the doppler and azimuth axes
    /// shifted so the zero bin sits in the center.
    fn transform(&mut self, cube: &mut Array3<Complex32>) -> PipelineResult<()>;
}

/// CPU transform over `rustfft` plans.
pub struct SoftwareBackend {
    fft: FftHelper,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            fft: FftHelper::new(),
        }
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumBackend for SoftwareBackend {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Software
    }

    fn transform(&mut self, cube: &mut Array3<Complex32>) -> PipelineResult<()> {
        self.fft.forward_axis(cube, Axis(2));
        self.fft.forward_axis(cube, Axis(0));
        self.fft.forward_axis(cube, Axis(1));
        fftshift_axis(cube, Axis(0));
        fftshift_axis(cube, Axis(1));
        Ok(())
    }
}

/// Transform driven by an external accelerator handle. The shift stays on
/// the CPU so both paths share the exact same bin layout.
pub struct AcceleratedBackend {
    handle: Box<dyn AccelerationHandle>,
}

impl AcceleratedBackend {
    pub fn new(handle: Box<dyn AccelerationHandle>) -> Self {
        Self { handle }
    }
}

impl SpectrumBackend for AcceleratedBackend {
    fn path(&self) -> ExecutionPath {
        ExecutionPath::Accelerated
    }

    fn transform(&mut self, cube: &mut Array3<Complex32>) -> PipelineResult<()> {
        self.handle
            .fft3(cube)
            .map_err(PipelineError::AccelerationUnavailable)?;
        fftshift_axis(cube, Axis(0));
        fftshift_axis(cube, Axis(1));
        Ok(())
    }
}
