use crate::frames::{ModalityFrame, RadarFrame, RangeAzimuthHeatmap, RangeDopplerHeatmap, RawAdcFrame};
use crate::math::window;
use crate::prelude::{AdcParams, PipelineError, PipelineResult};
use crate::processing::backend::{
    AcceleratedBackend, AccelerationHandle, ExecutionPath, ExecutionPathCell, SoftwareBackend,
    SpectrumBackend,
};
use crate::processing::{cube, heatmap};
use crate::queue::{PushOutcome, QueueReceiver, QueueSender};
use crate::telemetry::ModalityCounters;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tuning for the radar processing chain.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProcessorConfig {
    pub adc: AdcParams,
    /// Azimuth FFT size; the virtual array is zero-padded up to this.
    pub angle_bins: usize,
    /// Per-chirp Hann window on the range samples.
    pub window: bool,
    /// Per-frame processing budget. A frame finishing later than this is
    /// dropped so the worker never falls behind the capture cadence.
    pub deadline_ms: f64,
    /// Raw-frame backlog depth; beyond it the oldest cube is evicted.
    pub queue_depth: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            adc: AdcParams::iwr1843(),
            angle_bins: 256,
            window: false,
            deadline_ms: 100.0,
            queue_depth: 8,
        }
    }
}

/// Turns raw ADC cubes into range-doppler and range-azimuth heatmaps.
///
/// The transform path is chosen once: accelerated when a handle is offered
/// and healthy, software otherwise. A runtime accelerator failure switches
/// to software for the remainder of the session; the path never oscillates.
pub struct RadarProcessor {
    config: ProcessorConfig,
    chirp_window: Option<Vec<f32>>,
    backend: Box<dyn SpectrumBackend>,
    fallback: Option<SoftwareBackend>,
    path_cell: Arc<ExecutionPathCell>,
}

impl RadarProcessor {
    pub fn new(
        config: ProcessorConfig,
        accel: Option<Box<dyn AccelerationHandle>>,
    ) -> PipelineResult<Self> {
        config.adc.validate()?;
        if config.angle_bins < config.adc.virtual_antennas() {
            return Err(PipelineError::MalformedCube(format!(
                "angle bin count {} smaller than virtual array {}",
                config.angle_bins,
                config.adc.virtual_antennas()
            )));
        }

        let chirp_window = config.window.then(|| window::hann(config.adc.samples));
        let (backend, fallback, initial): (Box<dyn SpectrumBackend>, _, _) = match accel {
            Some(handle) => (
                Box::new(AcceleratedBackend::new(handle)),
                Some(SoftwareBackend::new()),
                ExecutionPath::Accelerated,
            ),
            None => {
                debug!("no acceleration handle offered, starting on the software path");
                (Box::new(SoftwareBackend::new()), None, ExecutionPath::Software)
            }
        };

        Ok(Self {
            config,
            chirp_window,
            backend,
            fallback,
            path_cell: ExecutionPathCell::new(initial, 0.0),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn path(&self) -> ExecutionPath {
        self.path_cell.current()
    }

    /// Shared status cell; clone before moving the processor into a worker.
    pub fn path_cell(&self) -> Arc<ExecutionPathCell> {
        Arc::clone(&self.path_cell)
    }

    /// Processes one cube into its heatmap pair, tagged with the input's
    /// sequence number and timestamp.
    pub fn process(
        &mut self,
        frame: &RawAdcFrame,
    ) -> PipelineResult<(RangeDopplerHeatmap, RangeAzimuthHeatmap)> {
        if frame.params != self.config.adc {
            return Err(PipelineError::MalformedCube(
                "frame dimensions disagree with processor configuration".into(),
            ));
        }

        let mut complex = cube::complex_cube(frame)?;
        if let Some(w) = &self.chirp_window {
            window::apply_per_chirp(&mut complex, w);
        }

        let mut spectrum = cube::pad_azimuth(&complex, self.config.angle_bins)?;
        if let Err(err) = self.backend.transform(&mut spectrum) {
            let Some(software) = self.fallback.take() else {
                return Err(err);
            };
            warn!(
                "accelerated transform failed ({}); switching to software for the rest of the session",
                err
            );
            self.backend = Box::new(software);
            self.path_cell.switch_to_software(frame.timestamp);
            spectrum = cube::pad_azimuth(&complex, self.config.angle_bins)?;
            self.backend.transform(&mut spectrum)?;
        }

        let rd = RangeDopplerHeatmap {
            bins: heatmap::range_doppler(&spectrum),
            sequence: frame.sequence,
            timestamp: frame.timestamp,
        };
        let ra = RangeAzimuthHeatmap {
            bins: heatmap::range_azimuth(&spectrum),
            sequence: frame.sequence,
            timestamp: frame.timestamp,
        };
        Ok((rd, ra))
    }
}

/// Drains raw cubes from the capture queue, applies the deadline policy,
/// and feeds derived heatmap frames to the synchronizer.
pub struct RadarWorker {
    processor: RadarProcessor,
    counters: Arc<ModalityCounters>,
    keep_raw: bool,
    deadline: Duration,
}

impl RadarWorker {
    pub fn new(processor: RadarProcessor, counters: Arc<ModalityCounters>, keep_raw: bool) -> Self {
        let deadline = Duration::from_secs_f64(processor.config.deadline_ms.max(0.0) / 1000.0);
        Self {
            processor,
            counters,
            keep_raw,
            deadline,
        }
    }

    pub async fn run(
        mut self,
        mut input: QueueReceiver<RawAdcFrame>,
        output: QueueSender<ModalityFrame>,
    ) {
        while let Some(raw) = input.pop().await {
            let started = Instant::now();
            match self.processor.process(&raw) {
                Ok((rd, ra)) => {
                    let elapsed = started.elapsed();
                    if elapsed > self.deadline {
                        warn!(
                            "{}",
                            PipelineError::ProcessingTimeout {
                                elapsed_ms: elapsed.as_secs_f64() * 1000.0,
                                budget_ms: self.deadline.as_secs_f64() * 1000.0,
                            }
                        );
                        self.counters.record_dropped(1);
                        continue;
                    }
                    let frame = ModalityFrame::Radar(RadarFrame {
                        sequence: raw.sequence,
                        timestamp: raw.timestamp,
                        raw: self.keep_raw.then_some(raw),
                        range_doppler: rd,
                        range_azimuth: ra,
                    });
                    if output.push(frame).await == PushOutcome::Closed {
                        self.counters.record_dropped(1);
                        break;
                    }
                }
                Err(err) => {
                    warn!("radar frame {} rejected: {}", raw.sequence, err);
                    self.counters.record_dropped(1);
                }
            }
        }
    }
}
