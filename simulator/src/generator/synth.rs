use fusioncore::frames::{ImagingFrame, Landmark, LandmarkFrame, RawAdcFrame, POSE_LANDMARK_COUNT};
use fusioncore::prelude::{
    AdcParams, FrameSource, Modality, PipelineResult, SourcePoll,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

/// Deterministic frame clock with bounded jitter.
///
/// Jitter stays under a quarter period, so emitted timestamps are strictly
/// monotonic, as the source contract requires.
pub struct SyntheticClock {
    t: f64,
    period: f64,
}

impl SyntheticClock {
    pub fn new(base: f64, period_ms: f64) -> Self {
        Self {
            t: base,
            period: period_ms.max(1.0) / 1000.0,
        }
    }

    pub fn tick(&mut self, rng: &mut StdRng) -> f64 {
        self.t += self.period;
        let jitter_bound = self.period / 8.0;
        self.t + rng.gen_range(-jitter_bound..jitter_bound)
    }
}

/// Seeded synthetic radar source emitting valid interleaved ADC cubes.
///
/// `gap_every` injects a sequence gap every N frames to drill the capture
/// boundary's loss accounting.
pub struct SynthRadarSource {
    params: AdcParams,
    rng: StdRng,
    clock: SyntheticClock,
    next_sequence: u64,
    remaining: usize,
    gap_every: Option<u64>,
    frequency: f32,
}

impl SynthRadarSource {
    pub fn new(params: AdcParams, frames: usize, period_ms: f64, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
            clock: SyntheticClock::new(0.0, period_ms),
            next_sequence: 1,
            remaining: frames,
            gap_every: None,
            frequency: 8.0,
        }
    }

    pub fn with_gap_every(mut self, every: u64) -> Self {
        self.gap_every = Some(every.max(2));
        self
    }

    fn build_samples(&mut self) -> Vec<i16> {
        let total = self.params.frame_samples();
        let samples = self.params.samples as f32;
        let mut values = Vec::with_capacity(total);
        for index in 0..total {
            let phase = 2.0 * PI * self.frequency * (index % self.params.samples) as f32 / samples;
            let noise: f32 = self.rng.gen_range(-40.0..40.0);
            values.push((phase.sin() * 800.0 + noise) as i16);
        }
        values
    }
}

impl FrameSource for SynthRadarSource {
    type Frame = RawAdcFrame;

    fn modality(&self) -> Modality {
        Modality::Radar
    }

    fn next_frame(&mut self) -> PipelineResult<SourcePoll<RawAdcFrame>> {
        if self.remaining == 0 {
            return Ok(SourcePoll::Exhausted);
        }
        self.remaining -= 1;

        let mut sequence = self.next_sequence;
        if let Some(every) = self.gap_every {
            if sequence % every == 0 {
                sequence += 1;
            }
        }
        self.next_sequence = sequence + 1;

        let timestamp = self.clock.tick(&mut self.rng);
        let samples = self.build_samples();
        let frame = RawAdcFrame::from_samples(self.params, samples, sequence, timestamp)?;
        Ok(SourcePoll::Frame(frame))
    }
}

/// Synthetic camera source producing small gradient frames.
pub struct SynthImagingSource {
    width: u32,
    height: u32,
    rng: StdRng,
    clock: SyntheticClock,
    next_sequence: u64,
    remaining: usize,
}

impl SynthImagingSource {
    pub fn new(width: u32, height: u32, frames: usize, period_ms: f64, seed: u64) -> Self {
        Self {
            width,
            height,
            rng: StdRng::seed_from_u64(seed),
            clock: SyntheticClock::new(0.0, period_ms),
            next_sequence: 1,
            remaining: frames,
        }
    }
}

impl FrameSource for SynthImagingSource {
    type Frame = ImagingFrame;

    fn modality(&self) -> Modality {
        Modality::Imaging
    }

    fn next_frame(&mut self) -> PipelineResult<SourcePoll<ImagingFrame>> {
        if self.remaining == 0 {
            return Ok(SourcePoll::Exhausted);
        }
        self.remaining -= 1;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let timestamp = self.clock.tick(&mut self.rng);

        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push((x % 256) as u8);
                pixels.push((y % 256) as u8);
                pixels.push(self.rng.gen());
            }
        }
        let frame = ImagingFrame::new(self.width, self.height, 3, pixels, sequence, timestamp)?;
        Ok(SourcePoll::Frame(frame))
    }
}

/// Synthetic pose source emitting a slowly drifting full-body landmark set.
pub struct SynthLandmarkSource {
    rng: StdRng,
    clock: SyntheticClock,
    next_sequence: u64,
    remaining: usize,
    center: (f32, f32),
}

impl SynthLandmarkSource {
    pub fn new(frames: usize, period_ms: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clock: SyntheticClock::new(0.0, period_ms),
            next_sequence: 1,
            remaining: frames,
            center: (640.0, 360.0),
        }
    }
}

impl FrameSource for SynthLandmarkSource {
    type Frame = LandmarkFrame;

    fn modality(&self) -> Modality {
        Modality::Landmarks
    }

    fn next_frame(&mut self) -> PipelineResult<SourcePoll<LandmarkFrame>> {
        if self.remaining == 0 {
            return Ok(SourcePoll::Exhausted);
        }
        self.remaining -= 1;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let timestamp = self.clock.tick(&mut self.rng);

        self.center.0 += self.rng.gen_range(-2.0..2.0);
        self.center.1 += self.rng.gen_range(-2.0..2.0);
        let points = (0..POSE_LANDMARK_COUNT)
            .map(|i| Landmark {
                x: self.center.0 + (i as f32 * 7.0) % 120.0,
                y: self.center.1 + (i as f32 * 11.0) % 200.0,
                z: self.rng.gen_range(-0.5..0.5),
                confidence: self.rng.gen_range(0.5..1.0),
            })
            .collect();
        let frame = LandmarkFrame::new(points, sequence, timestamp)?;
        Ok(SourcePoll::Frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusioncore::prelude::CaptureFrame;

    fn tiny_params() -> AdcParams {
        AdcParams {
            chirps: 2,
            rx: 2,
            tx: 2,
            samples: 8,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    fn drain<S: FrameSource>(mut source: S) -> Vec<S::Frame> {
        let mut frames = Vec::new();
        loop {
            match source.next_frame().unwrap() {
                SourcePoll::Frame(f) => frames.push(f),
                SourcePoll::Pending => continue,
                SourcePoll::Exhausted => break,
            }
        }
        frames
    }

    #[test]
    fn radar_source_emits_valid_monotonic_frames() {
        let frames = drain(SynthRadarSource::new(tiny_params(), 5, 100.0, 7));
        assert_eq!(frames.len(), 5);
        let mut last = f64::NEG_INFINITY;
        for frame in &frames {
            assert_eq!(frame.samples.len(), tiny_params().frame_samples());
            assert!(frame.timestamp() > last);
            last = frame.timestamp();
        }
    }

    #[test]
    fn gap_injection_skips_sequence_numbers() {
        let frames = drain(SynthRadarSource::new(tiny_params(), 6, 100.0, 7).with_gap_every(3));
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[1] > w[0]));
        assert!(sequences.windows(2).any(|w| w[1] > w[0] + 1));
    }

    #[test]
    fn optical_sources_respect_their_shapes() {
        let imaging = drain(SynthImagingSource::new(8, 6, 3, 33.0, 1));
        assert_eq!(imaging.len(), 3);
        assert_eq!(imaging[0].pixels.len(), 8 * 6 * 3);

        let landmarks = drain(SynthLandmarkSource::new(3, 33.0, 2));
        assert_eq!(landmarks[0].points.len(), POSE_LANDMARK_COUNT);
    }
}
