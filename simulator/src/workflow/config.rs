use anyhow::Context;
use fusioncore::prelude::{AdcParams, Modality, OverflowPolicy, UnmatchedPolicy};
use fusioncore::processing::ProcessorConfig;
use fusioncore::recording::{CaptureDescriptor, RecorderConfig};
use fusioncore::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Workflow-level capture configuration, loadable from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub chirps: usize,
    pub rx: usize,
    pub tx: usize,
    pub samples: usize,
    pub angle_bins: usize,
    pub window: bool,
    /// Session length in radar frames.
    pub frames: usize,
    pub frame_period_ms: f64,
    /// Per-frame processing budget. Generous by default: the offline driver
    /// is not paced, so the live capture deadline does not apply.
    pub deadline_ms: f64,
    /// Injects a radar sequence gap every N frames (loss drill).
    pub radar_gap_every: Option<u64>,
    pub tolerance_ms: f64,
    pub wait_timeout_ms: f64,
    pub unmatched: UnmatchedPolicy,
    pub backpressure: OverflowPolicy,
    pub persist_raw: bool,
    pub persist_partial_sets: bool,
    pub imaging_enabled: bool,
    pub landmarks_enabled: bool,
    pub output_root: PathBuf,
    pub session_id: Option<String>,
    pub seed: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chirps: 255,
            rx: 4,
            tx: 2,
            samples: 256,
            angle_bins: 256,
            window: false,
            frames: 16,
            frame_period_ms: 100.0,
            deadline_ms: 10_000.0,
            radar_gap_every: None,
            tolerance_ms: 50.0,
            // The offline driver is not paced, so stream time runs far ahead
            // of the slower radar stage; patience here must cover that skew.
            wait_timeout_ms: 10_000.0,
            unmatched: UnmatchedPolicy::Drop,
            backpressure: OverflowPolicy::DropOldest,
            persist_raw: true,
            persist_partial_sets: false,
            imaging_enabled: true,
            landmarks_enabled: true,
            output_root: PathBuf::from("./recordings"),
            session_id: None,
            seed: 0,
        }
    }
}

impl CaptureConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading capture config {}", path_ref.display()))?;
        let config: CaptureConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing capture config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(frames: usize, frame_period_ms: f64) -> Self {
        Self {
            frames,
            frame_period_ms,
            ..Self::default()
        }
    }

    pub fn adc_params(&self) -> AdcParams {
        AdcParams {
            chirps: self.chirps,
            rx: self.rx,
            tx: self.tx,
            samples: self.samples,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            adc: self.adc_params(),
            angle_bins: self.angle_bins,
            window: self.window,
            deadline_ms: self.deadline_ms,
            queue_depth: 8,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            tolerance_ms: self.tolerance_ms,
            wait_timeout_ms: self.wait_timeout_ms,
            unmatched: self.unmatched,
            pending_depth: 16,
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            output_root: self.output_root.clone(),
            session_id: self.session_id.clone(),
            backpressure: self.backpressure,
            persist_raw: self.persist_raw,
            persist_partial_sets: self.persist_partial_sets,
            ..RecorderConfig::default()
        }
    }

    pub fn modalities(&self) -> Vec<Modality> {
        let mut modalities = vec![Modality::Radar];
        if self.imaging_enabled {
            modalities.push(Modality::Imaging);
        }
        if self.landmarks_enabled {
            modalities.push(Modality::Landmarks);
        }
        modalities
    }

    pub fn descriptor(&self) -> CaptureDescriptor {
        CaptureDescriptor {
            adc: self.adc_params(),
            angle_bins: self.angle_bins,
            sync: self.sync_config(),
            modalities: self.modalities(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_keeps_adc_defaults() {
        let cfg = CaptureConfig::from_args(8, 50.0);
        assert_eq!(cfg.frames, 8);
        assert_eq!(cfg.adc_params().frame_bytes(), 2_088_960);
        assert_eq!(cfg.modalities().len(), 3);
    }

    #[test]
    fn config_load_reads_yaml_with_defaults_for_the_rest() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"chirps: 4\nsamples: 16\nframes: 3\nunmatched: emit-partial\nimaging_enabled: false\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = CaptureConfig::load(&path).unwrap();
        assert_eq!(cfg.chirps, 4);
        assert_eq!(cfg.samples, 16);
        assert_eq!(cfg.unmatched, UnmatchedPolicy::EmitPartial);
        assert!(!cfg.imaging_enabled);
        assert_eq!(cfg.rx, 4);
        assert_eq!(
            cfg.modalities(),
            vec![Modality::Radar, Modality::Landmarks]
        );
    }
}
