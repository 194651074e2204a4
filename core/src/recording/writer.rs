use crate::frames::{
    ImagingFrame, LandmarkFrame, RangeAzimuthHeatmap, RangeDopplerHeatmap, RawAdcFrame,
};
use crate::prelude::{Modality, PipelineError, PipelineResult};
use crate::queue::QueueReceiver;
use crate::recording::layout::SessionLayout;
use crate::recording::session::Session;
use crate::telemetry::ModalityCounters;
use log::error;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::sync::Arc;

/// One frame's worth of persistence work for a single modality.
#[derive(Debug)]
pub enum WriteTask {
    Radar {
        raw: Option<RawAdcFrame>,
        range_doppler: RangeDopplerHeatmap,
        range_azimuth: RangeAzimuthHeatmap,
    },
    Imaging(ImagingFrame),
    Landmarks(LandmarkFrame),
}

/// Tagged numeric-array record used for heatmap files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapRecord {
    pub kind: String,
    pub sequence: u64,
    pub timestamp: f64,
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f32>,
}

/// Tagged pixel-array record used for imaging files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingRecord {
    pub sequence: u64,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Drains one modality's bounded queue to storage.
///
/// A write failure is fatal to the session: the worker flags the shared
/// session record and counts everything still queued as dropped instead of
/// continuing against an unverifiable on-disk state.
pub struct PersistenceWorker {
    modality: Modality,
    layout: SessionLayout,
    session: Arc<Session>,
    counters: Arc<ModalityCounters>,
    raw_writer: Option<BufWriter<File>>,
}

impl PersistenceWorker {
    pub fn new(modality: Modality, layout: SessionLayout, session: Arc<Session>) -> Self {
        let counters = session.metrics.counters(modality);
        Self {
            modality,
            layout,
            session,
            counters,
            raw_writer: None,
        }
    }

    pub async fn run(mut self, mut queue: QueueReceiver<WriteTask>) {
        while let Some(task) = queue.pop().await {
            if self.session.failure().is_some() {
                self.counters.record_dropped(1);
                continue;
            }
            match self.write_task(task) {
                Ok(()) => self.counters.record_accepted(1),
                Err(err) => {
                    error!("{} persistence failed: {}", self.modality, err);
                    self.session.fail(err.to_string());
                    self.counters.record_dropped(1);
                }
            }
        }
        if let Some(mut writer) = self.raw_writer.take() {
            if let Err(err) = writer.flush() {
                error!("raw radar flush failed: {}", err);
                self.session.fail(storage_err(err).to_string());
            }
        }
    }

    fn write_task(&mut self, task: WriteTask) -> PipelineResult<()> {
        match task {
            WriteTask::Radar {
                raw,
                range_doppler,
                range_azimuth,
            } => {
                if let Some(raw) = raw {
                    self.append_raw(&raw)?;
                }
                write_heatmap(
                    &self.layout.rd_heatmap_path(range_doppler.sequence),
                    "range_doppler",
                    range_doppler.sequence,
                    range_doppler.timestamp,
                    &range_doppler.bins,
                )?;
                write_heatmap(
                    &self.layout.ra_heatmap_path(range_azimuth.sequence),
                    "range_azimuth",
                    range_azimuth.sequence,
                    range_azimuth.timestamp,
                    &range_azimuth.bins,
                )?;
            }
            WriteTask::Imaging(frame) => {
                let record = ImagingRecord {
                    sequence: frame.sequence,
                    timestamp: frame.timestamp,
                    width: frame.width,
                    height: frame.height,
                    channels: frame.channels,
                    pixels: frame.pixels,
                };
                let file =
                    File::create(self.layout.imaging_path(record.sequence)).map_err(storage_err)?;
                bincode::serialize_into(BufWriter::new(file), &record).map_err(storage_err)?;
            }
            WriteTask::Landmarks(frame) => {
                let file = File::create(self.layout.landmarks_path(frame.sequence))
                    .map_err(storage_err)?;
                serde_json::to_writer(BufWriter::new(file), &frame).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    /// Appends one fixed-length raw record, re-validating its length.
    fn append_raw(&mut self, raw: &RawAdcFrame) -> PipelineResult<()> {
        let bytes = raw.to_le_bytes();
        if bytes.len() != raw.params.frame_bytes() {
            return Err(PipelineError::MalformedCube(format!(
                "raw record length {} disagrees with configured {}",
                bytes.len(),
                raw.params.frame_bytes()
            )));
        }
        if self.raw_writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.layout.raw_radar_path())
                .map_err(storage_err)?;
            self.raw_writer = Some(BufWriter::new(file));
        }
        if let Some(writer) = self.raw_writer.as_mut() {
            writer.write_all(&bytes).map_err(storage_err)?;
        }
        Ok(())
    }
}

pub(crate) fn storage_err(err: impl Display) -> PipelineError {
    PipelineError::StorageWriteFailure(err.to_string())
}

/// Serializes one heatmap as a tagged numeric-array file.
fn write_heatmap(
    path: &std::path::Path,
    kind: &str,
    sequence: u64,
    timestamp: f64,
    bins: &ndarray::Array2<f32>,
) -> PipelineResult<()> {
    let record = HeatmapRecord {
        kind: kind.to_string(),
        sequence,
        timestamp,
        rows: bins.nrows() as u32,
        cols: bins.ncols() as u32,
        data: bins.iter().copied().collect(),
    };
    let file = File::create(path).map_err(storage_err)?;
    bincode::serialize_into(BufWriter::new(file), &record).map_err(storage_err)?;
    Ok(())
}
