use crate::frames::{ModalityFrame, SyncedFrameSet};
use crate::prelude::{Modality, OverflowPolicy, PipelineError, PipelineResult};
use crate::processing::ExecutionPathCell;
use crate::queue::{self, PushOutcome, QueueSender};
use crate::recording::layout::SessionLayout;
use crate::recording::session::{unix_now, RecorderState, Session, SessionSummary};
use crate::recording::writer::{storage_err, PersistenceWorker, WriteTask};
use crate::sync::SyncConfig;
use crate::telemetry::PipelineMetrics;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Persistence tuning for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub output_root: PathBuf,
    /// Overrides the wall-clock-derived session id.
    pub session_id: Option<String>,
    /// Worker queue policy; explicit and reported in session metadata.
    pub backpressure: OverflowPolicy,
    pub queue_depth: usize,
    pub persist_raw: bool,
    /// Whether partial (missing-modality) sets are persisted at all.
    pub persist_partial_sets: bool,
    /// Bound on waiting for persistence workers to drain at stop.
    pub drain_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./recordings"),
            session_id: None,
            backpressure: OverflowPolicy::DropOldest,
            queue_depth: 64,
            persist_raw: true,
            persist_partial_sets: false,
            drain_timeout_ms: 5_000,
        }
    }
}

/// Static capture parameters embedded in session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDescriptor {
    pub adc: crate::prelude::AdcParams,
    pub angle_bins: usize,
    pub sync: SyncConfig,
    pub modalities: Vec<Modality>,
}

#[derive(Serialize)]
struct SessionMetadata<'a> {
    #[serde(flatten)]
    summary: &'a SessionSummary,
    capture: &'a CaptureDescriptor,
    backpressure: OverflowPolicy,
    persist_raw: bool,
    persist_partial_sets: bool,
}

struct ActiveSession {
    session: Arc<Session>,
    config: RecorderConfig,
    descriptor: CaptureDescriptor,
    layout: SessionLayout,
    timeline: BufWriter<File>,
    queues: BTreeMap<Modality, QueueSender<WriteTask>>,
    workers: Vec<JoinHandle<()>>,
    path_cell: Arc<ExecutionPathCell>,
    sets_recorded: u64,
}

/// Session lifecycle state machine.
///
/// `Idle --start--> Recording --stop--> Stopping --drained--> Idle`.
/// Starting while recording is rejected; stopping while idle is a no-op
/// that returns an empty summary.
pub struct SessionRecorder {
    state: RecorderState,
    active: Option<ActiveSession>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.active.as_ref().map(|a| Arc::clone(&a.session))
    }

    /// Creates the session layout and starts one persistence worker per
    /// enabled modality. Must run inside a tokio runtime.
    pub fn start(
        &mut self,
        config: RecorderConfig,
        descriptor: CaptureDescriptor,
        metrics: Arc<PipelineMetrics>,
        path_cell: Arc<ExecutionPathCell>,
    ) -> PipelineResult<Arc<Session>> {
        if self.state != RecorderState::Idle {
            return Err(PipelineError::InvalidStateTransition(format!(
                "start while {}",
                self.state
            )));
        }

        let id = config
            .session_id
            .clone()
            .unwrap_or_else(|| format!("{}", unix_now() as u64));
        let root = config.output_root.join(format!("session_{}", id));
        let layout = SessionLayout::new(root.clone());
        layout.create().map_err(storage_err)?;

        let timeline_file = File::create(layout.timeline_path()).map_err(storage_err)?;
        let mut timeline = BufWriter::new(timeline_file);
        writeln!(
            timeline,
            "set,reference_ts,offset_ms,radar_ts,imaging_ts,landmarks_ts"
        )
        .map_err(storage_err)?;

        let session = Arc::new(Session::new(id, unix_now(), root, metrics));

        let mut queues = BTreeMap::new();
        let mut workers = Vec::new();
        for modality in &descriptor.modalities {
            let counters = session.metrics.counters(*modality);
            let (tx, rx) = queue::bounded(config.queue_depth, config.backpressure, Some(counters));
            let worker = PersistenceWorker::new(*modality, layout.clone(), Arc::clone(&session));
            workers.push(tokio::spawn(worker.run(rx)));
            queues.insert(*modality, tx);
        }

        debug!("session {} recording into {}", session.id, layout.root().display());
        self.active = Some(ActiveSession {
            session: Arc::clone(&session),
            config,
            descriptor,
            layout,
            timeline,
            queues,
            workers,
            path_cell,
            sets_recorded: 0,
        });
        self.state = RecorderState::Recording;
        Ok(session)
    }

    /// Routes one synchronized set to the persistence workers and appends
    /// its timeline row. Escalates a pending storage failure by moving to
    /// `Stopping` and refusing further sets.
    pub async fn accept(&mut self, set: SyncedFrameSet) -> PipelineResult<()> {
        if self.state != RecorderState::Recording || self.active.is_none() {
            self.drop_set_counted(&set);
            return Ok(());
        }

        if let Some(reason) = self.session().and_then(|s| s.failure()) {
            self.state = RecorderState::Stopping;
            self.drop_set_counted(&set);
            return Err(PipelineError::StorageWriteFailure(reason));
        }

        let persist_partial = self
            .active
            .as_ref()
            .map(|a| a.config.persist_partial_sets)
            .unwrap_or(false);
        if set.is_partial() && !persist_partial {
            self.drop_set_counted(&set);
            return Ok(());
        }

        if let Err(failure) = self.write_timeline_row(&set) {
            self.state = RecorderState::Stopping;
            self.drop_set_counted(&set);
            return Err(failure);
        }

        self.route_frames(set).await;
        Ok(())
    }

    fn write_timeline_row(&mut self, set: &SyncedFrameSet) -> PipelineResult<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let row = format!(
            "{},{:.6},{:.3},{},{},{}",
            active.sets_recorded,
            set.reference_timestamp,
            set.max_offset_ms,
            format_ts(set.timestamp_of(Modality::Radar)),
            format_ts(set.timestamp_of(Modality::Imaging)),
            format_ts(set.timestamp_of(Modality::Landmarks)),
        );
        if let Err(err) = writeln!(active.timeline, "{}", row) {
            let failure = storage_err(err);
            active.session.fail(failure.to_string());
            return Err(failure);
        }
        Ok(())
    }

    async fn route_frames(&mut self, set: SyncedFrameSet) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let persist_raw = active.config.persist_raw;
        for (modality, frame) in set.frames {
            let task = match frame {
                ModalityFrame::Radar(rf) => WriteTask::Radar {
                    raw: if persist_raw { rf.raw } else { None },
                    range_doppler: rf.range_doppler,
                    range_azimuth: rf.range_azimuth,
                },
                ModalityFrame::Imaging(f) => WriteTask::Imaging(f),
                ModalityFrame::Landmarks(f) => WriteTask::Landmarks(f),
            };
            match active.queues.get(&modality) {
                // Block backpressure waits briefly here; drop-oldest never
                // waits and the queue counts its own eviction.
                Some(queue) => {
                    if queue.push(task).await == PushOutcome::Closed {
                        active.session.metrics.counters(modality).record_dropped(1);
                    }
                }
                None => {
                    warn!("no persistence worker for {}, frame dropped", modality);
                    active.session.metrics.counters(modality).record_dropped(1);
                }
            }
        }
        active.sets_recorded += 1;
    }

    /// Stops accepting, drains the workers (bounded), finalizes metadata
    /// atomically, and returns to `Idle`.
    pub async fn stop(&mut self) -> PipelineResult<SessionSummary> {
        let Some(mut active) = self.active.take() else {
            // stop while Idle is a no-op.
            return Ok(SessionSummary::default());
        };
        self.state = RecorderState::Stopping;

        // Closing the queues lets each worker finish what is buffered.
        active.queues.clear();
        let drain = Duration::from_millis(active.config.drain_timeout_ms.max(1));
        for worker in active.workers.drain(..) {
            match tokio::time::timeout(drain, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    active
                        .session
                        .fail(format!("persistence worker panicked: {}", err));
                }
                Err(_) => {
                    warn!("persistence worker did not drain in {:?}", drain);
                    active
                        .session
                        .fail("persistence drain timed out".to_string());
                }
            }
        }

        if let Err(err) = active.timeline.flush() {
            active.session.fail(storage_err(err).to_string());
        }

        let stopped_at = unix_now();
        let counts = active
            .session
            .metrics
            .snapshot()
            .into_iter()
            .filter(|(m, _)| active.descriptor.modalities.contains(m))
            .collect();
        let mut summary = SessionSummary {
            session_id: active.session.id.clone(),
            started_at: active.session.started_at,
            stopped_at,
            duration_seconds: (stopped_at - active.session.started_at).max(0.0),
            counts,
            sync: active.session.metrics.sync().snapshot(),
            sets_recorded: active.sets_recorded,
            execution_path_history: active.path_cell.history(),
            error: active.session.failure(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        if let Err(err) = finalize_metadata(&active, &summary) {
            summary.error.get_or_insert_with(|| err.to_string());
        }

        self.state = RecorderState::Idle;
        Ok(summary)
    }

    fn drop_set_counted(&self, set: &SyncedFrameSet) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        for modality in set.frames.keys() {
            active.session.metrics.counters(*modality).record_dropped(1);
        }
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn format_ts(ts: Option<f64>) -> String {
    ts.map(|t| format!("{:.6}", t)).unwrap_or_default()
}

/// Writes metadata to a staging file and renames it into place, so a
/// reader never observes a half-written record.
fn finalize_metadata(active: &ActiveSession, summary: &SessionSummary) -> PipelineResult<()> {
    let metadata = SessionMetadata {
        summary,
        capture: &active.descriptor,
        backpressure: active.config.backpressure,
        persist_raw: active.config.persist_raw,
        persist_partial_sets: active.config.persist_partial_sets,
    };
    let tmp = active.layout.metadata_tmp_path();
    let file = File::create(&tmp).map_err(storage_err)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &metadata).map_err(storage_err)?;
    fs::rename(&tmp, active.layout.metadata_path()).map_err(storage_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{
        ImagingFrame, Landmark, LandmarkFrame, RadarFrame, RangeAzimuthHeatmap,
        RangeDopplerHeatmap, RawAdcFrame, POSE_LANDMARK_COUNT,
    };
    use crate::prelude::AdcParams;
    use crate::processing::ExecutionPath;
    use ndarray::Array2;

    fn descriptor() -> CaptureDescriptor {
        CaptureDescriptor {
            adc: tiny_params(),
            angle_bins: 8,
            sync: SyncConfig::default(),
            modalities: vec![Modality::Radar, Modality::Imaging, Modality::Landmarks],
        }
    }

    fn tiny_params() -> AdcParams {
        AdcParams {
            chirps: 2,
            rx: 2,
            tx: 2,
            samples: 4,
            iq: 2,
            bytes_per_sample: 2,
        }
    }

    fn config(root: &std::path::Path) -> RecorderConfig {
        RecorderConfig {
            output_root: root.to_path_buf(),
            session_id: Some("unit".into()),
            backpressure: OverflowPolicy::Block,
            queue_depth: 8,
            persist_raw: true,
            persist_partial_sets: false,
            drain_timeout_ms: 2_000,
        }
    }

    fn radar_frame(sequence: u64, timestamp: f64) -> ModalityFrame {
        let params = tiny_params();
        let raw =
            RawAdcFrame::from_samples(params, vec![2i16; params.frame_samples()], sequence, timestamp)
                .unwrap();
        let bins = Array2::from_elem((4, 2), 0.25f32);
        ModalityFrame::Radar(RadarFrame {
            range_doppler: RangeDopplerHeatmap {
                bins: bins.clone(),
                sequence,
                timestamp,
            },
            range_azimuth: RangeAzimuthHeatmap {
                bins,
                sequence,
                timestamp,
            },
            raw: Some(raw),
            sequence,
            timestamp,
        })
    }

    fn full_set(sequence: u64, timestamp: f64) -> SyncedFrameSet {
        let mut frames = BTreeMap::new();
        frames.insert(Modality::Radar, radar_frame(sequence, timestamp));
        frames.insert(
            Modality::Imaging,
            ModalityFrame::Imaging(
                ImagingFrame::new(2, 2, 1, vec![9; 4], sequence, timestamp + 0.001).unwrap(),
            ),
        );
        frames.insert(
            Modality::Landmarks,
            ModalityFrame::Landmarks(
                LandmarkFrame::new(
                    vec![
                        Landmark {
                            x: 1.0,
                            y: 2.0,
                            z: 0.0,
                            confidence: 0.8
                        };
                        POSE_LANDMARK_COUNT
                    ],
                    sequence,
                    timestamp + 0.002,
                )
                .unwrap(),
            ),
        );
        SyncedFrameSet {
            reference_timestamp: timestamp,
            max_offset_ms: 2.0,
            frames,
            missing: Vec::new(),
        }
    }

    fn recorder_parts() -> (Arc<PipelineMetrics>, Arc<ExecutionPathCell>) {
        (
            Arc::new(PipelineMetrics::new()),
            ExecutionPathCell::new(ExecutionPath::Software, 0.0),
        )
    }

    #[tokio::test]
    async fn lifecycle_records_sets_and_finalizes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (metrics, path_cell) = recorder_parts();
        let mut recorder = SessionRecorder::new();
        recorder
            .start(config(dir.path()), descriptor(), metrics, path_cell)
            .unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);

        for i in 0..3u64 {
            recorder
                .accept(full_set(i, 1.0 + i as f64 * 0.1))
                .await
                .unwrap();
        }
        let summary = recorder.stop().await.unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert_eq!(summary.sets_recorded, 3);
        assert!(summary.error.is_none());

        let root = dir.path().join("session_unit");
        let layout = SessionLayout::new(root.clone());
        assert!(layout.metadata_path().is_file());
        assert!(!layout.metadata_tmp_path().exists());

        let metadata: serde_json::Value =
            serde_json::from_slice(&std::fs::read(layout.metadata_path()).unwrap()).unwrap();
        assert_eq!(metadata["session_id"], "unit");
        assert_eq!(metadata["sets_recorded"], 3);
        assert_eq!(metadata["backpressure"], "block");
        assert_eq!(metadata["capture"]["angle_bins"], 8);

        // Raw records are fixed length: three frames appended.
        let raw_len = std::fs::metadata(layout.raw_radar_path()).unwrap().len();
        assert_eq!(raw_len as usize, 3 * tiny_params().frame_bytes());

        let timeline = std::fs::read_to_string(layout.timeline_path()).unwrap();
        let lines: Vec<&str> = timeline.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("set,reference_ts"));
        assert!(lines[1].starts_with("0,1.000000"));

        for i in 0..3u64 {
            assert!(layout.rd_heatmap_path(i).is_file());
            assert!(layout.ra_heatmap_path(i).is_file());
            assert!(layout.imaging_path(i).is_file());
            assert!(layout.landmarks_path(i).is_file());
        }

        // Every routed frame was accepted by its worker.
        for modality in [Modality::Radar, Modality::Imaging, Modality::Landmarks] {
            assert_eq!(summary.counts[&modality].accepted, 3);
        }
    }

    #[tokio::test]
    async fn start_while_recording_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (metrics, path_cell) = recorder_parts();
        let mut recorder = SessionRecorder::new();
        recorder
            .start(
                config(dir.path()),
                descriptor(),
                Arc::clone(&metrics),
                Arc::clone(&path_cell),
            )
            .unwrap();
        let err = recorder
            .start(config(dir.path()), descriptor(), metrics, path_cell)
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStateTransition(_)));
        recorder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_noop() {
        let mut recorder = SessionRecorder::new();
        let summary = recorder.stop().await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn unpersisted_partial_sets_are_counted_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (metrics, path_cell) = recorder_parts();
        let mut recorder = SessionRecorder::new();
        recorder
            .start(config(dir.path()), descriptor(), Arc::clone(&metrics), path_cell)
            .unwrap();

        let mut set = full_set(0, 1.0);
        set.frames.remove(&Modality::Radar);
        set.missing = vec![Modality::Radar];
        recorder.accept(set).await.unwrap();

        let summary = recorder.stop().await.unwrap();
        assert_eq!(summary.sets_recorded, 0);
        assert_eq!(summary.counts[&Modality::Imaging].dropped, 1);
        assert_eq!(summary.counts[&Modality::Landmarks].dropped, 1);
        assert!(!SessionLayout::new(dir.path().join("session_unit"))
            .imaging_path(0)
            .is_file());
    }

    #[tokio::test]
    async fn storage_failure_escalates_to_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let (metrics, path_cell) = recorder_parts();
        let mut recorder = SessionRecorder::new();
        let session = recorder
            .start(config(dir.path()), descriptor(), metrics, path_cell)
            .unwrap();

        // Sabotage the landmarks directory after start.
        let layout = SessionLayout::new(dir.path().join("session_unit"));
        std::fs::remove_dir(layout.landmarks_path(0).parent().unwrap()).unwrap();

        recorder.accept(full_set(0, 1.0)).await.unwrap();
        // Give the landmarks worker time to hit the failure.
        for _ in 0..100 {
            if session.failure().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.failure().is_some());

        let err = recorder.accept(full_set(1, 1.1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageWriteFailure(_)));
        assert_eq!(recorder.state(), RecorderState::Stopping);

        let summary = recorder.stop().await.unwrap();
        assert!(summary.error.is_some());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }
}
