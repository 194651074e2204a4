use crate::generator::{SynthImagingSource, SynthLandmarkSource, SynthRadarSource};
use crate::gui_bridge::{StatusBridge, StatusModel};
use crate::workflow::config::CaptureConfig;
use anyhow::Context;
use fusioncore::capture::SourcePump;
use fusioncore::frames::{ModalityFrame, RawAdcFrame};
use fusioncore::prelude::{Modality, OverflowPolicy};
use fusioncore::processing::{ExecutionPathCell, RadarProcessor, RadarWorker};
use fusioncore::queue;
use fusioncore::recording::{RecorderState, SessionRecorder, SessionSummary};
use fusioncore::sync::{FrameMatcher, Synchronizer};
use fusioncore::telemetry::PipelineMetrics;
use log::error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of one offline session run.
pub struct RunReport {
    pub summary: SessionSummary,
    pub session_root: PathBuf,
}

/// Wires pumps, the radar worker, the synchronizer, and the recorder into
/// one offline recording session and runs it to completion.
///
/// The driver chain uses blocking queues so the synthetic run is lossless
/// and its final counts reconcile exactly; live deployments would configure
/// drop-oldest at the capture edges instead.
pub struct SessionRunner {
    config: CaptureConfig,
}

impl SessionRunner {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self, bridge: &StatusBridge) -> anyhow::Result<RunReport> {
        let config = &self.config;
        let metrics = Arc::new(PipelineMetrics::new());
        let modalities = config.modalities();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let processor = RadarProcessor::new(config.processor_config(), None)
            .context("initializing radar processor")?;
        let path_cell = processor.path_cell();

        let mut recorder = SessionRecorder::new();
        let session = recorder
            .start(
                config.recorder_config(),
                config.descriptor(),
                Arc::clone(&metrics),
                Arc::clone(&path_cell),
            )
            .context("starting recording session")?;
        let session_root = session.root.clone();
        let session_id = session.id.clone();

        let mut tasks = Vec::new();
        let mut sync_inputs = Vec::new();

        // Radar chain: pump -> raw queue -> worker -> modality queue.
        let radar_counters = metrics.counters(Modality::Radar);
        let (raw_tx, raw_rx) = queue::bounded::<RawAdcFrame>(
            config.processor_config().queue_depth,
            OverflowPolicy::Block,
            Some(Arc::clone(&radar_counters)),
        );
        let mut radar_source = SynthRadarSource::new(
            config.adc_params(),
            config.frames,
            config.frame_period_ms,
            config.seed,
        );
        if let Some(every) = config.radar_gap_every {
            radar_source = radar_source.with_gap_every(every);
        }
        tasks.push(tokio::spawn(
            SourcePump::new(radar_source, Arc::clone(&radar_counters), shutdown_rx.clone())
                .run::<RawAdcFrame>(raw_tx),
        ));

        let (radar_mod_tx, radar_mod_rx) = queue::bounded::<ModalityFrame>(
            32,
            OverflowPolicy::Block,
            Some(Arc::clone(&radar_counters)),
        );
        sync_inputs.push(radar_mod_rx);
        tasks.push(tokio::spawn(
            RadarWorker::new(processor, radar_counters, config.persist_raw)
                .run(raw_rx, radar_mod_tx),
        ));

        if config.imaging_enabled {
            let counters = metrics.counters(Modality::Imaging);
            let (tx, rx) = queue::bounded::<ModalityFrame>(
                32,
                OverflowPolicy::Block,
                Some(Arc::clone(&counters)),
            );
            sync_inputs.push(rx);
            let source = SynthImagingSource::new(
                320,
                240,
                config.frames,
                config.frame_period_ms,
                config.seed.wrapping_add(1),
            );
            tasks.push(tokio::spawn(
                SourcePump::new(source, counters, shutdown_rx.clone()).run::<ModalityFrame>(tx),
            ));
        }

        if config.landmarks_enabled {
            let counters = metrics.counters(Modality::Landmarks);
            let (tx, rx) = queue::bounded::<ModalityFrame>(
                32,
                OverflowPolicy::Block,
                Some(Arc::clone(&counters)),
            );
            sync_inputs.push(rx);
            let source = SynthLandmarkSource::new(
                config.frames,
                config.frame_period_ms,
                config.seed.wrapping_add(2),
            );
            tasks.push(tokio::spawn(
                SourcePump::new(source, counters, shutdown_rx.clone()).run::<ModalityFrame>(tx),
            ));
        }

        let matcher = FrameMatcher::new(config.sync_config(), modalities, &metrics);
        let (set_tx, mut set_rx) = queue::bounded(64, OverflowPolicy::Block, None);
        tasks.push(tokio::spawn(
            Synchronizer::new(matcher, sync_inputs, set_tx).run(),
        ));

        let mut sets_recorded = 0u64;
        while let Some(set) = set_rx.pop().await {
            match recorder.accept(set).await {
                Ok(()) => {
                    sets_recorded += 1;
                    bridge.publish(self.status_model(
                        recorder.state(),
                        &session_id,
                        &metrics,
                        &path_cell,
                        sets_recorded,
                    ));
                }
                Err(err) => {
                    error!("session aborted: {}", err);
                    break;
                }
            }
        }

        // On the abort path the upstream tasks may still be pushing; closing
        // the set queue from this side lets them finish.
        for set in set_rx.drain() {
            for modality in set.frames.keys() {
                metrics.counters(*modality).record_dropped(1);
            }
        }
        let _ = shutdown_tx.send(true);

        let summary = recorder.stop().await.context("stopping session")?;
        for task in tasks {
            let _ = task.await;
        }

        bridge.publish(self.status_model(
            recorder.state(),
            &session_id,
            &metrics,
            &path_cell,
            summary.sets_recorded,
        ));
        Ok(RunReport {
            summary,
            session_root,
        })
    }

    fn status_model(
        &self,
        state: RecorderState,
        session_id: &str,
        metrics: &PipelineMetrics,
        path_cell: &ExecutionPathCell,
        sets_recorded: u64,
    ) -> StatusModel {
        StatusModel {
            recorder_state: state.to_string(),
            session_id: Some(session_id.to_string()),
            execution_path: Some(path_cell.current().to_string()),
            counts: metrics.snapshot(),
            sync: metrics.sync().snapshot(),
            sets_recorded,
        }
    }
}
