//! Capture boundary: drives external frame sources into modality queues.
//!
//! All unit validation happens here — non-monotonic timestamps, duplicate
//! deliveries, and sequence gaps are rejected and counted, never passed
//! downstream. Every unit a source delivers is counted produced exactly
//! once; frames lost to a detected gap are counted both produced and
//! dropped so session totals reconcile.

use crate::prelude::{CaptureFrame, FrameSource, PipelineError, SourcePoll};
use crate::queue::{PushOutcome, QueueSender};
use crate::telemetry::ModalityCounters;
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Polling cadence while the source reports nothing ready.
const IDLE_POLL: Duration = Duration::from_millis(2);

/// Drives one frame source into its queue on a dedicated task.
pub struct SourcePump<S: FrameSource> {
    source: S,
    counters: Arc<ModalityCounters>,
    shutdown: watch::Receiver<bool>,
    last_sequence: Option<u64>,
    last_timestamp: Option<f64>,
}

impl<S: FrameSource> SourcePump<S> {
    pub fn new(
        source: S,
        counters: Arc<ModalityCounters>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            counters,
            shutdown,
            last_sequence: None,
            last_timestamp: None,
        }
    }

    /// Runs until the source is exhausted, shutdown is signalled, or the
    /// downstream queue closes. Closing the queue on exit lets the consumer
    /// drain and finish.
    pub async fn run<T>(mut self, output: QueueSender<T>)
    where
        T: From<S::Frame> + Send,
    {
        let modality = self.source.modality();
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.source.next_frame() {
                Ok(SourcePoll::Frame(frame)) => {
                    self.counters.record_produced(1);
                    if !self.admit(&frame) {
                        continue;
                    }
                    if output.push(frame.into()).await == PushOutcome::Closed {
                        self.counters.record_dropped(1);
                        break;
                    }
                }
                Ok(SourcePoll::Pending) => {
                    tokio::time::sleep(IDLE_POLL).await;
                }
                Ok(SourcePoll::Exhausted) => break,
                Err(err) => {
                    // A malformed unit was received and rejected at the
                    // boundary; it still entered the session's accounting.
                    warn!("{} source rejected a unit: {}", modality, err);
                    self.counters.record_produced(1);
                    self.counters.record_dropped(1);
                }
            }
        }
    }

    /// Boundary checks for one delivered frame. Returns false when the
    /// frame must not continue downstream (already counted dropped).
    fn admit(&mut self, frame: &S::Frame) -> bool {
        let modality = self.source.modality();
        let sequence = frame.sequence();
        let timestamp = frame.timestamp();

        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                warn!(
                    "{} frame {} regressed in time ({:.6} < {:.6}), rejected",
                    modality, sequence, timestamp, last
                );
                self.counters.record_dropped(1);
                return false;
            }
        }
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                warn!("{} frame {} re-delivered, rejected", modality, sequence);
                self.counters.record_dropped(1);
                return false;
            }
            if sequence > last + 1 {
                let lost = sequence - last - 1;
                warn!(
                    "{}: {} ({} frame(s) lost, not retried)",
                    modality,
                    PipelineError::PacketSequenceGap {
                        expected: last + 1,
                        got: sequence,
                    },
                    lost
                );
                self.counters.record_produced(lost);
                self.counters.record_dropped(lost);
            }
        }

        self.last_sequence = Some(sequence);
        self.last_timestamp = Some(timestamp);
        true
    }
}
