use crate::frames::{ModalityFrame, SyncedFrameSet};
use crate::queue::{PushOutcome, QueueReceiver, QueueSender};
use crate::sync::matcher::FrameMatcher;
use std::time::Duration;

/// Polling cadence while every modality queue is momentarily empty.
const IDLE_POLL: Duration = Duration::from_millis(2);

/// Consumes all modality queues on one task and drives the matcher, so
/// matching decisions stay linearizable.
pub struct Synchronizer {
    matcher: FrameMatcher,
    inputs: Vec<QueueReceiver<ModalityFrame>>,
    output: QueueSender<SyncedFrameSet>,
}

impl Synchronizer {
    pub fn new(
        matcher: FrameMatcher,
        inputs: Vec<QueueReceiver<ModalityFrame>>,
        output: QueueSender<SyncedFrameSet>,
    ) -> Self {
        Self {
            matcher,
            inputs,
            output,
        }
    }

    /// Runs until every input queue is closed and drained, then flushes
    /// whatever is still pending. Dropping the output sender on return
    /// signals downstream completion.
    ///
    /// Queues are serviced round-robin, one frame per pass, so a backlogged
    /// modality cannot run stream time ahead and expire its peers.
    pub async fn run(mut self) {
        loop {
            let mut moved = false;
            for input in &mut self.inputs {
                if let Some(frame) = input.try_pop() {
                    moved = true;
                    for set in self.matcher.offer(frame) {
                        if self.output.push(set).await == PushOutcome::Closed {
                            return;
                        }
                    }
                }
            }
            if !moved {
                if self.inputs.iter().all(|input| input.is_finished()) {
                    break;
                }
                tokio::time::sleep(IDLE_POLL).await;
            }
        }
        for set in self.matcher.flush() {
            if self.output.push(set).await == PushOutcome::Closed {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ImagingFrame;
    use crate::frames::{Landmark, LandmarkFrame, POSE_LANDMARK_COUNT};
    use crate::prelude::{Modality, OverflowPolicy, UnmatchedPolicy};
    use crate::queue;
    use crate::sync::matcher::SyncConfig;
    use crate::telemetry::PipelineMetrics;

    fn imaging(sequence: u64, timestamp: f64) -> ModalityFrame {
        ModalityFrame::Imaging(
            ImagingFrame::new(2, 2, 1, vec![0; 4], sequence, timestamp).unwrap(),
        )
    }

    fn landmarks(sequence: u64, timestamp: f64) -> ModalityFrame {
        ModalityFrame::Landmarks(
            LandmarkFrame::new(
                vec![
                    Landmark {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        confidence: 1.0
                    };
                    POSE_LANDMARK_COUNT
                ],
                sequence,
                timestamp,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn synchronizer_pairs_streams_and_flushes_on_close() {
        let metrics = PipelineMetrics::new();
        let matcher = FrameMatcher::new(
            SyncConfig {
                unmatched: UnmatchedPolicy::EmitPartial,
                ..SyncConfig::default()
            },
            vec![Modality::Imaging, Modality::Landmarks],
            &metrics,
        );
        let (img_tx, img_rx) = queue::bounded(16, OverflowPolicy::Block, None);
        let (lm_tx, lm_rx) = queue::bounded(16, OverflowPolicy::Block, None);
        let (set_tx, mut set_rx) = queue::bounded(16, OverflowPolicy::Block, None);

        for i in 0..4u64 {
            let ts = 1.0 + i as f64 * 0.1;
            img_tx.push(imaging(i, ts)).await;
            lm_tx.push(landmarks(i, ts + 0.004)).await;
        }
        // One unmatched imaging frame resolves at flush.
        img_tx.push(imaging(9, 9.0)).await;
        drop(img_tx);
        drop(lm_tx);

        let task = tokio::spawn(Synchronizer::new(matcher, vec![img_rx, lm_rx], set_tx).run());

        let mut sets = Vec::new();
        while let Some(set) = set_rx.pop().await {
            sets.push(set);
        }
        task.await.unwrap();

        assert_eq!(sets.len(), 5);
        assert!(sets[..4].iter().all(|s| !s.is_partial()));
        assert!(sets[4].is_partial());
        let mut last = f64::NEG_INFINITY;
        for set in &sets {
            assert!(set.reference_timestamp >= last);
            last = set.reference_timestamp;
        }
    }
}
