use crate::frames::{ModalityFrame, SyncedFrameSet};
use crate::prelude::{CaptureFrame, Modality, PipelineError, UnmatchedPolicy};
use crate::telemetry::{ModalityCounters, PipelineMetrics, SyncStats};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Synchronization tuning, fixed for a whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum pairwise timestamp offset (τ) for a valid match.
    pub tolerance_ms: f64,
    /// Stream-time patience before a pending frame expires unmatched.
    pub wait_timeout_ms: f64,
    pub unmatched: UnmatchedPolicy,
    /// Per-modality pending cap; older entries are evicted beyond it.
    pub pending_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 50.0,
            wait_timeout_ms: 200.0,
            unmatched: UnmatchedPolicy::Drop,
            pending_depth: 16,
        }
    }
}

/// Single-threaded matching core.
///
/// Every enabled modality keeps a timestamp-ordered pending queue. A match
/// attempt anchors on each newly arrived frame: the nearest entry from every
/// other modality joins it if all pairwise offsets stay within τ. A complete
/// set always contains its latest member, so trying only on arrival finds
/// every possible match. Candidate selection is nearest-timestamp; an exact
/// tie keeps the earlier entry. Time only flows from observed frame
/// timestamps, which keeps matching deterministic and testable.
pub struct FrameMatcher {
    config: SyncConfig,
    modalities: Vec<Modality>,
    pending: BTreeMap<Modality, VecDeque<ModalityFrame>>,
    counters: BTreeMap<Modality, Arc<ModalityCounters>>,
    stats: Arc<SyncStats>,
    last_reference: Option<f64>,
    newest_seen: f64,
}

impl FrameMatcher {
    pub fn new(config: SyncConfig, modalities: Vec<Modality>, metrics: &PipelineMetrics) -> Self {
        let pending = modalities.iter().map(|m| (*m, VecDeque::new())).collect();
        let counters = modalities
            .iter()
            .map(|m| (*m, metrics.counters(*m)))
            .collect();
        Self {
            config,
            modalities,
            pending,
            counters,
            stats: metrics.sync(),
            last_reference: None,
            newest_seen: f64::NEG_INFINITY,
        }
    }

    pub fn modalities(&self) -> &[Modality] {
        &self.modalities
    }

    /// Feeds one frame and returns every frame set its arrival completed
    /// or expired, in emission order.
    pub fn offer(&mut self, frame: ModalityFrame) -> Vec<SyncedFrameSet> {
        let modality = frame.modality();
        if !self.modalities.contains(&modality) {
            warn!("frame for disabled modality {} discarded", modality);
            self.drop_counted(modality, 1);
            return Vec::new();
        }

        self.newest_seen = self.newest_seen.max(frame.timestamp());
        if let Some(queue) = self.pending.get_mut(&modality) {
            queue.push_back(frame);
            if queue.len() > self.config.pending_depth {
                queue.pop_front();
                debug!("{} pending queue overflow, oldest entry evicted", modality);
                self.drop_counted(modality, 1);
            }
        }

        let mut out: Vec<SyncedFrameSet> = self.match_arrival(modality).into_iter().collect();
        out.extend(self.sweep_expired(false));
        out
    }

    /// Emits or drops everything still pending; called at session teardown.
    pub fn flush(&mut self) -> Vec<SyncedFrameSet> {
        self.sweep_expired(true)
    }

    /// Tries to complete a set around the newest entry of `modality`.
    fn match_arrival(&mut self, modality: Modality) -> Option<SyncedFrameSet> {
        let queue = self.pending.get(&modality)?;
        let anchor_index = queue.len().checked_sub(1)?;
        let anchor_ts = queue.get(anchor_index)?.timestamp();

        let mut chosen = vec![(modality, anchor_index, anchor_ts)];
        for other in self.modalities.clone() {
            if other == modality {
                continue;
            }
            let (index, ts) = nearest_entry(self.pending.get(&other)?, anchor_ts)?;
            chosen.push((other, index, ts));
        }

        let min_ts = chosen.iter().map(|c| c.2).fold(f64::INFINITY, f64::min);
        let max_ts = chosen.iter().map(|c| c.2).fold(f64::NEG_INFINITY, f64::max);
        if (max_ts - min_ts) * 1000.0 > self.config.tolerance_ms {
            return None;
        }

        self.build_set(&chosen, Vec::new(), false)
    }

    /// Resolves pending frames whose synchronization window has expired,
    /// oldest first. With `expire_all` every pending frame is resolved.
    fn sweep_expired(&mut self, expire_all: bool) -> Vec<SyncedFrameSet> {
        let mut out = Vec::new();
        loop {
            let Some((anchor_modality, anchor_ts)) = self.oldest_head() else {
                break;
            };
            let waited_ms = (self.newest_seen - anchor_ts) * 1000.0;
            if !expire_all && waited_ms <= self.config.wait_timeout_ms {
                break;
            }
            if let Some(set) = self.expire_anchor(anchor_modality, anchor_ts) {
                out.push(set);
            }
        }
        out
    }

    /// The globally oldest pending entry; queues are ordered, so only heads
    /// need comparing.
    fn oldest_head(&self) -> Option<(Modality, f64)> {
        self.pending
            .iter()
            .filter_map(|(m, q)| q.front().map(|f| (*m, f.timestamp())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Handles one expired pending frame per the session's unmatched policy.
    fn expire_anchor(&mut self, anchor_modality: Modality, anchor_ts: f64) -> Option<SyncedFrameSet> {
        self.stats.record_timeout();
        match self.config.unmatched {
            UnmatchedPolicy::Drop => {
                let sequence = self
                    .pending
                    .get_mut(&anchor_modality)
                    .and_then(|q| q.pop_front())
                    .map(|f| f.sequence())
                    .unwrap_or_default();
                debug!(
                    "{}",
                    PipelineError::SyncTimeout {
                        modality: anchor_modality,
                        sequence,
                    }
                );
                self.drop_counted(anchor_modality, 1);
                None
            }
            UnmatchedPolicy::EmitPartial => {
                // Best-effort partners: nearest in-tolerance entry from each
                // other modality, kept only while pairwise offsets hold.
                let mut chosen = vec![(anchor_modality, 0usize, anchor_ts)];
                let mut missing = Vec::new();
                for modality in self.modalities.clone() {
                    if modality == anchor_modality {
                        continue;
                    }
                    let candidate = self
                        .pending
                        .get(&modality)
                        .and_then(|q| nearest_entry(q, anchor_ts))
                        .filter(|(_, ts)| {
                            chosen.iter().all(|(_, _, other)| {
                                (ts - other).abs() * 1000.0 <= self.config.tolerance_ms
                            })
                        });
                    match candidate {
                        Some((index, ts)) => chosen.push((modality, index, ts)),
                        None => missing.push(modality),
                    }
                }
                self.build_set(&chosen, missing, true)
            }
        }
    }

    /// Consumes the chosen entries, discards anything older in the same
    /// queues, and assembles the emitted set.
    fn build_set(
        &mut self,
        chosen: &[(Modality, usize, f64)],
        missing: Vec<Modality>,
        partial: bool,
    ) -> Option<SyncedFrameSet> {
        let reference = chosen.iter().map(|c| c.2).fold(f64::INFINITY, f64::min);
        let max_offset_ms =
            (chosen.iter().map(|c| c.2).fold(f64::NEG_INFINITY, f64::max) - reference).max(0.0)
                * 1000.0;

        if let Some(last) = self.last_reference {
            // A lagging source starting mid-session can offer history older
            // than what was already emitted; suppressing it preserves the
            // non-decreasing emission contract.
            if reference < last {
                warn!(
                    "stale frame set (ref {:.6} < {:.6}) suppressed",
                    reference, last
                );
                for (modality, index, _) in chosen {
                    if let Some(queue) = self.pending.get_mut(modality) {
                        queue.remove(*index);
                    }
                    self.drop_counted(*modality, 1);
                }
                return None;
            }
        }

        let mut frames = BTreeMap::new();
        for (modality, index, _) in chosen {
            let Some(queue) = self.pending.get_mut(modality) else {
                continue;
            };
            let Some(frame) = queue.remove(*index) else {
                continue;
            };
            // Older unconsumed entries can never join a later set; discard
            // them now to bound memory.
            if *index > 0 {
                queue.drain(..*index);
                self.drop_counted(*modality, *index as u64);
            }
            frames.insert(*modality, frame);
        }

        self.last_reference = Some(reference);
        self.stats.record_set(max_offset_ms, partial);
        Some(SyncedFrameSet {
            reference_timestamp: reference,
            max_offset_ms,
            frames,
            missing,
        })
    }

    fn drop_counted(&self, modality: Modality, n: u64) {
        if let Some(counters) = self.counters.get(&modality) {
            counters.record_dropped(n);
        }
    }
}

/// Index and timestamp of the entry closest to `target`. Queues are
/// timestamp-ordered, so the scan stops once entries pass the target; exact
/// ties keep the earlier entry.
fn nearest_entry(queue: &VecDeque<ModalityFrame>, target: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    let mut best_distance = f64::INFINITY;
    for (index, frame) in queue.iter().enumerate() {
        let ts = frame.timestamp();
        let distance = (ts - target).abs();
        if distance < best_distance {
            best_distance = distance;
            best = Some((index, ts));
        } else if ts > target {
            break;
        }
    }
    best
}
