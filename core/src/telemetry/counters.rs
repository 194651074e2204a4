use crate::prelude::Modality;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Per-modality frame accounting.
///
/// Each unit a source delivers is counted produced exactly once, and later
/// counted exactly once as either accepted (durably written) or dropped
/// (with the reason logged at the drop site), so that after a drained stop
/// produced == accepted + dropped.
#[derive(Debug, Default)]
pub struct ModalityCounters {
    inner: Mutex<Counts>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub produced: u64,
    pub accepted: u64,
    pub dropped: u64,
}

impl ModalityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_produced(&self, n: u64) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.produced += n;
        }
    }

    pub fn record_accepted(&self, n: u64) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.accepted += n;
        }
    }

    pub fn record_dropped(&self, n: u64) {
        if let Ok(mut counts) = self.inner.lock() {
            counts.dropped += n;
        }
    }

    pub fn snapshot(&self) -> Counts {
        self.inner.lock().map(|c| *c).unwrap_or_default()
    }
}

/// Achieved synchronization statistics for one session.
#[derive(Debug, Default)]
pub struct SyncStats {
    inner: Mutex<SyncStatsInner>,
}

#[derive(Debug, Default)]
struct SyncStatsInner {
    sets: u64,
    partial_sets: u64,
    timeouts: u64,
    offset_sum_ms: f64,
    max_offset_ms: f64,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SyncStatsSnapshot {
    pub sets: u64,
    pub partial_sets: u64,
    pub timeouts: u64,
    pub mean_offset_ms: f64,
    pub max_offset_ms: f64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_set(&self, offset_ms: f64, partial: bool) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.sets += 1;
            if partial {
                stats.partial_sets += 1;
            }
            stats.offset_sum_ms += offset_ms;
            if offset_ms > stats.max_offset_ms {
                stats.max_offset_ms = offset_ms;
            }
        }
    }

    pub fn record_timeout(&self) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.timeouts += 1;
        }
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        let Ok(stats) = self.inner.lock() else {
            return SyncStatsSnapshot::default();
        };
        SyncStatsSnapshot {
            sets: stats.sets,
            partial_sets: stats.partial_sets,
            timeouts: stats.timeouts,
            mean_offset_ms: if stats.sets > 0 {
                stats.offset_sum_ms / stats.sets as f64
            } else {
                0.0
            },
            max_offset_ms: stats.max_offset_ms,
        }
    }
}

/// Aggregated live metrics shared across the pipeline's execution contexts.
#[derive(Debug)]
pub struct PipelineMetrics {
    per_modality: BTreeMap<Modality, Arc<ModalityCounters>>,
    sync: Arc<SyncStats>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let per_modality = Modality::ALL
            .iter()
            .map(|m| (*m, Arc::new(ModalityCounters::new())))
            .collect();
        Self {
            per_modality,
            sync: Arc::new(SyncStats::new()),
        }
    }

    pub fn counters(&self, modality: Modality) -> Arc<ModalityCounters> {
        // Seeded for every modality in `new`, so the lookup cannot miss.
        Arc::clone(&self.per_modality[&modality])
    }

    pub fn sync(&self) -> Arc<SyncStats> {
        Arc::clone(&self.sync)
    }

    pub fn snapshot(&self) -> BTreeMap<Modality, Counts> {
        self.per_modality
            .iter()
            .map(|(m, c)| (*m, c.snapshot()))
            .collect()
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
