use crate::prelude::Modality;
use crate::processing::PathEvent;
use crate::telemetry::{Counts, PipelineMetrics, SyncStatsSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Lifecycle of the recorder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderState::Idle => f.write_str("idle"),
            RecorderState::Recording => f.write_str("recording"),
            RecorderState::Stopping => f.write_str("stopping"),
        }
    }
}

/// Live record for one capture session.
///
/// Created by the recorder on `start` and finalized on `stop`. Counters are
/// mutated only by the recorder and the persistence workers; the failure
/// flag is how a worker escalates a storage error back to the recorder.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub started_at: f64,
    pub root: PathBuf,
    pub metrics: Arc<PipelineMetrics>,
    failure: Mutex<Option<String>>,
}

impl Session {
    pub fn new(id: String, started_at: f64, root: PathBuf, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            id,
            started_at,
            root,
            metrics,
            failure: Mutex::new(None),
        }
    }

    /// Flags the session failed; only the first failure is kept.
    pub fn fail(&self, reason: String) {
        if let Ok(mut slot) = self.failure.lock() {
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Snapshot returned by `stop` and embedded in `metadata.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: f64,
    pub stopped_at: f64,
    pub duration_seconds: f64,
    pub counts: BTreeMap<Modality, Counts>,
    pub sync: SyncStatsSnapshot,
    pub sets_recorded: u64,
    pub execution_path_history: Vec<PathEvent>,
    pub error: Option<String>,
    pub software_version: String,
}

impl SessionSummary {
    /// True for the empty summary a no-op `stop` returns.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_empty()
    }
}
