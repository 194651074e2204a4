use fusioncore::prelude::Modality;
use fusioncore::telemetry::{Counts, SyncStatsSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Live status served to external consumers (GUI, dashboards).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusModel {
    pub recorder_state: String,
    pub session_id: Option<String>,
    pub execution_path: Option<String>,
    pub counts: BTreeMap<Modality, Counts>,
    pub sync: SyncStatsSnapshot,
    pub sets_recorded: u64,
}
