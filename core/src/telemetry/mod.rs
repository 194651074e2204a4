pub mod counters;

pub use counters::{Counts, ModalityCounters, PipelineMetrics, SyncStats, SyncStatsSnapshot};
