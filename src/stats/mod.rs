//! Statistics for the adaptive hash index
//!
//! Event counters live in [`AhiStats`]; [`crate::AdaptiveHashIndex::stats_snapshot`]
//! combines them with per-partition occupancy into an [`AhiStatsSnapshot`]
//! that a [`StatsReporter`] can render.

pub mod metrics;
pub mod reporter;

pub use metrics::{AhiCounters, AhiStats, AhiStatsSnapshot, PartitionStats};
pub use reporter::{ReportFormat, StatsReporter};
