//! Statistics reporter
//!
//! Provides formatting and output for adaptive hash index statistics.

use std::fmt::Write;

use crate::stats::metrics::AhiStatsSnapshot;

/// Output format for statistics reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
    /// Compact one-line format
    Compact,
}

/// Statistics reporter
pub struct StatsReporter {
    format: ReportFormat,
    detailed: bool,
}

impl StatsReporter {
    /// Create a new reporter with the given format
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            detailed: true,
        }
    }

    /// Create a reporter with text format
    pub fn text() -> Self {
        Self::new(ReportFormat::Text)
    }

    /// Create a reporter with JSON format
    pub fn json() -> Self {
        Self::new(ReportFormat::Json)
    }

    /// Set whether to include per-partition lines
    pub fn with_detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    /// Generate a report from a snapshot
    pub fn report(&self, snapshot: &AhiStatsSnapshot) -> String {
        match self.format {
            ReportFormat::Text => self.format_text(snapshot),
            ReportFormat::Json => self.format_json(snapshot),
            ReportFormat::Compact => self.format_compact(snapshot),
        }
    }

    fn format_text(&self, snapshot: &AhiStatsSnapshot) -> String {
        let c = &snapshot.counters;
        let mut output = String::new();

        writeln!(output, "=== Adaptive Hash Index ===").unwrap();
        writeln!(
            output,
            "Enabled: {}{}",
            snapshot.enabled,
            if snapshot.corrupted { " (CORRUPTED)" } else { "" }
        )
        .unwrap();
        writeln!(output).unwrap();

        writeln!(output, "Searches:").unwrap();
        writeln!(
            output,
            "  Hash:     {} (succ: {}, fail: {}, not found: {}, rate: {:.2}%)",
            c.searches,
            c.hash_succ,
            c.hash_fail,
            c.hash_not_found,
            snapshot.hit_rate * 100.0
        )
        .unwrap();
        writeln!(output, "  Non-hash: {}", c.non_hash_searches).unwrap();
        writeln!(output).unwrap();

        writeln!(output, "Maintenance:").unwrap();
        writeln!(
            output,
            "  Pages:    +{} / -{} (aborted builds: {}, drop retries: {})",
            c.pages_added, c.pages_removed, c.build_aborted, c.drop_retries
        )
        .unwrap();
        writeln!(
            output,
            "  Rows:     +{} / -{} (updated: {}, remove misses: {})",
            c.rows_added, c.rows_removed, c.rows_updated, c.rows_remove_not_found
        )
        .unwrap();
        writeln!(output, "  Heap exhausted: {}", c.heap_exhausted).unwrap();
        writeln!(output).unwrap();

        writeln!(output, "Table:").unwrap();
        writeln!(output, "  Nodes:       {}", snapshot.total_nodes).unwrap();
        writeln!(output, "  Heap blocks: {}", snapshot.total_heap_blocks).unwrap();
        writeln!(output, "  Load factor: {:.4}", snapshot.load_factor()).unwrap();

        if self.detailed {
            for p in &snapshot.partitions {
                writeln!(
                    output,
                    "  [{}] buckets={} nodes={} heap_blocks={} spare={}",
                    p.id, p.buckets, p.nodes, p.heap_blocks, p.has_free_block
                )
                .unwrap();
            }
        }

        output
    }

    fn format_json(&self, snapshot: &AhiStatsSnapshot) -> String {
        let rendered = if self.detailed {
            serde_json::to_string_pretty(snapshot)
        } else {
            let mut brief = snapshot.clone();
            brief.partitions.clear();
            serde_json::to_string_pretty(&brief)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn format_compact(&self, snapshot: &AhiStatsSnapshot) -> String {
        let c = &snapshot.counters;
        format!(
            "ahi={} searches={} succ={} fail={} miss={} rate={:.2}% nodes={} pages=+{}/-{}",
            if snapshot.enabled { "on" } else { "off" },
            c.searches,
            c.hash_succ,
            c.hash_fail,
            c.hash_not_found,
            snapshot.hit_rate * 100.0,
            snapshot.total_nodes,
            c.pages_added,
            c.pages_removed
        )
    }
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::text()
    }
}
