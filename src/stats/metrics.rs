//! Statistics metrics definitions
//!
//! Counters are relaxed atomics bumped on the hot paths of the adaptive hash
//! index. They are monotonic between calls to `reset`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Counters of the adaptive hash index
#[derive(Debug, Default)]
pub struct AhiStats {
    /// Guesses attempted (fold computed and looked up)
    pub searches: AtomicU64,
    /// Guesses that returned a verified cursor
    pub hash_succ: AtomicU64,
    /// Guesses whose candidate failed verification
    pub hash_fail: AtomicU64,
    /// Guesses whose fold had no entry
    pub hash_not_found: AtomicU64,
    /// Searches answered by a B-tree descent and fed to statistics
    pub non_hash_searches: AtomicU64,
    /// Pages hashed
    pub pages_added: AtomicU64,
    /// Pages whose entries were dropped
    pub pages_removed: AtomicU64,
    /// Entries inserted
    pub rows_added: AtomicU64,
    /// Entries removed
    pub rows_removed: AtomicU64,
    /// Row removals that found no matching entry
    pub rows_remove_not_found: AtomicU64,
    /// Entries redirected in place
    pub rows_updated: AtomicU64,
    /// Page builds abandoned after a concurrent change
    pub build_aborted: AtomicU64,
    /// Page drops repeated because parameters changed underneath
    pub drop_retries: AtomicU64,
    /// Inserts refused because the node heap had no spare block
    pub heap_exhausted: AtomicU64,
    corrupted: AtomicBool,
}

/// Point-in-time copy of [`AhiStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AhiCounters {
    /// See [`AhiStats::searches`]
    pub searches: u64,
    /// See [`AhiStats::hash_succ`]
    pub hash_succ: u64,
    /// See [`AhiStats::hash_fail`]
    pub hash_fail: u64,
    /// See [`AhiStats::hash_not_found`]
    pub hash_not_found: u64,
    /// See [`AhiStats::non_hash_searches`]
    pub non_hash_searches: u64,
    /// See [`AhiStats::pages_added`]
    pub pages_added: u64,
    /// See [`AhiStats::pages_removed`]
    pub pages_removed: u64,
    /// See [`AhiStats::rows_added`]
    pub rows_added: u64,
    /// See [`AhiStats::rows_removed`]
    pub rows_removed: u64,
    /// See [`AhiStats::rows_remove_not_found`]
    pub rows_remove_not_found: u64,
    /// See [`AhiStats::rows_updated`]
    pub rows_updated: u64,
    /// See [`AhiStats::build_aborted`]
    pub build_aborted: u64,
    /// See [`AhiStats::drop_retries`]
    pub drop_retries: u64,
    /// See [`AhiStats::heap_exhausted`]
    pub heap_exhausted: u64,
}

#[inline]
fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl AhiStats {
    /// Create zeroed stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a guess attempt
    pub fn record_search(&self) {
        bump(&self.searches, 1);
    }

    /// Record a verified guess
    pub fn record_hash_succ(&self) {
        bump(&self.hash_succ, 1);
    }

    /// Record a guess that failed verification
    pub fn record_hash_fail(&self) {
        bump(&self.hash_fail, 1);
    }

    /// Record a guess with no entry for its fold
    pub fn record_hash_not_found(&self) {
        bump(&self.hash_not_found, 1);
    }

    /// Record a search served by descent
    pub fn record_non_hash_search(&self) {
        bump(&self.non_hash_searches, 1);
    }

    /// Record a page build that inserted `rows` entries
    pub fn record_page_added(&self, rows: u64) {
        bump(&self.pages_added, 1);
        bump(&self.rows_added, rows);
    }

    /// Record a page drop that removed `rows` entries
    pub fn record_page_removed(&self, rows: u64) {
        bump(&self.pages_removed, 1);
        bump(&self.rows_removed, rows);
    }

    /// Record a single entry insert
    pub fn record_row_added(&self) {
        bump(&self.rows_added, 1);
    }

    /// Record a single entry removal attempt
    pub fn record_row_removed(&self, found: bool) {
        if found {
            bump(&self.rows_removed, 1);
        } else {
            bump(&self.rows_remove_not_found, 1);
        }
    }

    /// Record an in-place redirect
    pub fn record_row_updated(&self) {
        bump(&self.rows_updated, 1);
    }

    /// Record an abandoned build
    pub fn record_build_aborted(&self) {
        bump(&self.build_aborted, 1);
    }

    /// Record a drop retry
    pub fn record_drop_retry(&self) {
        bump(&self.drop_retries, 1);
    }

    /// Record a heap allocation refusal
    pub fn record_heap_exhausted(&self) {
        bump(&self.heap_exhausted, 1);
    }

    /// Flag that validation found an inconsistency
    pub fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Relaxed);
    }

    /// Whether validation ever found an inconsistency
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Relaxed)
    }

    /// Share of guesses that returned a verified cursor
    pub fn hit_rate(&self) -> f64 {
        let searches = self.searches.load(Ordering::Relaxed);
        if searches == 0 {
            return 0.0;
        }
        self.hash_succ.load(Ordering::Relaxed) as f64 / searches as f64
    }

    /// Copy the counters
    pub fn counters(&self) -> AhiCounters {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AhiCounters {
            searches: load(&self.searches),
            hash_succ: load(&self.hash_succ),
            hash_fail: load(&self.hash_fail),
            hash_not_found: load(&self.hash_not_found),
            non_hash_searches: load(&self.non_hash_searches),
            pages_added: load(&self.pages_added),
            pages_removed: load(&self.pages_removed),
            rows_added: load(&self.rows_added),
            rows_removed: load(&self.rows_removed),
            rows_remove_not_found: load(&self.rows_remove_not_found),
            rows_updated: load(&self.rows_updated),
            build_aborted: load(&self.build_aborted),
            drop_retries: load(&self.drop_retries),
            heap_exhausted: load(&self.heap_exhausted),
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.searches,
            &self.hash_succ,
            &self.hash_fail,
            &self.hash_not_found,
            &self.non_hash_searches,
            &self.pages_added,
            &self.pages_removed,
            &self.rows_added,
            &self.rows_removed,
            &self.rows_remove_not_found,
            &self.rows_updated,
            &self.build_aborted,
            &self.drop_retries,
            &self.heap_exhausted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.corrupted.store(false, Ordering::Relaxed);
    }
}

/// Occupancy of one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    /// Partition number
    pub id: usize,
    /// Bucket chains
    pub buckets: usize,
    /// Live hash nodes
    pub nodes: usize,
    /// Heap blocks holding nodes
    pub heap_blocks: usize,
    /// Whether a spare heap block is installed
    pub has_free_block: bool,
}

/// Full statistics snapshot of an adaptive hash index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AhiStatsSnapshot {
    /// Whether the index is enabled
    pub enabled: bool,
    /// Per-partition occupancy
    pub partitions: Vec<PartitionStats>,
    /// Sum of nodes over all partitions
    pub total_nodes: usize,
    /// Sum of heap blocks over all partitions
    pub total_heap_blocks: usize,
    /// Event counters
    pub counters: AhiCounters,
    /// Verified guesses per attempt
    pub hit_rate: f64,
    /// Validation found an inconsistency
    pub corrupted: bool,
}

impl AhiStatsSnapshot {
    /// Average chain length across all buckets
    pub fn load_factor(&self) -> f64 {
        let buckets: usize = self.partitions.iter().map(|p| p.buckets).sum();
        if buckets == 0 {
            return 0.0;
        }
        self.total_nodes as f64 / buckets as f64
    }
}
