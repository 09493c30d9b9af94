//! Consistency check of the hash tables against the pages they point into.

use std::collections::HashMap;

use serde::Serialize;

use super::build::representative_folds;
use super::AdaptiveHashIndex;
use crate::buf::{BufferPool, LatchMode};
use crate::dict::IndexId;
use crate::fold::fold_record;

/// Outcome of [`AdaptiveHashIndex::validate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidateReport {
    /// Nodes examined
    pub nodes: usize,
    /// Nodes whose page was latched by someone else and could not be checked
    pub skipped: usize,
    /// Nodes in the wrong bucket, pointing at a missing record, or whose
    /// fold no longer matches the record
    pub mismatches: usize,
    /// Record runs inside a hashed page with no entry pointing into it
    pub missing: usize,
    /// Indexes whose hashed page count disagrees with their reference count
    pub ref_count_errors: usize,
}

impl ValidateReport {
    /// Whether no inconsistency was found
    pub fn is_ok(&self) -> bool {
        self.mismatches == 0 && self.missing == 0 && self.ref_count_errors == 0
    }
}

impl AdaptiveHashIndex {
    /// Check every node of every partition against the page it points to,
    /// and every hashed page for runs that lost their entry.
    ///
    /// All partitions are latched exclusively for the duration. Pages are
    /// only try-latched; nodes on busy pages are counted as skipped. Any
    /// inconsistency marks the statistics as corrupted.
    ///
    /// The first and last run of a page may continue on a sibling whose
    /// build took over the entry, so only the runs in between are required
    /// to have one.
    pub fn validate(&self, pool: &BufferPool) -> ValidateReport {
        let tables: Vec<_> = self.partitions.iter().map(|p| p.write()).collect();
        let mut report = ValidateReport::default();

        for (pno, table) in tables.iter().enumerate() {
            for (bucket, node) in table.entries() {
                report.nodes += 1;
                if table.bucket_of(node.fold) != bucket {
                    report.mismatches += 1;
                    tracing::error!(partition = pno, bucket, fold = node.fold, "hash node in wrong bucket");
                    continue;
                }
                let Some(block) = pool.get_block(node.rec.block) else {
                    report.mismatches += 1;
                    tracing::error!(partition = pno, block = %node.rec.block, "hash node points outside the pool");
                    continue;
                };
                if block.hash_state().index() != Some(node.index_id) {
                    report.mismatches += 1;
                    tracing::error!(
                        partition = pno,
                        block = %block.id(),
                        index = %node.index_id,
                        "hash node points into a page not hashed under its index"
                    );
                    continue;
                }
                let Some(guard) = block.try_latch(LatchMode::SearchLeaf) else {
                    report.skipped += 1;
                    continue;
                };
                let Some(rec) = guard.record(node.rec.heap_no) else {
                    report.mismatches += 1;
                    tracing::error!(block = %block.id(), heap_no = node.rec.heap_no, "hash node points at a missing record");
                    continue;
                };
                let prefix = block.hash_state().current();
                let fold = fold_record(rec, prefix.n_fields, prefix.n_bytes, node.index_id);
                if fold != node.fold {
                    report.mismatches += 1;
                    tracing::error!(
                        block = %block.id(),
                        heap_no = node.rec.heap_no,
                        stored = node.fold,
                        actual = fold,
                        "hash node fold does not match its record"
                    );
                }
            }
        }

        let mut hashed: HashMap<IndexId, usize> = HashMap::new();
        for block in pool.blocks() {
            let Some(id) = block.hash_state().index() else {
                continue;
            };
            *hashed.entry(id).or_default() += 1;

            let Some(guard) = block.try_latch(LatchMode::SearchLeaf) else {
                continue;
            };
            let table = &tables[self.partition_of(id)];
            let runs = representative_folds(&guard, id, block.hash_state().current());
            let inner = runs.len().saturating_sub(2);
            for &(fold, heap_no) in runs.iter().skip(1).take(inner) {
                if table.search(fold).map(|rec| rec.block) != Some(block.id()) {
                    report.missing += 1;
                    tracing::error!(block = %block.id(), index = %id, heap_no, fold, "hashed page record has no entry");
                }
            }
        }
        for index in self.indexes.read().values() {
            let pages = hashed.get(&index.id()).copied().unwrap_or(0);
            let refs = index.search_info().ref_count();
            if pages != refs {
                report.ref_count_errors += 1;
                tracing::error!(index = %index.id(), pages, ref_count = refs, "hashed page count mismatch");
            }
        }
        drop(tables);

        if !report.is_ok() {
            self.stats.mark_corrupted();
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                nodes = report.nodes,
                skipped = report.skipped,
                mismatches = report.mismatches,
                missing = report.missing,
                ref_count_errors = report.ref_count_errors,
                "adaptive hash index validated"
            );
        }
        report
    }
}
