//! Whole-page maintenance: build, drop and relocation of a page's entries.

use super::search_info::HashPrefix;
use super::AdaptiveHashIndex;
use crate::buf::{Block, BufferPool, LatchMode, Page, PageId};
use crate::dict::{Index, IndexId};
use crate::fold::{fold_record, Fold};
use crate::record::{HeapNo, Record, RecordRef};
use crate::status::Status;

/// Passes over the pool before `drop_all_for_index` reports `Busy`
const DROP_ALL_MAX_PASSES: usize = 64;

/// Folds of the records that represent each run of equal folds on `page`:
/// the left-most record of a run when `prefix.left_side`, else the right-most.
pub(super) fn representative_folds(page: &Page, index_id: IndexId, prefix: HashPrefix) -> Vec<(Fold, HeapNo)> {
    let fold_of = |rec: &Record| fold_record(rec, prefix.n_fields, prefix.n_bytes, index_id);
    let mut out = Vec::with_capacity(page.n_recs());
    let mut records = page.user_records();
    let Some((first_heap_no, first)) = records.next() else {
        return out;
    };

    let mut heap_no = first_heap_no;
    let mut fold = fold_of(first);
    if prefix.left_side {
        out.push((fold, heap_no));
    }
    for (next_heap_no, rec) in records {
        let next_fold = fold_of(rec);
        if next_fold != fold {
            if prefix.left_side {
                out.push((next_fold, next_heap_no));
            } else {
                out.push((fold, heap_no));
            }
        }
        heap_no = next_heap_no;
        fold = next_fold;
    }
    if !prefix.left_side {
        out.push((fold, heap_no));
    }
    out
}

/// Distinct consecutive folds of every user record on `page`
fn page_folds(page: &Page, index_id: IndexId, prefix: HashPrefix) -> Vec<Fold> {
    let mut folds: Vec<Fold> = page
        .user_records()
        .map(|(_, rec)| fold_record(rec, prefix.n_fields, prefix.n_bytes, index_id))
        .collect();
    folds.dedup();
    folds
}

impl AdaptiveHashIndex {
    /// Hash every record run of `page` under `index` with `prefix`.
    ///
    /// The caller holds a shared or exclusive latch on the page. Entries of
    /// a previous build with other parameters are dropped first. Returns
    /// `Aborted` when a concurrent build installed different parameters
    /// between the fold computation and the insertion.
    pub fn build_page_hash(&self, index: &Index, block: &Block, page: &Page, prefix: HashPrefix) -> Status {
        if index.is_insert_buffer() {
            return Status::InvalidOperation;
        }
        if page.index_id() != Some(index.id()) {
            return Status::InvalidArgument;
        }
        if !self.is_enabled() {
            return Status::Disabled;
        }
        let state = block.hash_state();
        let partition = self.partition_for(index);

        let rebuild = {
            let _table = partition.read();
            state.index().is_some() && !state.is_hashed_with(index.id(), prefix)
        };
        if rebuild {
            self.drop_page_hash(block, page);
        }

        if page.n_recs() == 0 {
            return Status::NotFound;
        }
        if !prefix.is_valid_for(index.n_unique_in_tree()) {
            return Status::InvalidArgument;
        }

        let entries = representative_folds(page, index.id(), prefix);
        let mut table = partition.write_reserved(entries.len());
        if !self.is_enabled() {
            self.stats.record_build_aborted();
            return Status::Disabled;
        }
        let was_hashed = match state.index() {
            Some(id) if id != index.id() || state.current() != prefix => {
                drop(table);
                self.stats.record_build_aborted();
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(block = %block.id(), index = %index.id(), "page hash build aborted");
                }
                return Status::Aborted;
            }
            Some(_) => true,
            None => false,
        };

        let mut added = 0u64;
        for &(fold, heap_no) in &entries {
            if let Err(status) = table.insert(fold, RecordRef::new(block.id(), heap_no), index.id()) {
                // A page is either fully hashed or not hashed at all.
                for fold in page_folds(page, index.id(), prefix) {
                    table.remove_all_to_page(fold, block.id());
                }
                if was_hashed {
                    state.clear_index();
                    index.search_info().dec_ref_count();
                }
                drop(table);
                self.stats.record_heap_exhausted();
                tracing::warn!(block = %block.id(), index = %index.id(), added, "page hash build ran out of heap");
                return status;
            }
            added += 1;
        }
        if !was_hashed {
            index.search_info().inc_ref_count();
        }
        state.set_n_hash_helps(0);
        state.install(index.id(), prefix);
        drop(table);

        self.stats.record_page_added(added);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                block = %block.id(),
                page = %page.id(),
                index = %index.id(),
                n_fields = prefix.n_fields,
                n_bytes = prefix.n_bytes,
                left_side = prefix.left_side,
                rows = added,
                "page hashed"
            );
        }
        Status::Ok
    }

    /// Remove every entry pointing into `block`.
    ///
    /// The caller holds a latch on the page (exclusive, or shared while no
    /// other thread can modify it). A no-op for pages that are not hashed.
    /// Retries when the parameters change between computing folds and
    /// taking the partition latch.
    pub fn drop_page_hash(&self, block: &Block, page: &Page) {
        let state = block.hash_state();
        loop {
            let Some(index_id) = state.index() else {
                return;
            };
            let partition = &self.partitions[self.partition_of(index_id)];
            let prefix = {
                let _table = partition.read();
                match state.index() {
                    Some(id) if id == index_id => state.current(),
                    Some(_) => {
                        self.stats.record_drop_retry();
                        continue;
                    }
                    None => return,
                }
            };

            if page.index_id() != Some(index_id) {
                tracing::warn!(block = %block.id(), page = %page.id(), index = %index_id, "hashed page belongs to another index");
            }
            let folds = page_folds(page, index_id, prefix);

            let mut table = partition.write();
            match state.index() {
                None => return,
                Some(id) if id != index_id || state.current() != prefix => {
                    drop(table);
                    self.stats.record_drop_retry();
                    if tracing::enabled!(tracing::Level::DEBUG) {
                        tracing::debug!(block = %block.id(), "hash parameters changed during drop, retrying");
                    }
                    continue;
                }
                Some(_) => {}
            }

            let mut removed = 0usize;
            for fold in folds {
                removed += table.remove_all_to_page(fold, block.id());
            }
            match self.lookup_index(index_id) {
                Some(index) => index.search_info().dec_ref_count(),
                None => tracing::warn!(index = %index_id, "hashed page of an unregistered index"),
            }
            state.clear_index();
            drop(table);

            self.stats.record_page_removed(removed as u64);
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(block = %block.id(), index = %index_id, rows = removed, "page hash dropped");
            }
            return;
        }
    }

    /// Drop the entries of `block`, latching its page exclusively first.
    /// The caller must not hold the page latch.
    pub fn drop_page(&self, block: &Block) {
        if !block.hash_state().is_hashed() {
            return;
        }
        let guard = block.latch(LatchMode::ModifyLeaf);
        self.drop_page_hash(block, &guard);
    }

    /// Drop the entries of a page whose file space is being freed, if the
    /// page is resident. Must be called without holding any page latch of
    /// the index.
    pub fn drop_page_when_freed(&self, pool: &BufferPool, page_id: PageId) {
        let Some(block) = pool.lookup(page_id) else {
            return;
        };
        if !block.hash_state().is_hashed() {
            return;
        }
        let guard = block.latch(LatchMode::ModifyLeaf);
        if block.page_id() == Some(page_id) {
            self.drop_page_hash(block, &guard);
        }
    }

    /// Relocate hash coverage after records moved from `old` to `new`
    /// (page split or merge). Both pages are latched exclusively.
    ///
    /// `new` is built with its own parameters if it is already hashed,
    /// else with those of `old`; `old` is dropped afterwards, so every
    /// moved record stays reachable throughout.
    pub fn move_or_delete(
        &self,
        index: &Index,
        new_block: &Block,
        new_page: &Page,
        old_block: &Block,
        old_page: &Page,
    ) {
        let partition = self.partition_for(index);
        let prefix = {
            let _table = partition.read();
            let new_state = new_block.hash_state();
            let old_state = old_block.hash_state();
            if new_state.is_hashed() {
                (new_state.index() == Some(index.id())).then(|| new_state.current())
            } else {
                (old_state.index() == Some(index.id())).then(|| old_state.current())
            }
        };

        if let Some(prefix) = prefix {
            if new_page.n_recs() > 0 {
                new_block.hash_state().set_recommended(prefix);
                let status = self.build_page_hash(index, new_block, new_page, prefix);
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(from = %old_block.id(), to = %new_block.id(), %status, "page hash moved");
                }
            }
        }
        self.drop_page_hash(old_block, old_page);
    }

    /// Drop every page hashed under `index`, e.g. before the index is
    /// removed. Latches each candidate page exclusively; the caller must
    /// not hold page latches of the index.
    pub fn drop_all_for_index(&self, pool: &BufferPool, index: &Index) -> Status {
        for pass in 0..DROP_ALL_MAX_PASSES {
            for block in pool.blocks() {
                if block.hash_state().index() != Some(index.id()) {
                    continue;
                }
                let guard = block.latch(LatchMode::ModifyLeaf);
                if block.hash_state().index() == Some(index.id()) {
                    self.drop_page_hash(block, &guard);
                }
            }
            if index.search_info().ref_count() == 0 {
                return Status::Ok;
            }
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(index = %index.id(), pass, remaining = index.search_info().ref_count(), "pages still hashed");
            }
            std::thread::yield_now();
        }
        Status::Busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf::{BufferPool, BufferPoolConfig};
    use crate::dict::IndexMeta;
    use std::sync::Arc;

    struct Fixture {
        pool: BufferPool,
        ahi: AdaptiveHashIndex,
        index: Arc<Index>,
    }

    fn fixture() -> Fixture {
        let pool = BufferPool::new(BufferPoolConfig {
            blocks: 4,
            page_capacity: 16,
        });
        let ahi = AdaptiveHashIndex::with_size(64, 2).unwrap();
        let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "pk", 2, 2));
        Fixture { pool, ahi, index }
    }

    fn fill<'a>(f: &'a Fixture, page_no: u32, rows: &[[u64; 2]]) -> &'a Block {
        let block = f.pool.create_page(PageId::new(0, page_no), IndexId::new(1)).unwrap();
        let mut guard = block.latch(LatchMode::ModifyLeaf);
        let page = guard.page_mut().unwrap();
        for row in rows {
            page.push_back(Record::from_u64s(row)).unwrap();
        }
        block
    }

    fn nodes(f: &Fixture) -> usize {
        f.ahi.stats_snapshot().total_nodes
    }

    #[test]
    fn test_representative_folds_left_and_right() {
        let mut page = Page::new(PageId::new(0, 0), Some(IndexId::new(1)), 8);
        for row in [[1, 1], [1, 2], [2, 1], [3, 1], [3, 2]] {
            page.push_back(Record::from_u64s(&row)).unwrap();
        }
        let heaps: Vec<HeapNo> = page.user_records().map(|(h, _)| h).collect();

        let left = representative_folds(&page, IndexId::new(1), HashPrefix::new(1, 0, true));
        let left_heaps: Vec<HeapNo> = left.iter().map(|e| e.1).collect();
        assert_eq!(left_heaps, vec![heaps[0], heaps[2], heaps[3]]);

        let right = representative_folds(&page, IndexId::new(1), HashPrefix::new(1, 0, false));
        let right_heaps: Vec<HeapNo> = right.iter().map(|e| e.1).collect();
        assert_eq!(right_heaps, vec![heaps[1], heaps[2], heaps[4]]);

        assert_eq!(page_folds(&page, IndexId::new(1), HashPrefix::new(1, 0, true)).len(), 3);
    }

    #[test]
    fn test_build_and_drop() {
        let f = fixture();
        let block = fill(&f, 1, &[[1, 0], [2, 0], [3, 0]]);
        let guard = block.latch(LatchMode::SearchLeaf);

        let prefix = HashPrefix::new(1, 0, true);
        assert_eq!(f.ahi.build_page_hash(&f.index, block, &guard, prefix), Status::Ok);
        assert_eq!(f.index.search_info().ref_count(), 1);
        assert!(block.hash_state().is_hashed_with(IndexId::new(1), prefix));
        assert_eq!(nodes(&f), 3);

        f.ahi.drop_page_hash(block, &guard);
        assert_eq!(f.index.search_info().ref_count(), 0);
        assert!(!block.hash_state().is_hashed());
        assert_eq!(nodes(&f), 0);

        // Dropping an unhashed page is a no-op.
        f.ahi.drop_page_hash(block, &guard);
        assert_eq!(f.index.search_info().ref_count(), 0);
    }

    #[test]
    fn test_rebuild_with_new_prefix_keeps_ref_count() {
        let f = fixture();
        let block = fill(&f, 1, &[[1, 1], [1, 2], [2, 1]]);
        let guard = block.latch(LatchMode::SearchLeaf);

        f.ahi.build_page_hash(&f.index, block, &guard, HashPrefix::new(1, 0, true));
        assert_eq!(nodes(&f), 2);
        f.ahi.build_page_hash(&f.index, block, &guard, HashPrefix::new(2, 0, true));
        assert_eq!(nodes(&f), 3);
        assert_eq!(f.index.search_info().ref_count(), 1);
        assert_eq!(block.hash_state().current(), HashPrefix::new(2, 0, true));
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let f = fixture();
        let empty = fill(&f, 1, &[]);
        let guard = empty.latch(LatchMode::SearchLeaf);
        assert_eq!(
            f.ahi.build_page_hash(&f.index, empty, &guard, HashPrefix::DEFAULT),
            Status::NotFound
        );
        drop(guard);

        let block = fill(&f, 2, &[[1, 1]]);
        let guard = block.latch(LatchMode::SearchLeaf);
        assert_eq!(
            f.ahi.build_page_hash(&f.index, block, &guard, HashPrefix::new(2, 1, true)),
            Status::InvalidArgument
        );
        assert_eq!(f.index.search_info().ref_count(), 0);

        f.ahi.disable(&f.pool);
        assert_eq!(
            f.ahi.build_page_hash(&f.index, block, &guard, HashPrefix::DEFAULT),
            Status::Disabled
        );
    }

    #[test]
    fn test_move_builds_new_then_drops_old() {
        let f = fixture();
        let old = fill(&f, 1, &[[1, 0], [2, 0], [3, 0], [4, 0]]);
        let new = fill(&f, 2, &[[3, 0], [4, 0]]);
        let prefix = HashPrefix::new(1, 0, true);
        {
            let old_guard = old.latch(LatchMode::ModifyLeaf);
            f.ahi.build_page_hash(&f.index, old, &old_guard, prefix);
        }

        let mut old_guard = old.latch(LatchMode::ModifyLeaf);
        let new_guard = new.latch(LatchMode::ModifyLeaf);
        f.ahi.move_or_delete(&f.index, new, &new_guard, old, &old_guard);

        assert!(!old.hash_state().is_hashed());
        assert!(new.hash_state().is_hashed_with(IndexId::new(1), prefix));
        assert_eq!(f.index.search_info().ref_count(), 1);

        let p = f.ahi.partition_for(&f.index);
        assert_eq!(p.read().count_to_page(old.id()), 0);
        assert_eq!(p.read().count_to_page(new.id()), 2);

        let third = old_guard.next(old_guard.next(old_guard.first()));
        old_guard.page_mut().unwrap().truncate_from(third);
    }

    #[test]
    fn test_move_into_hashed_page_keeps_its_parameters() {
        let f = fixture();
        let left = fill(&f, 1, &[[1, 0], [2, 0]]);
        let right = fill(&f, 2, &[[5, 0]]);
        let prefix = HashPrefix::new(1, 0, true);
        {
            let g = left.latch(LatchMode::ModifyLeaf);
            f.ahi.build_page_hash(&f.index, left, &g, prefix);
            let g = right.latch(LatchMode::ModifyLeaf);
            f.ahi.build_page_hash(&f.index, right, &g, prefix);
        }
        assert_eq!(f.index.search_info().ref_count(), 2);

        let lg = left.latch(LatchMode::ModifyLeaf);
        let rg = right.latch(LatchMode::ModifyLeaf);
        f.ahi.move_or_delete(&f.index, left, &lg, right, &rg);
        assert!(left.hash_state().is_hashed());
        assert!(!right.hash_state().is_hashed());
        assert_eq!(f.index.search_info().ref_count(), 1);
    }

    #[test]
    fn test_move_into_hashed_page_covers_moved_records() {
        let f = fixture();
        let first = fill(&f, 1, &[[1, 0]]);
        let right = fill(&f, 2, &[[5, 0], [6, 0]]);
        let prefix = HashPrefix::new(1, 0, true);
        for block in [first, right] {
            let g = block.latch(LatchMode::ModifyLeaf);
            f.ahi.build_page_hash(&f.index, block, &g, prefix);
        }

        let mut fg = first.latch(LatchMode::ModifyLeaf);
        let rg = right.latch(LatchMode::ModifyLeaf);
        for row in [[5, 0], [6, 0]] {
            fg.page_mut().unwrap().push_back(Record::from_u64s(&row)).unwrap();
        }
        f.ahi.move_or_delete(&f.index, first, &fg, right, &rg);

        let p = f.ahi.partition_for(&f.index);
        assert_eq!(p.read().count_to_page(first.id()), 3);
        assert_eq!(p.read().count_to_page(right.id()), 0);
        assert_eq!(f.index.search_info().ref_count(), 1);
        drop((fg, rg));
        assert!(f.ahi.validate(&f.pool).is_ok());
    }

    #[test]
    fn test_drop_when_freed_and_drop_all() {
        let f = fixture();
        let a = fill(&f, 1, &[[1, 0]]);
        let b = fill(&f, 2, &[[2, 0]]);
        for block in [a, b] {
            let g = block.latch(LatchMode::SearchLeaf);
            f.ahi.build_page_hash(&f.index, block, &g, HashPrefix::DEFAULT);
        }
        assert_eq!(f.index.search_info().ref_count(), 2);

        f.ahi.drop_page_when_freed(&f.pool, PageId::new(0, 1));
        assert!(!a.hash_state().is_hashed());
        assert_eq!(f.index.search_info().ref_count(), 1);

        f.ahi.drop_page_when_freed(&f.pool, PageId::new(0, 99));
        f.ahi.drop_page(a);
        assert_eq!(f.index.search_info().ref_count(), 1);
        assert_eq!(f.ahi.drop_all_for_index(&f.pool, &f.index), Status::Ok);
        assert_eq!(f.index.search_info().ref_count(), 0);
        assert_eq!(nodes(&f), 0);
    }

    #[test]
    fn test_evict_hook_drops_entries() {
        let f = fixture();
        let block = fill(&f, 1, &[[1, 0], [2, 0]]);
        {
            let g = block.latch(LatchMode::SearchLeaf);
            f.ahi.build_page_hash(&f.index, block, &g, HashPrefix::DEFAULT);
        }
        assert_eq!(f.pool.evict(PageId::new(0, 1), &f.ahi), Status::Ok);
        assert_eq!(f.index.search_info().ref_count(), 0);
        assert_eq!(nodes(&f), 0);
    }
}
