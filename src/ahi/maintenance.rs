//! Statistics feedback after B-tree searches and row-level upkeep of the
//! hash entries on insert and delete.

use super::AdaptiveHashIndex;
use crate::btr::{Cursor, CursorFlag};
use crate::buf::Block;
use crate::constants::{BUILD_LIMIT, PAGE_BUILD_LIMIT};
use crate::dict::Index;
use crate::fold::{fold_record, Fold};
use crate::record::RecordRef;

impl AdaptiveHashIndex {
    /// Feed the outcome of a B-tree search back into the statistics of
    /// `index` and of the cursor's page, building the page hash when the
    /// page has earned it. The cursor's page latch is held throughout.
    ///
    /// Cursors positioned by the hash index carry no new information and
    /// are ignored.
    pub fn info_update(&self, index: &Index, cursor: &Cursor<'_>) {
        if index.is_insert_buffer() || cursor.flag() == CursorFlag::Hash {
            return;
        }
        self.stats.record_non_hash_search();

        let info = index.search_info();
        info.update_hash(&cursor.matches(), index.n_unique_in_tree());
        let build = self.update_block_hash_info(index, cursor.block(), cursor.page().n_recs());

        if cursor.flag() == CursorFlag::HashFail {
            self.update_hash_ref(index, cursor);
        }

        if build && self.is_enabled() {
            let prefix = cursor.block().hash_state().recommended();
            let status = self.build_page_hash(index, cursor.block(), cursor.page(), prefix);
            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(index = %index.id(), block = %cursor.block().id(), %status, "page build requested");
            }
        }
    }

    // Returns whether the page should be (re)built now.
    fn update_block_hash_info(&self, index: &Index, block: &Block, n_recs: usize) -> bool {
        let info = index.search_info();
        let state = block.hash_state();
        let prefix = info.prefix();
        info.set_last_hash_succ(false);

        if state.n_hash_helps() > 0 && info.n_hash_potential() > 0 && state.recommended() == prefix {
            state.bump_n_hash_helps();
            if state.is_hashed_with(index.id(), prefix) {
                info.set_last_hash_succ(true);
            }
        } else {
            state.set_n_hash_helps(1);
            state.set_recommended(prefix);
        }

        if index.does_not_fit_in_memory() {
            state.set_n_hash_helps(0);
        }

        let helps = state.n_hash_helps() as usize;
        helps > n_recs / PAGE_BUILD_LIMIT
            && info.n_hash_potential() >= BUILD_LIMIT
            && (!state.is_hashed() || helps > 2 * n_recs || state.recommended() != state.current())
    }

    // Point the fold of the cursor record at it after a failed guess.
    fn update_hash_ref(&self, index: &Index, cursor: &Cursor<'_>) {
        let info = index.search_info();
        if info.n_hash_potential() == 0 {
            return;
        }
        let Some(rec) = cursor.record() else {
            return;
        };
        let state = cursor.block().hash_state();
        let prefix = info.prefix();
        if !state.is_hashed_with(index.id(), prefix) {
            return;
        }

        let fold = fold_record(rec, prefix.n_fields, prefix.n_bytes, index.id());
        let partition = self.partition_for(index);
        let mut table = partition.write_reserved(1);
        if !self.is_enabled() || !state.is_hashed_with(index.id(), prefix) {
            return;
        }
        match table.insert(fold, cursor.record_ref(), index.id()) {
            Ok(_) => self.stats.record_row_added(),
            Err(_) => self.stats.record_heap_exhausted(),
        }
    }

    /// Maintain the entries of the cursor's page after a record was
    /// inserted right after the cursor record. The page is latched
    /// exclusively by the cursor.
    pub fn on_insert(&self, index: &Index, cursor: &Cursor<'_>) {
        let block = cursor.block();
        let state = block.hash_state();
        if state.index() != Some(index.id()) {
            return;
        }
        let partition = self.partition_for(index);
        let page = cursor.page();
        let ins_heap_no = page.next(cursor.heap_no());

        if cursor.flag() == CursorFlag::Hash {
            if let Some(probe) = cursor.probe() {
                let mut table = partition.write();
                if state.is_hashed_with(index.id(), probe.prefix)
                    && !probe.prefix.left_side
                    && table.update_record(
                        probe.fold,
                        cursor.record_ref(),
                        RecordRef::new(block.id(), ins_heap_no),
                    )
                {
                    drop(table);
                    self.stats.record_row_updated();
                    return;
                }
            }
        }

        let prefix = {
            let _table = partition.read();
            if state.index() != Some(index.id()) {
                return;
            }
            state.current()
        };
        let Some(ins) = page.record(ins_heap_no) else {
            return;
        };
        let fold_of = |heap_no| {
            page.record(heap_no)
                .map(|rec| fold_record(rec, prefix.n_fields, prefix.n_bytes, index.id()))
        };
        let ins_fold = fold_record(ins, prefix.n_fields, prefix.n_bytes, index.id());
        let rec_fold = fold_of(cursor.heap_no());
        let next_heap_no = page.next(ins_heap_no);
        let next_fold = fold_of(next_heap_no);
        let left = prefix.left_side;

        let mut pending: Vec<(Fold, RecordRef)> = Vec::with_capacity(2);
        let at = |heap_no| RecordRef::new(block.id(), heap_no);
        match rec_fold {
            None if left => pending.push((ins_fold, at(ins_heap_no))),
            Some(fold) if fold != ins_fold => {
                if left {
                    pending.push((ins_fold, at(ins_heap_no)));
                } else {
                    pending.push((fold, cursor.record_ref()));
                }
            }
            _ => {}
        }
        match next_fold {
            None if !left => pending.push((ins_fold, at(ins_heap_no))),
            Some(fold) if fold != ins_fold => {
                if left {
                    pending.push((fold, at(next_heap_no)));
                } else {
                    pending.push((ins_fold, at(ins_heap_no)));
                }
            }
            _ => {}
        }
        if pending.is_empty() {
            return;
        }

        let mut table = partition.write_reserved(pending.len());
        if !self.is_enabled() || !state.is_hashed_with(index.id(), prefix) {
            return;
        }
        for (fold, rec) in pending {
            match table.insert(fold, rec, index.id()) {
                Ok(_) => self.stats.record_row_added(),
                Err(_) => {
                    self.stats.record_heap_exhausted();
                    break;
                }
            }
        }
    }

    /// Remove the entry of the cursor record, which is about to be deleted.
    /// The page is latched exclusively by the cursor.
    ///
    /// When the entry points at the record and its run of equal folds
    /// continues on the page, the entry is handed to a neighbour in the run
    /// instead, preferring the one that becomes the run's representative.
    pub fn on_delete(&self, index: &Index, cursor: &Cursor<'_>) {
        let state = cursor.block().hash_state();
        if state.index() != Some(index.id()) {
            return;
        }
        let Some(rec) = cursor.record() else {
            return;
        };
        let partition = self.partition_for(index);
        let prefix = {
            let _table = partition.read();
            if state.index() != Some(index.id()) {
                return;
            }
            state.current()
        };
        let fold = fold_record(rec, prefix.n_fields, prefix.n_bytes, index.id());
        let page = cursor.page();
        let (next, prev) = (page.next(cursor.heap_no()), page.prev(cursor.heap_no()));
        let order = if prefix.left_side { [next, prev] } else { [prev, next] };
        let heir = order
            .into_iter()
            .find(|&heap_no| {
                page.record(heap_no).is_some_and(|heir| {
                    fold_record(heir, prefix.n_fields, prefix.n_bytes, index.id()) == fold
                })
            })
            .map(|heap_no| RecordRef::new(cursor.block().id(), heap_no));

        let mut table = partition.write();
        if !state.is_hashed_with(index.id(), prefix) {
            return;
        }
        if let Some(heir) = heir {
            if table.update_record(fold, cursor.record_ref(), heir) {
                drop(table);
                self.stats.record_row_updated();
                return;
            }
        }
        let found = table.remove_matching(fold, cursor.record_ref());
        drop(table);
        self.stats.record_row_removed(found);
    }
}
