//! Speculative positioning through the hash index.
//!
//! A guess never returns a record it has not verified against the search
//! tuple on the latched page; stale or colliding entries only cost a miss.

use std::cmp::Ordering;

use super::partition::PartitionTable;
use super::search_info::SearchMatches;
use super::AdaptiveHashIndex;
use crate::btr::{Cursor, CursorFlag, HashProbe, SearchMode};
use crate::buf::{Block, BufferPool, LatchMode, Page, FIL_NULL};
use crate::dict::Index;
use crate::fold::{fold_tuple, Fold};
use crate::record::{compare_with_match, HeapNo, RecordRef, Tuple, INFIMUM, SUPREMUM};

/// Result of a hash guess
#[derive(Debug)]
pub enum Guess<'a> {
    /// Verified position, page latched in the requested mode
    Hit(Cursor<'a>),
    /// No usable guess; the flag to give the descent cursor
    Miss(CursorFlag),
}

impl<'a> Guess<'a> {
    /// Whether the guess produced a cursor
    pub fn is_hit(&self) -> bool {
        matches!(self, Guess::Hit(_))
    }

    /// The cursor of a hit
    pub fn into_cursor(self) -> Option<Cursor<'a>> {
        match self {
            Guess::Hit(cursor) => Some(cursor),
            Guess::Miss(_) => None,
        }
    }

    /// Flag the resulting cursor carries (or would carry)
    pub fn flag(&self) -> CursorFlag {
        match self {
            Guess::Hit(_) => CursorFlag::Hash,
            Guess::Miss(flag) => *flag,
        }
    }
}

/// Check that the record at `heap_no` is where a search for `tuple` in
/// `mode` would have positioned. Updates the match depths it learns.
///
/// With `only_cursor_rec` the neighbours may not be inspected, so only a
/// `GreaterOrEqual` match on all unique fields can succeed.
pub(crate) fn check_guess(
    page: &Page,
    heap_no: HeapNo,
    tuple: &Tuple,
    mode: SearchMode,
    n_unique: usize,
    only_cursor_rec: bool,
    m: &mut SearchMatches,
) -> bool {
    let Some(rec) = page.record(heap_no) else {
        return false;
    };
    let (cmp, depth) = compare_with_match(tuple, rec);

    match mode {
        SearchMode::GreaterOrEqual => {
            if cmp == Ordering::Greater {
                return false;
            }
            m.up_match = depth.fields;
            m.up_bytes = depth.bytes;
            if depth.fields >= n_unique {
                return true;
            }
        }
        SearchMode::LessOrEqual => {
            if cmp == Ordering::Less {
                return false;
            }
            m.low_match = depth.fields;
            m.low_bytes = depth.bytes;
        }
        SearchMode::Greater => {
            if cmp != Ordering::Less {
                return false;
            }
        }
        SearchMode::Less => {
            if cmp != Ordering::Greater {
                return false;
            }
        }
    }

    if only_cursor_rec {
        return false;
    }

    match mode {
        SearchMode::Greater | SearchMode::GreaterOrEqual => {
            let prev = page.prev(heap_no);
            if prev == INFIMUM {
                return page.prev_page() == FIL_NULL;
            }
            let Some(prev_rec) = page.record(prev) else {
                return false;
            };
            let (cmp, _) = compare_with_match(tuple, prev_rec);
            if mode == SearchMode::GreaterOrEqual {
                cmp == Ordering::Greater
            } else {
                cmp != Ordering::Less
            }
        }
        SearchMode::Less | SearchMode::LessOrEqual => {
            let next = page.next(heap_no);
            if next == SUPREMUM {
                if page.next_page() == FIL_NULL {
                    m.up_match = 0;
                    m.up_bytes = 0;
                    return true;
                }
                return false;
            }
            let Some(next_rec) = page.record(next) else {
                return false;
            };
            let (cmp, depth) = compare_with_match(tuple, next_rec);
            if mode == SearchMode::LessOrEqual {
                m.up_match = depth.fields;
                m.up_bytes = depth.bytes;
                cmp == Ordering::Less
            } else {
                cmp != Ordering::Greater
            }
        }
    }
}

// The page must still belong to `index` and be hashed under it.
fn page_still_hashed(block: &Block, page: &Page, index: &Index) -> bool {
    block.is_file_page()
        && page.index_id() == Some(index.id())
        && block.hash_state().index() == Some(index.id())
}

impl AdaptiveHashIndex {
    // Fold the tuple with the index's recommended prefix, if it is usable.
    fn probe_for(&self, index: &Index, tuple: &Tuple) -> Option<HashProbe> {
        if index.is_insert_buffer() {
            return None;
        }
        let info = index.search_info();
        if info.n_hash_potential() == 0 {
            return None;
        }
        let prefix = info.prefix();
        if tuple.n_fields() < prefix.n_fields_required() {
            return None;
        }
        let fold: Fold = fold_tuple(tuple, prefix.n_fields, prefix.n_bytes, index.id());
        Some(HashProbe { fold, prefix })
    }

    /// Try to position on the leaf record a search for `tuple` in `mode`
    /// would reach, without descending the tree.
    ///
    /// On a hit the page is latched in `latch_mode` and pinned by the
    /// returned cursor. Never blocks on a page latch.
    pub fn guess<'a>(
        &self,
        pool: &'a BufferPool,
        index: &Index,
        tuple: &Tuple,
        mode: SearchMode,
        latch_mode: LatchMode,
    ) -> Guess<'a> {
        let Some(probe) = self.probe_for(index, tuple) else {
            return Guess::Miss(CursorFlag::Binary);
        };
        let info = index.search_info();
        self.stats.record_search();

        let partition = self.partition_for(index);
        let table = partition.read();
        if !self.is_enabled() {
            return Guess::Miss(CursorFlag::Binary);
        }
        let Some(rec) = table.search(probe.fold) else {
            drop(table);
            self.stats.record_hash_not_found();
            info.set_last_hash_succ(false);
            return Guess::Miss(CursorFlag::Binary);
        };
        let Some((block, guard)) = pool
            .get_block(rec.block)
            .and_then(|block| block.try_latch(latch_mode).map(|guard| (block, guard)))
        else {
            drop(table);
            self.stats.record_hash_fail();
            info.set_last_hash_succ(false);
            return Guess::Miss(CursorFlag::Binary);
        };
        drop(table);

        if !page_still_hashed(block, &guard, index) {
            self.stats.record_hash_fail();
            info.set_last_hash_succ(false);
            return Guess::Miss(CursorFlag::Binary);
        }

        let mut matches = SearchMatches::default();
        let verified = check_guess(
            &guard,
            rec.heap_no,
            tuple,
            mode,
            index.n_unique_in_tree(),
            false,
            &mut matches,
        );
        if !verified {
            self.stats.record_hash_fail();
            info.set_last_hash_succ(false);

            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(index = %index.id(), fold = probe.fold, "hash guess failed verification");
            }
            return Guess::Miss(CursorFlag::HashFail);
        }

        info.bump_potential();
        info.set_last_hash_succ(true);
        block.make_young();
        self.stats.record_hash_succ();

        let mut cursor = Cursor::new(guard, rec.heap_no);
        cursor.set_flag(CursorFlag::Hash);
        cursor.set_matches(matches);
        cursor.set_probe(Some(probe));
        Guess::Hit(cursor)
    }

    /// Guess while the caller already holds `table`, the shared latch of
    /// the partition serving `index`.
    ///
    /// Only the candidate record itself is compared (its neighbours are not
    /// examined), so in practice only `GreaterOrEqual` searches matching all
    /// unique fields succeed. The page is latched just long enough to
    /// compare; the returned reference must be re-validated by the caller.
    pub fn guess_latched(
        &self,
        table: &PartitionTable,
        pool: &BufferPool,
        index: &Index,
        tuple: &Tuple,
        mode: SearchMode,
    ) -> Option<RecordRef> {
        let probe = self.probe_for(index, tuple)?;
        if !self.is_enabled() {
            return None;
        }
        self.stats.record_search();
        let Some(rec) = table.search(probe.fold) else {
            self.stats.record_hash_not_found();
            return None;
        };
        let block = pool.get_block(rec.block)?;
        let guard = block.try_latch(LatchMode::SearchLeaf)?;
        if !page_still_hashed(block, &guard, index) {
            return None;
        }
        let mut matches = SearchMatches::default();
        if check_guess(
            &guard,
            rec.heap_no,
            tuple,
            mode,
            index.n_unique_in_tree(),
            true,
            &mut matches,
        ) {
            self.stats.record_hash_succ();
            Some(rec)
        } else {
            self.stats.record_hash_fail();
            None
        }
    }
}
