//! A leaf-level B-tree over the buffer pool.
//!
//! Leaves form a doubly linked chain starting at page 0 of the tree's space,
//! which is never freed. Searches walk the chain left to right with latch
//! coupling; no thread ever waits for a page to the left of one it holds.
//! Splits and merges are serialised by a tree mutex; plain inserts and
//! deletes hold only their page latch. Only the first page may be empty.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::cursor::{Cursor, CursorFlag, SearchMode};
use crate::ahi::{AdaptiveHashIndex, Guess, SearchMatches};
use crate::buf::{Block, BufferPool, LatchMode, PageId, PageNo, FIL_NULL};
use crate::dict::Index;
use crate::record::{compare_with_match, Record, Tuple, SUPREMUM};
use crate::status::Status;

const ROOT_PAGE_NO: PageNo = 0;

// Whether `rec` lies on the low side of `tuple` for `mode`.
fn goes_low(tuple: &Tuple, rec: &Record, mode: SearchMode) -> bool {
    let (ord, _) = compare_with_match(tuple, rec);
    match mode {
        SearchMode::GreaterOrEqual | SearchMode::Less => ord == Ordering::Greater,
        SearchMode::Greater | SearchMode::LessOrEqual => ord != Ordering::Less,
    }
}

fn on_match(cursor: &Cursor<'_>, tuple: &Tuple) -> bool {
    cursor
        .record()
        .is_some_and(|rec| compare_with_match(tuple, rec).0 == Ordering::Equal)
}

fn into_status(result: Result<(), Status>) -> Status {
    match result {
        Ok(()) => Status::Ok,
        Err(status) => status,
    }
}

/// An ordered index whose searches go through the adaptive hash index
pub struct BTree {
    index: Arc<Index>,
    pool: Arc<BufferPool>,
    ahi: Arc<AdaptiveHashIndex>,
    space: u32,
    next_page_no: AtomicU32,
    smo: Mutex<()>,
}

impl BTree {
    /// Create an empty tree for `index` in tablespace `space`.
    ///
    /// The index must have been registered with `ahi.info_create`. Pages
    /// must hold at least two records so a split leaves both halves
    /// non-empty.
    pub fn create(
        index: Arc<Index>,
        pool: Arc<BufferPool>,
        ahi: Arc<AdaptiveHashIndex>,
        space: u32,
    ) -> Result<Self, Status> {
        if pool.config().page_capacity < 2 {
            return Err(Status::InvalidArgument);
        }
        let root = pool
            .create_page(PageId::new(space, ROOT_PAGE_NO), index.id())?
            .id();
        index.search_info().set_root_guess(Some(root));

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index = %index.id(), space, root = %root, "tree created");
        }
        Ok(Self {
            index,
            pool,
            ahi,
            space,
            next_page_no: AtomicU32::new(ROOT_PAGE_NO + 1),
            smo: Mutex::new(()),
        })
    }

    /// The index this tree stores
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// The buffer pool holding the pages
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// The adaptive hash index consulted by searches
    pub fn ahi(&self) -> &Arc<AdaptiveHashIndex> {
        &self.ahi
    }

    /// Tablespace of the tree's pages
    pub fn space(&self) -> u32 {
        self.space
    }

    fn page_id(&self, page_no: PageNo) -> PageId {
        PageId::new(self.space, page_no)
    }

    // A page linked into the chain must be resident.
    fn block_of(&self, page_no: PageNo) -> Result<&Block, Status> {
        self.pool.lookup(self.page_id(page_no)).ok_or_else(|| {
            tracing::warn!(index = %self.index.id(), page_no, "linked page is not resident");
            Status::Corruption
        })
    }

    fn root(&self) -> Result<&Block, Status> {
        let root_id = self.page_id(ROOT_PAGE_NO);
        let info = self.index.search_info();
        if let Some(block) = info.root_guess().and_then(|id| self.pool.get_block(id)) {
            if block.page_id() == Some(root_id) {
                return Ok(block);
            }
        }
        let block = self.block_of(ROOT_PAGE_NO)?;
        info.set_root_guess(Some(block.id()));
        Ok(block)
    }

    /// Position a cursor for `tuple` in `mode`, latching the leaf in
    /// `latch_mode`.
    ///
    /// The hash index is tried first; otherwise the leaf chain is walked.
    /// Descents feed the search statistics every time the index's analysis
    /// counter is due, and always after a failed hash guess.
    pub fn search(
        &self,
        tuple: &Tuple,
        mode: SearchMode,
        latch_mode: LatchMode,
    ) -> Result<Cursor<'_>, Status> {
        let flag = match self.ahi.guess(&self.pool, &self.index, tuple, mode, latch_mode) {
            Guess::Hit(cursor) => return Ok(cursor),
            Guess::Miss(flag) => flag,
        };

        let mut cursor = self.descend(tuple, mode, latch_mode)?;
        cursor.set_flag(flag);
        let due = self.index.search_info().analysis_due();
        if due || flag == CursorFlag::HashFail {
            self.ahi.info_update(&self.index, &cursor);
        }
        Ok(cursor)
    }

    fn descend(
        &self,
        tuple: &Tuple,
        mode: SearchMode,
        latch_mode: LatchMode,
    ) -> Result<Cursor<'_>, Status> {
        let mut guard = self.root()?.latch(latch_mode);
        loop {
            let next_no = guard.next_page();
            if next_no == FIL_NULL {
                break;
            }
            let next = self.block_of(next_no)?.latch(latch_mode);
            let moves = next
                .record(next.first())
                .is_some_and(|rec| goes_low(tuple, rec, mode));
            if !moves {
                break;
            }
            guard = next;
        }

        let pos = guard.search(tuple, mode);
        let mut heap_no = pos.cursor_heap_no(mode);
        let mut matches = SearchMatches {
            low_match: pos.low_match.fields,
            low_bytes: pos.low_match.bytes,
            up_match: pos.up_match.fields,
            up_bytes: pos.up_match.bytes,
        };

        // Everything here is on the low side: the answer is the first
        // record of the right sibling.
        let upward = matches!(mode, SearchMode::Greater | SearchMode::GreaterOrEqual);
        if upward && heap_no == SUPREMUM && guard.next_page() != FIL_NULL {
            let next = self.block_of(guard.next_page())?.latch(latch_mode);
            let first = next.first();
            let depth = next.record(first).map(|rec| compare_with_match(tuple, rec).1);
            if let Some(depth) = depth {
                matches.up_match = depth.fields;
                matches.up_bytes = depth.bytes;
                heap_no = first;
                guard = next;
            }
        }

        let mut cursor = Cursor::new(guard, heap_no);
        cursor.set_matches(matches);
        Ok(cursor)
    }

    /// Record whose key equals `tuple`, if any
    pub fn get(&self, tuple: &Tuple) -> Result<Option<Record>, Status> {
        let cursor = self.search(tuple, SearchMode::GreaterOrEqual, LatchMode::SearchLeaf)?;
        Ok(on_match(&cursor, tuple).then(|| cursor.record().cloned()).flatten())
    }

    /// Insert `record`. Records agreeing on the index's unique fields are
    /// rejected with `DuplicateKey`.
    pub fn insert(&self, record: Record) -> Status {
        into_status(self.try_insert(record))
    }

    fn try_insert(&self, record: Record) -> Result<(), Status> {
        if record.n_fields() < self.index.n_unique_in_tree() {
            return Err(Status::InvalidArgument);
        }
        let tuple = Tuple::from(&record);
        let mut cursor = self.search(&tuple, SearchMode::LessOrEqual, LatchMode::ModifyLeaf)?;
        if self.is_duplicate(&cursor, &record)? {
            return Err(Status::DuplicateKey);
        }
        if !cursor.page().is_full() {
            return self.insert_at(&mut cursor, record);
        }
        drop(cursor);
        self.split_and_insert(record)
    }

    // Whether the cursor record or its successor shares the unique key of
    // `record`. The cursor sits on the last record not greater than it.
    fn is_duplicate(&self, cursor: &Cursor<'_>, record: &Record) -> Result<bool, Status> {
        let key = record.to_tuple(self.index.n_unique_in_tree());
        let same = |rec: &Record| compare_with_match(&key, rec).0 == Ordering::Equal;
        if cursor.record().is_some_and(same) {
            return Ok(true);
        }
        let page = cursor.page();
        if let Some(rec) = page.record(page.next(cursor.heap_no())) {
            return Ok(same(rec));
        }
        if page.next_page() == FIL_NULL {
            return Ok(false);
        }
        let next = self.block_of(page.next_page())?.latch(LatchMode::SearchLeaf);
        Ok(next.record(next.first()).is_some_and(same))
    }

    fn insert_at(&self, cursor: &mut Cursor<'_>, record: Record) -> Result<(), Status> {
        let after = cursor.heap_no();
        cursor
            .page_mut()
            .ok_or(Status::InvalidOperation)?
            .insert_after(after, record)?;
        self.ahi.on_insert(&self.index, cursor);
        Ok(())
    }

    fn split_and_insert(&self, record: Record) -> Result<(), Status> {
        let _smo = self.smo.lock();
        let tuple = Tuple::from(&record);
        let mut cursor = self.search(&tuple, SearchMode::LessOrEqual, LatchMode::ModifyLeaf)?;
        if self.is_duplicate(&cursor, &record)? {
            return Err(Status::DuplicateKey);
        }
        if !cursor.page().is_full() {
            return self.insert_at(&mut cursor, record);
        }

        let old_block = cursor.block();
        let old_no = cursor.page().id().page_no;
        let old_next = cursor.page().next_page();
        let new_no = self.next_page_no.fetch_add(1, AtomicOrdering::Relaxed);
        let new_block = self.pool.create_page(self.page_id(new_no), self.index.id())?;
        let mut new_guard = new_block.latch(LatchMode::ModifyLeaf);
        let mut right = match old_next {
            FIL_NULL => None,
            no => Some(self.block_of(no)?.latch(LatchMode::ModifyLeaf)),
        };

        let half = cursor.page().n_recs() / 2;
        let split_at = cursor
            .page()
            .user_records()
            .nth(half)
            .map(|(heap_no, _)| heap_no)
            .ok_or(Status::Corruption)?;
        let upper: Vec<Record> = cursor
            .page()
            .user_records()
            .skip(half)
            .map(|(_, rec)| rec.clone())
            .collect();
        {
            let new_page = new_guard.page_mut().ok_or(Status::InvalidOperation)?;
            for rec in upper {
                new_page.push_back(rec)?;
            }
            new_page.set_prev_page(old_no);
            new_page.set_next_page(old_next);
        }
        if let Some(page) = right.as_mut().and_then(|guard| guard.page_mut()) {
            page.set_prev_page(new_no);
        }
        drop(right);
        cursor
            .page_mut()
            .ok_or(Status::InvalidOperation)?
            .set_next_page(new_no);

        // The old page still holds every record while the new one is built.
        self.ahi
            .move_or_delete(&self.index, new_block, &new_guard, old_block, cursor.page());
        let moved = cursor
            .page_mut()
            .ok_or(Status::InvalidOperation)?
            .truncate_from(split_at);

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index = %self.index.id(), old = old_no, new = new_no, moved, "page split");
        }

        let goes_right = new_guard
            .record(new_guard.first())
            .is_some_and(|first| compare_with_match(&tuple, first).0 != Ordering::Less);
        if goes_right {
            drop(cursor);
            let pos = new_guard.search(&tuple, SearchMode::LessOrEqual);
            let mut cursor = Cursor::new(new_guard, pos.low);
            self.insert_at(&mut cursor, record)
        } else {
            drop(new_guard);
            let pos = cursor.page().search(&tuple, SearchMode::LessOrEqual);
            cursor.set_heap_no(pos.low);
            cursor.set_flag(CursorFlag::Binary);
            cursor.set_probe(None);
            self.insert_at(&mut cursor, record)
        }
    }

    /// Delete the record whose key equals `tuple`. A page left empty is
    /// merged away.
    pub fn delete(&self, tuple: &Tuple) -> Status {
        into_status(self.try_delete(tuple))
    }

    fn try_delete(&self, tuple: &Tuple) -> Result<(), Status> {
        if tuple.n_fields() < self.index.n_unique_in_tree() {
            return Err(Status::InvalidArgument);
        }
        {
            let mut cursor = self.search(tuple, SearchMode::GreaterOrEqual, LatchMode::ModifyLeaf)?;
            if !on_match(&cursor, tuple) {
                return Err(Status::NotFound);
            }
            if !Self::empties_page(&cursor) {
                return self.delete_at(&mut cursor);
            }
        }
        self.delete_and_merge(tuple)
    }

    // Deleting the cursor record would leave a page that must be merged.
    fn empties_page(cursor: &Cursor<'_>) -> bool {
        let page = cursor.page();
        page.n_recs() == 1 && (page.prev_page() != FIL_NULL || page.next_page() != FIL_NULL)
    }

    fn delete_at(&self, cursor: &mut Cursor<'_>) -> Result<(), Status> {
        self.ahi.on_delete(&self.index, cursor);
        let heap_no = cursor.heap_no();
        let page = cursor.page_mut().ok_or(Status::InvalidOperation)?;
        match page.delete(heap_no) {
            Some(_) => Ok(()),
            None => Err(Status::NotFound),
        }
    }

    fn delete_and_merge(&self, tuple: &Tuple) -> Result<(), Status> {
        let _smo = self.smo.lock();
        let (page_no, prev_no, next_no) = {
            let mut cursor = self.search(tuple, SearchMode::GreaterOrEqual, LatchMode::ModifyLeaf)?;
            if !on_match(&cursor, tuple) {
                return Err(Status::NotFound);
            }
            if !Self::empties_page(&cursor) {
                return self.delete_at(&mut cursor);
            }
            let page = cursor.page();
            (page.id().page_no, page.prev_page(), page.next_page())
        };
        if prev_no != FIL_NULL {
            self.merge_into_left(tuple, page_no, prev_no)
        } else {
            self.pull_right_into_root(tuple, page_no, next_no)
        }
    }

    // Delete from `page_no` and, if it empties, unlink it from the chain.
    fn merge_into_left(&self, tuple: &Tuple, page_no: PageNo, prev_no: PageNo) -> Result<(), Status> {
        let left_block = self.block_of(prev_no)?;
        let mut left = left_block.latch(LatchMode::ModifyLeaf);
        let block = self.block_of(page_no)?;
        let guard = block.latch(LatchMode::ModifyLeaf);
        let next_no = guard.next_page();
        let mut right = match next_no {
            FIL_NULL => None,
            no => Some(self.block_of(no)?.latch(LatchMode::ModifyLeaf)),
        };

        let pos = guard.search(tuple, SearchMode::GreaterOrEqual);
        let mut cursor = Cursor::new(guard, pos.up);
        if !on_match(&cursor, tuple) {
            return Err(Status::NotFound);
        }
        self.delete_at(&mut cursor)?;
        if cursor.page().n_recs() > 0 {
            return Ok(());
        }

        self.ahi
            .move_or_delete(&self.index, left_block, &left, block, cursor.page());
        left.page_mut()
            .ok_or(Status::InvalidOperation)?
            .set_next_page(next_no);
        if let Some(page) = right.as_mut().and_then(|guard| guard.page_mut()) {
            page.set_prev_page(prev_no);
        }
        let page_id = cursor.page().id();
        drop(right);
        drop(cursor);
        drop(left);

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index = %self.index.id(), page = %page_id, into = prev_no, "page merged");
        }
        self.pool.evict(page_id, &*self.ahi).into_result()
    }

    // Delete from the first page and, if it empties, move its right
    // sibling's records into it and free the sibling.
    fn pull_right_into_root(&self, tuple: &Tuple, root_no: PageNo, right_no: PageNo) -> Result<(), Status> {
        let root_block = self.block_of(root_no)?;
        let guard = root_block.latch(LatchMode::ModifyLeaf);
        let right_block = self.block_of(right_no)?;
        let right = right_block.latch(LatchMode::ModifyLeaf);
        let after_no = right.next_page();
        let mut after = match after_no {
            FIL_NULL => None,
            no => Some(self.block_of(no)?.latch(LatchMode::ModifyLeaf)),
        };

        let pos = guard.search(tuple, SearchMode::GreaterOrEqual);
        let mut cursor = Cursor::new(guard, pos.up);
        if !on_match(&cursor, tuple) {
            return Err(Status::NotFound);
        }
        self.delete_at(&mut cursor)?;
        if cursor.page().n_recs() > 0 {
            return Ok(());
        }

        let moved: Vec<Record> = right.user_records().map(|(_, rec)| rec.clone()).collect();
        let n_moved = moved.len();
        {
            let root = cursor.page_mut().ok_or(Status::InvalidOperation)?;
            for rec in moved {
                root.push_back(rec)?;
            }
            root.set_next_page(after_no);
        }
        if let Some(page) = after.as_mut().and_then(|guard| guard.page_mut()) {
            page.set_prev_page(root_no);
        }
        self.ahi
            .move_or_delete(&self.index, root_block, cursor.page(), right_block, &right);
        let page_id = right.id();
        drop(after);
        drop(right);
        drop(cursor);

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index = %self.index.id(), page = %page_id, moved = n_moved, "right sibling pulled into first page");
        }
        self.pool.evict(page_id, &*self.ahi).into_result()
    }

    fn page_ids(&self) -> Result<Vec<PageId>, Status> {
        let mut out = Vec::new();
        let mut guard = self.root()?.latch(LatchMode::SearchLeaf);
        loop {
            out.push(guard.id());
            let next_no = guard.next_page();
            if next_no == FIL_NULL {
                return Ok(out);
            }
            guard = self.block_of(next_no)?.latch(LatchMode::SearchLeaf);
        }
    }

    /// Number of leaf pages
    pub fn n_pages(&self) -> Result<usize, Status> {
        Ok(self.page_ids()?.len())
    }

    /// Every record in key order
    pub fn records(&self) -> Result<Vec<Record>, Status> {
        let mut out = Vec::new();
        let mut guard = self.root()?.latch(LatchMode::SearchLeaf);
        loop {
            out.extend(guard.user_records().map(|(_, rec)| rec.clone()));
            let next_no = guard.next_page();
            if next_no == FIL_NULL {
                return Ok(out);
            }
            guard = self.block_of(next_no)?.latch(LatchMode::SearchLeaf);
        }
    }

    /// Check the leaf chain: sibling links agree, records ascend across
    /// pages, and no page other than the first is empty.
    pub fn check_structure(&self) -> Status {
        let _smo = self.smo.lock();
        let mut prev_no = FIL_NULL;
        let mut last: Option<Record> = None;
        let mut guard = match self.root() {
            Ok(block) => block.latch(LatchMode::SearchLeaf),
            Err(status) => return status,
        };
        loop {
            let page_no = guard.id().page_no;
            if guard.prev_page() != prev_no {
                tracing::warn!(page = %guard.id(), prev = guard.prev_page(), expected = prev_no, "broken sibling link");
                return Status::Corruption;
            }
            if guard.n_recs() == 0 && (page_no != ROOT_PAGE_NO || guard.next_page() != FIL_NULL) {
                tracing::warn!(page = %guard.id(), "empty page in chain");
                return Status::Corruption;
            }
            for (_, rec) in guard.user_records() {
                if let Some(prev) = &last {
                    if compare_with_match(&Tuple::from(prev), rec).0 != Ordering::Less {
                        tracing::warn!(page = %guard.id(), "records out of order");
                        return Status::Corruption;
                    }
                }
                last = Some(rec.clone());
            }
            let next_no = guard.next_page();
            if next_no == FIL_NULL {
                return Status::Ok;
            }
            prev_no = page_no;
            guard = match self.block_of(next_no) {
                Ok(block) => block.latch(LatchMode::SearchLeaf),
                Err(status) => return status,
            };
        }
    }

    /// Drop the index: remove its hash entries, free its pages and
    /// unregister it from the hash index.
    pub fn drop_index(self) -> Status {
        let _smo = self.smo.lock();
        let status = self.ahi.drop_all_for_index(&self.pool, &self.index);
        if !status.is_ok() {
            return status;
        }
        let pages = match self.page_ids() {
            Ok(pages) => pages,
            Err(status) => return status,
        };
        for page_id in &pages {
            let status = self.pool.evict(*page_id, &*self.ahi);
            if !status.is_ok() {
                return status;
            }
        }
        self.index.search_info().set_root_guess(None);

        tracing::info!(index = %self.index.id(), pages = pages.len(), "index dropped");
        self.ahi.info_destroy(&self.index)
    }
}

impl fmt::Debug for BTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTree")
            .field("index", &self.index.id())
            .field("space", &self.space)
            .field("next_page_no", &self.next_page_no.load(AtomicOrdering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf::BufferPoolConfig;
    use crate::dict::{IndexId, IndexMeta};

    fn tree(page_capacity: usize) -> BTree {
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            blocks: 64,
            page_capacity,
        }));
        let ahi = Arc::new(AdaptiveHashIndex::with_size(256, 2).unwrap());
        let index = ahi.info_create(IndexMeta::new(IndexId::new(11), "t", 2, 1));
        BTree::create(index, pool, ahi, 0).unwrap()
    }

    fn key(k: u64) -> Tuple {
        Tuple::from_u64s(&[k])
    }

    fn row(k: u64) -> Record {
        Record::from_u64s(&[k, k * 10])
    }

    fn keys(tree: &BTree) -> Vec<u64> {
        tree.records()
            .unwrap()
            .iter()
            .map(|r| u64::from_be_bytes(r.fields()[0].data().unwrap().try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_create_rejects_tiny_pages() {
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            blocks: 4,
            page_capacity: 1,
        }));
        let ahi = Arc::new(AdaptiveHashIndex::with_size(16, 1).unwrap());
        let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "t", 1, 1));
        assert_eq!(BTree::create(index, pool, ahi, 0).err(), Some(Status::InvalidArgument));
    }

    #[test]
    fn test_insert_get_and_duplicates() {
        let tree = tree(8);
        for k in [5, 1, 3] {
            assert_eq!(tree.insert(row(k)), Status::Ok);
        }
        assert_eq!(tree.insert(row(3)), Status::DuplicateKey);
        assert_eq!(tree.insert(Record::from_u64s(&[3, 99])), Status::DuplicateKey);
        assert_eq!(tree.insert(Record::new(vec![])), Status::InvalidArgument);

        assert_eq!(tree.get(&key(3)).unwrap(), Some(row(3)));
        assert_eq!(tree.get(&key(4)).unwrap(), None);
        assert_eq!(keys(&tree), vec![1, 3, 5]);
    }

    #[test]
    fn test_splits_keep_order() {
        let tree = tree(4);
        for k in 1..=8 {
            assert_eq!(tree.insert(row(k)), Status::Ok);
        }
        assert_eq!(tree.n_pages().unwrap(), 3);
        assert_eq!(tree.check_structure(), Status::Ok);
        assert_eq!(keys(&tree), (1..=8).collect::<Vec<_>>());
        for k in 1..=8 {
            assert_eq!(tree.get(&key(k)).unwrap(), Some(row(k)));
        }
    }

    #[test]
    fn test_search_modes_across_pages() {
        let tree = tree(4);
        for k in (10..=80).step_by(10) {
            tree.insert(row(k));
        }
        let at = |k: u64, mode| {
            let cursor = tree.search(&key(k), mode, LatchMode::SearchLeaf).unwrap();
            cursor.record().map(|r| r.fields()[1].clone())
        };
        assert_eq!(at(30, SearchMode::GreaterOrEqual), Some(300u64.into()));
        assert_eq!(at(35, SearchMode::GreaterOrEqual), Some(400u64.into()));
        assert_eq!(at(30, SearchMode::Greater), Some(400u64.into()));
        assert_eq!(at(35, SearchMode::LessOrEqual), Some(300u64.into()));
        assert_eq!(at(30, SearchMode::Less), Some(200u64.into()));
        assert_eq!(at(5, SearchMode::Less), None);
        assert_eq!(at(90, SearchMode::GreaterOrEqual), None);
    }

    #[test]
    fn test_deletes_merge_pages() {
        let tree = tree(4);
        for k in 1..=8 {
            tree.insert(row(k));
        }
        assert_eq!(tree.delete(&key(42)), Status::NotFound);
        for k in [8, 7, 6, 5] {
            assert_eq!(tree.delete(&key(k)), Status::Ok);
        }
        assert_eq!(tree.n_pages().unwrap(), 2);
        assert_eq!(tree.check_structure(), Status::Ok);

        assert_eq!(tree.delete(&key(1)), Status::Ok);
        assert_eq!(tree.delete(&key(2)), Status::Ok);
        assert_eq!(tree.n_pages().unwrap(), 1);
        assert_eq!(keys(&tree), vec![3, 4]);
        assert_eq!(tree.check_structure(), Status::Ok);

        tree.delete(&key(3));
        tree.delete(&key(4));
        assert!(keys(&tree).is_empty());
        assert_eq!(tree.check_structure(), Status::Ok);
        assert_eq!(tree.pool().n_free(), 63);
    }

    #[test]
    fn test_repeated_lookups_engage_hash() {
        let tree = tree(8);
        for k in 1..=3 {
            tree.insert(row(k));
        }
        for _ in 0..200 {
            assert_eq!(tree.get(&key(2)).unwrap(), Some(row(2)));
        }
        let counters = tree.ahi().stats().counters();
        assert!(counters.hash_succ > 0);
        assert_eq!(tree.ahi().info_ref_count(tree.index()), 1);
        assert!(tree.ahi().validate(tree.pool()).is_ok());
    }

    #[test]
    fn test_drop_index() {
        let tree = tree(4);
        for k in 1..=6 {
            tree.insert(row(k));
        }
        for _ in 0..200 {
            tree.get(&key(4)).unwrap();
        }
        let ahi = Arc::clone(tree.ahi());
        let pool = Arc::clone(tree.pool());
        assert_eq!(tree.drop_index(), Status::Ok);
        assert!(ahi.lookup_index(IndexId::new(11)).is_none());
        assert_eq!(ahi.stats_snapshot().total_nodes, 0);
        assert_eq!(pool.n_free(), 64);
    }
}
