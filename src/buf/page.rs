//! In-memory leaf page: a heap of record slots threaded into key order.
//!
//! Slot 0 is the infimum and slot 1 the supremum; user records live in
//! slots handed out from [`FIRST_USER_HEAP_NO`] upward. Freed slots are
//! reused, so a heap number only identifies a record while the page latch
//! that observed it is held.

use std::cmp::Ordering;
use std::fmt;

use crate::btr::SearchMode;
use crate::dict::IndexId;
use crate::record::{
    compare_with_match, HeapNo, MatchDepth, Record, Tuple, FIRST_USER_HEAP_NO, INFIMUM, SUPREMUM,
};
use crate::status::Status;

/// Page number within a tablespace
pub type PageNo = u32;

/// "No page" sibling marker
pub const FIL_NULL: PageNo = u32::MAX;

/// Tablespace-qualified page identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    /// Tablespace id
    pub space: u32,
    /// Page number
    pub page_no: PageNo,
}

impl PageId {
    /// Create a page id
    #[inline]
    pub const fn new(space: u32, page_no: PageNo) -> Self {
        Self { space, page_no }
    }

    #[inline]
    pub(crate) const fn to_u64(self) -> u64 {
        ((self.space as u64) << 32) | self.page_no as u64
    }

    #[inline]
    pub(crate) const fn from_u64(raw: u64) -> Self {
        Self {
            space: (raw >> 32) as u32,
            page_no: raw as u32,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.page_no)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    record: Option<Record>,
    next: HeapNo,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            record: None,
            next: SUPREMUM,
        }
    }
}

/// Result of positioning a tuple inside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    /// Last record on the "low" side of the tuple (may be the infimum)
    pub low: HeapNo,
    /// First record on the "up" side of the tuple (may be the supremum)
    pub up: HeapNo,
    /// Match depth against `low` (zero for the infimum)
    pub low_match: MatchDepth,
    /// Match depth against `up` (zero for the supremum)
    pub up_match: MatchDepth,
}

impl PagePosition {
    /// Record a cursor opened in `mode` sits on
    pub fn cursor_heap_no(&self, mode: SearchMode) -> HeapNo {
        match mode {
            SearchMode::Greater | SearchMode::GreaterOrEqual => self.up,
            SearchMode::Less | SearchMode::LessOrEqual => self.low,
        }
    }
}

/// A leaf page of one index
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    index_id: Option<IndexId>,
    prev: PageNo,
    next: PageNo,
    slots: Vec<Slot>,
    free_slots: Vec<HeapNo>,
    n_recs: usize,
    capacity: usize,
}

impl Page {
    /// Create an empty page holding at most `capacity` user records
    pub fn new(id: PageId, index_id: Option<IndexId>, capacity: usize) -> Self {
        Self {
            id,
            index_id,
            prev: FIL_NULL,
            next: FIL_NULL,
            slots: vec![Slot::empty(), Slot::empty()],
            free_slots: Vec::new(),
            n_recs: 0,
            capacity,
        }
    }

    pub(crate) fn reset(&mut self, id: PageId, index_id: Option<IndexId>) {
        let capacity = self.capacity;
        *self = Self::new(id, index_id, capacity);
    }

    /// Page identity
    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Index the page belongs to
    #[inline]
    pub fn index_id(&self) -> Option<IndexId> {
        self.index_id
    }

    /// Left sibling page number
    #[inline]
    pub fn prev_page(&self) -> PageNo {
        self.prev
    }

    /// Right sibling page number
    #[inline]
    pub fn next_page(&self) -> PageNo {
        self.next
    }

    /// Set the left sibling
    pub fn set_prev_page(&mut self, page_no: PageNo) {
        self.prev = page_no;
    }

    /// Set the right sibling
    pub fn set_next_page(&mut self, page_no: PageNo) {
        self.next = page_no;
    }

    /// Number of user records
    #[inline]
    pub fn n_recs(&self) -> usize {
        self.n_recs
    }

    /// Maximum number of user records
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether no further record fits
    #[inline]
    pub fn is_full(&self) -> bool {
        self.n_recs >= self.capacity
    }

    /// Whether `heap_no` is a live user record
    #[inline]
    pub fn is_user_rec(&self, heap_no: HeapNo) -> bool {
        self.record(heap_no).is_some()
    }

    /// The user record at `heap_no`, if live
    #[inline]
    pub fn record(&self, heap_no: HeapNo) -> Option<&Record> {
        if heap_no < FIRST_USER_HEAP_NO {
            return None;
        }
        self.slots.get(heap_no as usize)?.record.as_ref()
    }

    /// Successor of `heap_no` in key order (the supremum is its own successor)
    #[inline]
    pub fn next(&self, heap_no: HeapNo) -> HeapNo {
        if heap_no == SUPREMUM {
            return SUPREMUM;
        }
        self.slots
            .get(heap_no as usize)
            .map_or(SUPREMUM, |slot| slot.next)
    }

    /// Predecessor of `heap_no` in key order (the infimum is its own predecessor)
    pub fn prev(&self, heap_no: HeapNo) -> HeapNo {
        if heap_no == INFIMUM {
            return INFIMUM;
        }
        let mut cur = INFIMUM;
        loop {
            let next = self.slots[cur as usize].next;
            if next == heap_no || next == SUPREMUM {
                return cur;
            }
            cur = next;
        }
    }

    /// First user record, or the supremum when the page is empty
    #[inline]
    pub fn first(&self) -> HeapNo {
        self.slots[INFIMUM as usize].next
    }

    /// Last user record, or the infimum when the page is empty
    pub fn last(&self) -> HeapNo {
        self.prev(SUPREMUM)
    }

    /// Iterate user records in key order
    pub fn user_records(&self) -> UserRecords<'_> {
        UserRecords {
            page: self,
            cur: self.first(),
        }
    }

    /// Link `record` into the page right after `after`
    pub fn insert_after(&mut self, after: HeapNo, record: Record) -> Result<HeapNo, Status> {
        if self.is_full() {
            return Err(Status::OutOfMemory);
        }
        if after != INFIMUM && !self.is_user_rec(after) {
            return Err(Status::InvalidArgument);
        }
        let heap_no = match self.free_slots.pop() {
            Some(h) => h,
            None => {
                let h = HeapNo::try_from(self.slots.len()).map_err(|_| Status::OutOfMemory)?;
                self.slots.push(Slot::empty());
                h
            }
        };
        let next = self.slots[after as usize].next;
        let slot = &mut self.slots[heap_no as usize];
        slot.record = Some(record);
        slot.next = next;
        self.slots[after as usize].next = heap_no;
        self.n_recs += 1;
        Ok(heap_no)
    }

    /// Append `record` after the last user record
    pub fn push_back(&mut self, record: Record) -> Result<HeapNo, Status> {
        let last = self.last();
        self.insert_after(last, record)
    }

    /// Unlink and return the user record at `heap_no`
    pub fn delete(&mut self, heap_no: HeapNo) -> Option<Record> {
        if !self.is_user_rec(heap_no) {
            return None;
        }
        let prev = self.prev(heap_no);
        let slot = &mut self.slots[heap_no as usize];
        let record = slot.record.take();
        let next = std::mem::replace(&mut slot.next, SUPREMUM);
        self.slots[prev as usize].next = next;
        self.free_slots.push(heap_no);
        self.n_recs -= 1;
        record
    }

    /// Remove every user record from `heap_no` to the end of the page
    pub fn truncate_from(&mut self, heap_no: HeapNo) -> usize {
        let mut removed = 0;
        let mut cur = heap_no;
        while cur != SUPREMUM {
            let next = self.next(cur);
            if self.delete(cur).is_some() {
                removed += 1;
            }
            cur = next;
        }
        removed
    }

    /// Position `tuple` inside the page for `mode`.
    ///
    /// For `GreaterOrEqual` and `Less` a record goes to the low side when it
    /// is smaller than the tuple; for `Greater` and `LessOrEqual` when it is
    /// smaller or equal.
    pub fn search(&self, tuple: &Tuple, mode: SearchMode) -> PagePosition {
        let mut pos = PagePosition {
            low: INFIMUM,
            up: SUPREMUM,
            low_match: MatchDepth::default(),
            up_match: MatchDepth::default(),
        };
        for (heap_no, rec) in self.user_records() {
            let (ord, depth) = compare_with_match(tuple, rec);
            let goes_low = match mode {
                SearchMode::GreaterOrEqual | SearchMode::Less => ord == Ordering::Greater,
                SearchMode::Greater | SearchMode::LessOrEqual => ord != Ordering::Less,
            };
            if goes_low {
                pos.low = heap_no;
                pos.low_match = depth;
            } else {
                pos.up = heap_no;
                pos.up_match = depth;
                break;
            }
        }
        pos
    }
}

/// Iterator over the user records of a page
pub struct UserRecords<'a> {
    page: &'a Page,
    cur: HeapNo,
}

impl<'a> Iterator for UserRecords<'a> {
    type Item = (HeapNo, &'a Record);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cur != SUPREMUM {
            let heap_no = self.cur;
            self.cur = self.page.next(heap_no);
            if let Some(rec) = self.page.record(heap_no) {
                return Some((heap_no, rec));
            }
        }
        None
    }
}
