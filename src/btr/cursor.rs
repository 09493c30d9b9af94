//! Leaf cursors and search modes.

use crate::ahi::{HashPrefix, SearchMatches};
use crate::buf::{Block, Page, PageGuard};
use crate::fold::Fold;
use crate::record::{HeapNo, Record, RecordRef};

/// Ordered search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Last record strictly smaller than the tuple
    Less,
    /// Last record smaller than or equal to the tuple
    LessOrEqual,
    /// First record strictly greater than the tuple
    Greater,
    /// First record greater than or equal to the tuple
    GreaterOrEqual,
}

/// How a cursor was positioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorFlag {
    /// Positioned by the hash index
    Hash,
    /// A hash guess was tried and failed verification; positioned by descent
    HashFail,
    /// Positioned by descent
    Binary,
}

/// Fold and prefix a hash guess was computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashProbe {
    /// Fold of the search tuple
    pub fold: Fold,
    /// Prefix it was folded with
    pub prefix: HashPrefix,
}

/// A position on a latched leaf page
#[derive(Debug)]
pub struct Cursor<'a> {
    page: PageGuard<'a>,
    heap_no: HeapNo,
    flag: CursorFlag,
    matches: SearchMatches,
    probe: Option<HashProbe>,
}

impl<'a> Cursor<'a> {
    /// Place a cursor on `heap_no` of a latched page
    pub fn new(page: PageGuard<'a>, heap_no: HeapNo) -> Self {
        Self {
            page,
            heap_no,
            flag: CursorFlag::Binary,
            matches: SearchMatches::default(),
            probe: None,
        }
    }

    /// Block holding the page
    #[inline]
    pub fn block(&self) -> &'a Block {
        self.page.block()
    }

    /// The latched page
    #[inline]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Mutable page access under an exclusive latch
    #[inline]
    pub fn page_mut(&mut self) -> Option<&mut Page> {
        self.page.page_mut()
    }

    /// The page guard
    #[inline]
    pub fn guard(&self) -> &PageGuard<'a> {
        &self.page
    }

    /// Give up the cursor and keep the latch
    pub fn into_guard(self) -> PageGuard<'a> {
        self.page
    }

    /// Heap slot the cursor sits on (may be the infimum or supremum)
    #[inline]
    pub fn heap_no(&self) -> HeapNo {
        self.heap_no
    }

    /// Move to another slot of the same page
    pub fn set_heap_no(&mut self, heap_no: HeapNo) {
        self.heap_no = heap_no;
    }

    /// Reference to the record under the cursor
    #[inline]
    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.block().id(), self.heap_no)
    }

    /// Record under the cursor, `None` on the infimum or supremum
    #[inline]
    pub fn record(&self) -> Option<&Record> {
        self.page.record(self.heap_no)
    }

    /// Whether the cursor sits on a user record
    #[inline]
    pub fn is_user_rec(&self) -> bool {
        self.record().is_some()
    }

    /// How the cursor was positioned
    #[inline]
    pub fn flag(&self) -> CursorFlag {
        self.flag
    }

    /// Set how the cursor was positioned
    pub fn set_flag(&mut self, flag: CursorFlag) {
        self.flag = flag;
    }

    /// Match depths against the low and up neighbours
    #[inline]
    pub fn matches(&self) -> SearchMatches {
        self.matches
    }

    /// Set match depths
    pub fn set_matches(&mut self, matches: SearchMatches) {
        self.matches = matches;
    }

    /// Fold and prefix of the hash guess, if one was tried
    #[inline]
    pub fn probe(&self) -> Option<HashProbe> {
        self.probe
    }

    /// Remember the hash guess inputs
    pub fn set_probe(&mut self, probe: Option<HashProbe>) {
        self.probe = probe;
    }
}
