//! Adaptive hash state attached to every buffer block.
//!
//! The recommendation fields and `n_hash_helps` are advisory and updated
//! without latches. The `curr_*` parameters and `index` describe the hash
//! entries that actually exist for the page; they change only while the
//! owning partition is latched exclusively, so a reader holding that latch
//! in either mode sees a consistent snapshot.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};

use super::search_info::HashPrefix;
use crate::dict::IndexId;

/// Hash bookkeeping of one page frame
#[derive(Debug)]
pub struct BlockHashState {
    n_hash_helps: AtomicU32,
    n_fields: AtomicU16,
    n_bytes: AtomicU16,
    left_side: AtomicBool,
    curr_n_fields: AtomicU16,
    curr_n_bytes: AtomicU16,
    curr_left_side: AtomicBool,
    index: AtomicU64,
}

impl Default for BlockHashState {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockHashState {
    /// State of a page that was never hashed
    pub fn new() -> Self {
        Self {
            n_hash_helps: AtomicU32::new(0),
            n_fields: AtomicU16::new(HashPrefix::DEFAULT.n_fields as u16),
            n_bytes: AtomicU16::new(0),
            left_side: AtomicBool::new(true),
            curr_n_fields: AtomicU16::new(0),
            curr_n_bytes: AtomicU16::new(0),
            curr_left_side: AtomicBool::new(true),
            index: AtomicU64::new(0),
        }
    }

    /// Forget everything; used when a frame receives a fresh page
    pub(crate) fn reset(&self) {
        self.n_hash_helps.store(0, Ordering::Relaxed);
        self.set_recommended(HashPrefix::DEFAULT);
        self.curr_n_fields.store(0, Ordering::Relaxed);
        self.curr_n_bytes.store(0, Ordering::Relaxed);
        self.curr_left_side.store(true, Ordering::Relaxed);
        self.index.store(0, Ordering::Release);
    }

    /// Searches on this page that the recommended prefix would have served
    #[inline]
    pub fn n_hash_helps(&self) -> u32 {
        self.n_hash_helps.load(Ordering::Relaxed)
    }

    pub(crate) fn set_n_hash_helps(&self, value: u32) {
        self.n_hash_helps.store(value, Ordering::Relaxed);
    }

    pub(crate) fn bump_n_hash_helps(&self) {
        let n = self.n_hash_helps().saturating_add(1);
        self.n_hash_helps.store(n, Ordering::Relaxed);
    }

    /// Prefix recommended for the next build of this page
    pub fn recommended(&self) -> HashPrefix {
        HashPrefix {
            n_fields: self.n_fields.load(Ordering::Relaxed) as usize,
            n_bytes: self.n_bytes.load(Ordering::Relaxed) as usize,
            left_side: self.left_side.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_recommended(&self, prefix: HashPrefix) {
        self.n_fields.store(prefix.n_fields as u16, Ordering::Relaxed);
        self.n_bytes.store(prefix.n_bytes as u16, Ordering::Relaxed);
        self.left_side.store(prefix.left_side, Ordering::Relaxed);
    }

    /// Prefix the existing entries were built with. Meaningful only while
    /// [`index`](Self::index) is `Some`.
    pub fn current(&self) -> HashPrefix {
        HashPrefix {
            n_fields: self.curr_n_fields.load(Ordering::Acquire) as usize,
            n_bytes: self.curr_n_bytes.load(Ordering::Acquire) as usize,
            left_side: self.curr_left_side.load(Ordering::Acquire),
        }
    }

    /// Index whose entries point into this page, `None` when not hashed
    #[inline]
    pub fn index(&self) -> Option<IndexId> {
        IndexId::try_new(self.index.load(Ordering::Acquire))
    }

    /// Whether the page currently has hash entries
    #[inline]
    pub fn is_hashed(&self) -> bool {
        self.index().is_some()
    }

    /// Whether the page is hashed under `index` with exactly `prefix`
    #[inline]
    pub fn is_hashed_with(&self, index: IndexId, prefix: HashPrefix) -> bool {
        self.index() == Some(index) && self.current() == prefix
    }

    // Caller holds the owning partition latch exclusively.
    pub(crate) fn install(&self, index: IndexId, prefix: HashPrefix) {
        self.curr_n_fields.store(prefix.n_fields as u16, Ordering::Release);
        self.curr_n_bytes.store(prefix.n_bytes as u16, Ordering::Release);
        self.curr_left_side.store(prefix.left_side, Ordering::Release);
        self.index.store(index.get(), Ordering::Release);
    }

    // Caller holds the owning partition latch exclusively (or all of them).
    pub(crate) fn clear_index(&self) {
        self.index.store(0, Ordering::Release);
    }
}
