//! Index dictionary entries.
//!
//! An [`Index`] carries the immutable metadata of one B-tree index plus the
//! mutable search statistics the adaptive hash index keeps for it. Indexes
//! are created through [`crate::AdaptiveHashIndex::info_create`] so that the
//! hash index can find them again when a page is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ahi::SearchInfo;

/// Identifier of a B-tree index (never 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexId(u64);

impl IndexId {
    /// Create an index id. `0` is reserved for "no index".
    ///
    /// # Panics
    ///
    /// Panics if `id` is 0. Use [`IndexId::try_new`] for ids that come
    /// from outside the program.
    #[inline]
    pub const fn new(id: u64) -> Self {
        assert!(id != 0, "index id 0 is reserved");
        Self(id)
    }

    /// Create an index id, or `None` for the reserved value 0
    #[inline]
    pub const fn try_new(id: u64) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    /// Raw value
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static description of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Index id
    pub id: IndexId,
    /// Human readable name
    pub name: String,
    /// Number of fields in every record of the index
    pub n_fields: usize,
    /// Number of leading fields that identify a record uniquely in the tree
    pub n_unique_in_tree: usize,
    /// Insert-buffer trees are never hashed
    pub is_insert_buffer: bool,
}

impl IndexMeta {
    /// Describe an ordinary index
    pub fn new(id: IndexId, name: impl Into<String>, n_fields: usize, n_unique_in_tree: usize) -> Self {
        Self {
            id,
            name: name.into(),
            n_fields,
            n_unique_in_tree,
            is_insert_buffer: false,
        }
    }

    /// Mark the index as an insert buffer
    pub fn with_insert_buffer(mut self, is_insert_buffer: bool) -> Self {
        self.is_insert_buffer = is_insert_buffer;
        self
    }
}

/// A registered index: metadata plus hash search statistics
#[derive(Debug)]
pub struct Index {
    meta: IndexMeta,
    partition: usize,
    search_info: SearchInfo,
    does_not_fit_in_memory: AtomicBool,
}

impl Index {
    pub(crate) fn new(meta: IndexMeta, partition: usize) -> Self {
        Self {
            meta,
            partition,
            search_info: SearchInfo::new(),
            does_not_fit_in_memory: AtomicBool::new(false),
        }
    }

    /// Index id
    #[inline]
    pub fn id(&self) -> IndexId {
        self.meta.id
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Static metadata
    #[inline]
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Number of fields that identify a record in the tree
    #[inline]
    pub fn n_unique_in_tree(&self) -> usize {
        self.meta.n_unique_in_tree
    }

    /// Whether this is an insert-buffer tree
    #[inline]
    pub fn is_insert_buffer(&self) -> bool {
        self.meta.is_insert_buffer
    }

    /// Hash partition serving this index
    #[inline]
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Hash search statistics
    #[inline]
    pub fn search_info(&self) -> &SearchInfo {
        &self.search_info
    }

    /// Whether the index was flagged as too large to keep hot in memory.
    /// Such indexes never accumulate per-page build credit.
    #[inline]
    pub fn does_not_fit_in_memory(&self) -> bool {
        self.does_not_fit_in_memory.load(Ordering::Relaxed)
    }

    /// Set the "does not fit in memory" knob
    pub fn set_does_not_fit_in_memory(&self, value: bool) {
        self.does_not_fit_in_memory.store(value, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_id_try_new() {
        assert_eq!(IndexId::try_new(0), None);
        assert_eq!(IndexId::try_new(7), Some(IndexId::new(7)));
        assert_eq!(IndexId::new(7).get(), 7);
    }

    #[test]
    #[should_panic]
    fn test_index_id_zero_rejected() {
        let _ = IndexId::new(0);
    }

    #[test]
    fn test_index_accessors() {
        let meta = IndexMeta::new(IndexId::new(3), "sec", 3, 2).with_insert_buffer(false);
        let index = Index::new(meta, 1);
        assert_eq!(index.id(), IndexId::new(3));
        assert_eq!(index.name(), "sec");
        assert_eq!(index.n_unique_in_tree(), 2);
        assert_eq!(index.partition(), 1);
        assert!(!index.does_not_fit_in_memory());
        index.set_does_not_fit_in_memory(true);
        assert!(index.does_not_fit_in_memory());
    }
}
