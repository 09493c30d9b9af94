//! oxiahi - An adaptive hash index for B-tree leaf pages
//!
//! The adaptive hash index (AHI) is a transparent, in-memory secondary hash
//! index maintained automatically for hot leaf pages of an ordered B-tree. It
//! remembers which leaf record a given *fold* (the hash of a key prefix)
//! resolves to, so that an exact-match search can skip the root-to-leaf
//! descent whenever the cached guess still verifies.
//!
//! # Features
//!
//! - Partitioned hash table, one reader/writer latch per partition
//! - Per-index search statistics that decide which key prefix is worth hashing
//! - Whole-page build and drop, relocation on page split and merge
//! - Row-level maintenance on insert and delete
//! - Speculative lookups that never return a record they could not verify
//!
//! The crate ships the host collaborators the index needs (an in-memory
//! buffer pool, a record layer and a leaf-chain B-tree driver) so it can be
//! exercised end to end.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oxiahi::prelude::*;
//!
//! let pool = Arc::new(BufferPool::new(BufferPoolConfig::default()));
//! let ahi = Arc::new(AdaptiveHashIndex::create(AhiConfig::default())?);
//! let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "pk", 2, 1));
//! let tree = BTree::create(index, pool, ahi, 0)?;
//!
//! tree.insert(Record::from_u64s(&[7, 70])).into_result()?;
//! let hit = tree.get(&Tuple::from_u64s(&[7]))?;
//! assert_eq!(hit, Some(Record::from_u64s(&[7, 70])));
//! ```

#![warn(missing_docs)]

pub mod ahi;
pub mod btr;
pub mod buf;
pub mod config;
pub mod dict;
pub mod fold;
pub mod record;
pub mod stats;
pub mod status;
mod utility;

// Re-exports for convenience
pub use ahi::{AdaptiveHashIndex, AhiConfig, Guess, HashPrefix};
pub use btr::{BTree, Cursor, CursorFlag, SearchMode};
pub use buf::{BufferPool, BufferPoolConfig, LatchMode};
pub use status::Status;

/// Constants used throughout the library
pub mod constants {
    /// A page is worth hashing once more than `n_recs / PAGE_BUILD_LIMIT`
    /// searches on it would have succeeded with the recommended prefix.
    pub const PAGE_BUILD_LIMIT: usize = 16;

    /// Number of consecutive successful potential hash searches required
    /// before a page build is authorised.
    pub const BUILD_LIMIT: u32 = 100;

    /// Upper bound of the hash potential counter.
    pub const POTENTIAL_CAP: u32 = BUILD_LIMIT + 5;

    /// Number of searches between two statistics updates of an index.
    pub const HASH_ANALYSIS: u32 = 17;

    /// Default number of hash nodes carried by one heap block.
    pub const DEFAULT_HEAP_BLOCK_NODES: usize = 1024;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::ahi::{AdaptiveHashIndex, AhiConfig, Guess, HashPrefix};
    pub use crate::btr::{BTree, Cursor, CursorFlag, SearchMode};
    pub use crate::buf::{BufferPool, BufferPoolConfig, LatchMode, PageId};
    pub use crate::dict::{Index, IndexId, IndexMeta};
    pub use crate::record::{Field, Record, Tuple};
    pub use crate::status::Status;
}
