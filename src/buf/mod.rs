//! Buffer pool shim: block frames, page latches and leaf pages.
//!
//! Pages live entirely in memory. A [`Block`] pairs a page with its
//! reader/writer latch, a pin count and the adaptive hash state of the page
//! it currently holds.

mod block;
mod page;
mod pool;

pub use block::{Block, BlockId, BlockState, LatchMode, PageGuard};
pub use page::{Page, PageId, PageNo, PagePosition, UserRecords, FIL_NULL};
pub use pool::{BlockFreeHook, BufferPool};

/// Buffer pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of block frames
    pub blocks: usize,
    /// Maximum user records per page
    pub page_capacity: usize,
}

impl BufferPoolConfig {
    /// Default number of frames
    pub const DEFAULT_BLOCKS: usize = 256;
    /// Default records per page
    pub const DEFAULT_PAGE_CAPACITY: usize = 64;
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            blocks: Self::DEFAULT_BLOCKS,
            page_capacity: Self::DEFAULT_PAGE_CAPACITY,
        }
    }
}
