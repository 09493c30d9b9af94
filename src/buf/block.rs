//! Buffer blocks and page latches.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::page::{Page, PageId};
use crate::ahi::BlockHashState;

/// Index of a block frame inside the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a block id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw value
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Position in the pool's frame array
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a block frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    /// Frame is on the free list
    NotUsed = 0,
    /// Frame holds a file page
    FilePage = 1,
    /// Frame is being evicted; its hash entries are being removed
    RemoveHash = 2,
}

impl BlockState {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => BlockState::FilePage,
            2 => BlockState::RemoveHash,
            _ => BlockState::NotUsed,
        }
    }
}

/// Latch mode requested on a leaf page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchMode {
    /// Shared latch for reads
    SearchLeaf,
    /// Exclusive latch for modifications
    ModifyLeaf,
}

const NO_PAGE: u64 = u64::MAX;

/// A buffer frame: one page, its latch and the hash state of that page
pub struct Block {
    id: BlockId,
    state: AtomicU8,
    page_id: AtomicU64,
    fix_count: AtomicU32,
    young: AtomicU64,
    lock: RwLock<Page>,
    hash: BlockHashState,
}

impl Block {
    pub(crate) fn new(id: BlockId, page_capacity: usize) -> Self {
        Self {
            id,
            state: AtomicU8::new(BlockState::NotUsed as u8),
            page_id: AtomicU64::new(NO_PAGE),
            fix_count: AtomicU32::new(0),
            young: AtomicU64::new(0),
            lock: RwLock::new(Page::new(PageId::new(u32::MAX, u32::MAX), None, page_capacity)),
            hash: BlockHashState::new(),
        }
    }

    /// Block id
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> BlockState {
        BlockState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: BlockState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the frame currently holds a file page
    #[inline]
    pub fn is_file_page(&self) -> bool {
        self.state() == BlockState::FilePage
    }

    /// Page held by the frame, if any
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        match self.page_id.load(Ordering::Acquire) {
            NO_PAGE => None,
            raw => Some(PageId::from_u64(raw)),
        }
    }

    pub(crate) fn set_page_id(&self, page_id: Option<PageId>) {
        let raw = page_id.map_or(NO_PAGE, PageId::to_u64);
        self.page_id.store(raw, Ordering::Release);
    }

    /// Number of live page guards (pins) on this block
    #[inline]
    pub fn fix_count(&self) -> u32 {
        self.fix_count.load(Ordering::Acquire)
    }

    /// Hash index state of the page in this frame
    #[inline]
    pub fn hash_state(&self) -> &BlockHashState {
        &self.hash
    }

    /// Note an access that should keep the page resident
    #[inline]
    pub fn make_young(&self) {
        self.young.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of `make_young` calls since the frame was last reused
    #[inline]
    pub fn young_count(&self) -> u64 {
        self.young.load(Ordering::Relaxed)
    }

    pub(crate) fn reset_young(&self) {
        self.young.store(0, Ordering::Relaxed);
    }

    /// Latch the page without waiting
    pub fn try_latch(&self, mode: LatchMode) -> Option<PageGuard<'_>> {
        let latch = match mode {
            LatchMode::SearchLeaf => PageLatch::Shared(self.lock.try_read()?),
            LatchMode::ModifyLeaf => PageLatch::Exclusive(self.lock.try_write()?),
        };
        Some(PageGuard::new(self, latch))
    }

    /// Latch the page, waiting for conflicting holders
    pub fn latch(&self, mode: LatchMode) -> PageGuard<'_> {
        let latch = match mode {
            LatchMode::SearchLeaf => PageLatch::Shared(self.lock.read()),
            LatchMode::ModifyLeaf => PageLatch::Exclusive(self.lock.write()),
        };
        PageGuard::new(self, latch)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("page_id", &self.page_id())
            .field("fix_count", &self.fix_count())
            .field("hash", &self.hash)
            .finish()
    }
}

enum PageLatch<'a> {
    Shared(RwLockReadGuard<'a, Page>),
    Exclusive(RwLockWriteGuard<'a, Page>),
}

/// A latched and pinned page. Dropping the guard releases both.
pub struct PageGuard<'a> {
    block: &'a Block,
    latch: PageLatch<'a>,
}

impl<'a> PageGuard<'a> {
    fn new(block: &'a Block, latch: PageLatch<'a>) -> Self {
        block.fix_count.fetch_add(1, Ordering::AcqRel);
        Self { block, latch }
    }

    /// Block the page lives in
    #[inline]
    pub fn block(&self) -> &'a Block {
        self.block
    }

    /// Mode the latch is held in
    pub fn mode(&self) -> LatchMode {
        match self.latch {
            PageLatch::Shared(_) => LatchMode::SearchLeaf,
            PageLatch::Exclusive(_) => LatchMode::ModifyLeaf,
        }
    }

    /// Mutable page access, only under an exclusive latch
    pub fn page_mut(&mut self) -> Option<&mut Page> {
        match &mut self.latch {
            PageLatch::Exclusive(guard) => Some(&mut **guard),
            PageLatch::Shared(_) => None,
        }
    }
}

impl Deref for PageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match &self.latch {
            PageLatch::Shared(guard) => &**guard,
            PageLatch::Exclusive(guard) => &**guard,
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.block.fix_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageGuard")
            .field("block", &self.block.id)
            .field("mode", &self.mode())
            .field("page", &self.id())
            .finish()
    }
}
