//! Fixed-size in-memory buffer pool.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::block::{Block, BlockId, BlockState, LatchMode};
use super::page::{Page, PageId};
use super::BufferPoolConfig;
use crate::dict::IndexId;
use crate::status::Status;

/// Callback run while a block is exclusively latched just before its frame
/// is reused. The hash index uses it to drop the page's entries.
pub trait BlockFreeHook {
    /// Called with the page still intact under an exclusive latch
    fn on_block_free(&self, block: &Block, page: &Page);
}

/// A pool of block frames with a page table
pub struct BufferPool {
    config: BufferPoolConfig,
    blocks: Box<[Block]>,
    page_table: Mutex<HashMap<PageId, BlockId>>,
    free: Mutex<Vec<BlockId>>,
}

impl BufferPool {
    /// Create a pool with every frame on the free list
    pub fn new(config: BufferPoolConfig) -> Self {
        let blocks: Box<[Block]> = (0..config.blocks)
            .map(|i| Block::new(BlockId::new(i as u32), config.page_capacity))
            .collect();
        let free = (0..config.blocks as u32).rev().map(BlockId::new).collect();
        Self {
            config,
            blocks,
            page_table: Mutex::new(HashMap::with_capacity(config.blocks)),
            free: Mutex::new(free),
        }
    }

    /// Pool configuration
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Number of frames
    #[inline]
    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of frames on the free list
    pub fn n_free(&self) -> usize {
        self.free.lock().len()
    }

    /// Frame by id
    #[inline]
    pub fn get_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Iterate every frame, used or not
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Frame holding `page_id`, if resident
    pub fn lookup(&self, page_id: PageId) -> Option<&Block> {
        let id = *self.page_table.lock().get(&page_id)?;
        self.get_block(id)
    }

    /// Allocate a frame for a fresh, empty page of `index_id`
    pub fn create_page(&self, page_id: PageId, index_id: IndexId) -> Result<&Block, Status> {
        if self.page_table.lock().contains_key(&page_id) {
            return Err(Status::InvalidOperation);
        }
        let id = self.free.lock().pop().ok_or(Status::OutOfMemory)?;
        let block = &self.blocks[id.index()];
        {
            let mut guard = block.latch(LatchMode::ModifyLeaf);
            if let Some(page) = guard.page_mut() {
                page.reset(page_id, Some(index_id));
            }
            block.hash_state().reset();
            block.reset_young();
            block.set_page_id(Some(page_id));
            block.set_state(BlockState::FilePage);
        }
        self.page_table.lock().insert(page_id, id);

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!(page = %page_id, block = %id, "page created");
        }
        Ok(block)
    }

    /// Evict `page_id`: latch it exclusively, run `hook`, return the frame
    /// to the free list.
    ///
    /// Returns `InvalidOperation` and keeps the page resident if the hook
    /// left it hashed.
    pub fn evict(&self, page_id: PageId, hook: &dyn BlockFreeHook) -> Status {
        let Some(block) = self.lookup(page_id) else {
            return Status::NotFound;
        };
        let mut guard = block.latch(LatchMode::ModifyLeaf);
        if block.page_id() != Some(page_id) || !block.is_file_page() {
            return Status::NotFound;
        }
        block.set_state(BlockState::RemoveHash);
        hook.on_block_free(block, &guard);
        if block.hash_state().is_hashed() {
            block.set_state(BlockState::FilePage);
            tracing::error!(page = %page_id, block = %block.id(), "evict hook left the page hashed");
            return Status::InvalidOperation;
        }

        self.page_table.lock().remove(&page_id);
        if let Some(page) = guard.page_mut() {
            page.reset(PageId::new(u32::MAX, u32::MAX), None);
        }
        block.set_page_id(None);
        block.set_state(BlockState::NotUsed);
        drop(guard);
        self.free.lock().push(block.id());

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!(page = %page_id, block = %block.id(), "page evicted");
        }
        Status::Ok
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.config)
            .field("n_blocks", &self.blocks.len())
            .field("n_free", &self.n_free())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(blocks: usize) -> BufferPool {
        BufferPool::new(BufferPoolConfig {
            blocks,
            page_capacity: 4,
        })
    }

    #[test]
    fn test_create_and_lookup() {
        let pool = pool(2);
        let id = PageId::new(0, 5);
        let block = pool.create_page(id, IndexId::new(1)).unwrap();
        assert!(block.is_file_page());
        assert_eq!(block.page_id(), Some(id));
        assert_eq!(pool.lookup(id).map(Block::id), Some(block.id()));
        assert_eq!(pool.n_free(), 1);

        let guard = block.latch(LatchMode::SearchLeaf);
        assert_eq!(guard.id(), id);
        assert_eq!(guard.index_id(), Some(IndexId::new(1)));
    }

    #[test]
    fn test_duplicate_page_rejected() {
        let pool = pool(2);
        let id = PageId::new(0, 1);
        pool.create_page(id, IndexId::new(1)).unwrap();
        assert_eq!(
            pool.create_page(id, IndexId::new(1)).err(),
            Some(Status::InvalidOperation)
        );
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = pool(1);
        pool.create_page(PageId::new(0, 1), IndexId::new(1)).unwrap();
        assert_eq!(
            pool.create_page(PageId::new(0, 2), IndexId::new(1)).err(),
            Some(Status::OutOfMemory)
        );
    }

    struct NoopHook;

    impl BlockFreeHook for NoopHook {
        fn on_block_free(&self, _block: &Block, _page: &Page) {}
    }

    struct CountingHook(AtomicUsize);

    impl BlockFreeHook for CountingHook {
        fn on_block_free(&self, block: &Block, page: &Page) {
            assert_eq!(block.state(), BlockState::RemoveHash);
            assert_eq!(page.n_recs(), 1);
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_evict_runs_hook_and_frees_frame() {
        let pool = pool(1);
        let id = PageId::new(0, 1);
        let block = pool.create_page(id, IndexId::new(1)).unwrap();
        block
            .latch(LatchMode::ModifyLeaf)
            .page_mut()
            .unwrap()
            .push_back(Record::from_u64s(&[1]))
            .unwrap();

        let hook = CountingHook(AtomicUsize::new(0));
        assert_eq!(pool.evict(id, &hook), Status::Ok);
        assert_eq!(hook.0.load(Ordering::Relaxed), 1);
        assert!(pool.lookup(id).is_none());
        assert_eq!(pool.n_free(), 1);
        assert_eq!(block.state(), BlockState::NotUsed);
        assert_eq!(pool.evict(id, &NoopHook), Status::NotFound);
    }

    #[test]
    fn test_evict_refuses_page_left_hashed() {
        let pool = pool(1);
        let id = PageId::new(0, 1);
        let block = pool.create_page(id, IndexId::new(1)).unwrap();
        block.hash_state().install(IndexId::new(1), crate::ahi::HashPrefix::DEFAULT);

        assert_eq!(pool.evict(id, &NoopHook), Status::InvalidOperation);
        assert!(block.is_file_page());
        assert_eq!(pool.lookup(id).map(Block::id), Some(block.id()));

        block.hash_state().clear_index();
        assert_eq!(pool.evict(id, &NoopHook), Status::Ok);
        assert_eq!(pool.n_free(), 1);
    }
}
