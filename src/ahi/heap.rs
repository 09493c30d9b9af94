//! Node heap backing one hash partition.
//!
//! Nodes are carved from fixed blocks. Freed nodes are threaded through
//! their `next` link into a free list and reused before the current block
//! grows. A heap never allocates while its partition is latched: the only
//! source of new capacity under the latch is the spare `free_block`, which
//! [`super::partition::HashPartition::ensure_free_block`] installs ahead of
//! time. When that spare is gone an insert fails with `OutOfMemory`.
//!
//! Nodes freed by page drops are reused through the free list before any
//! new block is taken. Once the last node is freed the blocks are released,
//! one of them staying behind as the spare.

use crate::dict::IndexId;
use crate::fold::Fold;
use crate::record::RecordRef;
use crate::status::Status;

/// Address of a hash node: block number in the high half, slot in the low half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

impl NodeId {
    pub(crate) const NIL: NodeId = NodeId(u64::MAX);

    #[inline]
    const fn new(block: usize, slot: usize) -> Self {
        Self(((block as u64) << 32) | slot as u64)
    }

    #[inline]
    const fn block(self) -> usize {
        (self.0 >> 32) as usize
    }

    #[inline]
    const fn slot(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    #[inline]
    pub(crate) const fn is_nil(self) -> bool {
        self.0 == u64::MAX
    }
}

/// One hash chain entry
#[derive(Debug, Clone, Copy)]
pub(crate) struct HashNode {
    pub fold: Fold,
    pub rec: RecordRef,
    pub index_id: IndexId,
    pub next: NodeId,
}

/// A preallocated run of node slots
#[derive(Debug)]
pub(crate) struct HeapBlock {
    nodes: Vec<HashNode>,
}

impl HeapBlock {
    /// Allocate room for `capacity` nodes. Call without any partition latch.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity.max(1)),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    #[inline]
    fn has_room(&self) -> bool {
        self.nodes.len() < self.nodes.capacity()
    }
}

#[derive(Debug)]
pub(crate) struct NodeHeap {
    blocks: Vec<HeapBlock>,
    free_head: NodeId,
    n_free: usize,
    free_block: Option<HeapBlock>,
    n_nodes: usize,
}

impl NodeHeap {
    pub(crate) fn new() -> Self {
        Self {
            blocks: Vec::new(),
            free_head: NodeId::NIL,
            n_free: 0,
            free_block: None,
            n_nodes: 0,
        }
    }

    /// Live nodes
    #[inline]
    pub(crate) fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Blocks in use (the spare is not counted)
    #[inline]
    pub(crate) fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Capacity of the spare block, if one is installed
    #[inline]
    pub(crate) fn free_block_capacity(&self) -> Option<usize> {
        self.free_block.as_ref().map(HeapBlock::capacity)
    }

    /// Nodes that can be allocated without a new spare: the free list, the
    /// room left in the current block and the spare itself
    pub(crate) fn available(&self) -> usize {
        let room = self
            .blocks
            .last()
            .map_or(0, |b| b.capacity() - b.nodes.len());
        self.n_free + room + self.free_block_capacity().unwrap_or(0)
    }

    /// Install `block` as the spare unless an adequate one is present.
    /// Returns the block that was not kept, so it is freed after unlatching.
    pub(crate) fn install_free_block(&mut self, block: HeapBlock) -> Option<HeapBlock> {
        match &self.free_block {
            Some(spare) if spare.capacity() >= block.capacity() => Some(block),
            _ => self.free_block.replace(block),
        }
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> &HashNode {
        &self.blocks[id.block()].nodes[id.slot()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut HashNode {
        &mut self.blocks[id.block()].nodes[id.slot()]
    }

    /// Place `node` in the heap without allocating
    pub(crate) fn alloc(&mut self, node: HashNode) -> Result<NodeId, Status> {
        if !self.free_head.is_nil() {
            let id = self.free_head;
            let slot = self.get_mut(id);
            let next_free = slot.next;
            *slot = node;
            self.free_head = next_free;
            self.n_free -= 1;
            self.n_nodes += 1;
            return Ok(id);
        }

        let needs_block = self.blocks.last().map_or(true, |b| !b.has_room());
        if needs_block {
            let spare = self.free_block.take().ok_or(Status::OutOfMemory)?;
            self.blocks.push(spare);
        }
        let block_no = self.blocks.len() - 1;
        let block = &mut self.blocks[block_no];
        let slot = block.nodes.len();
        block.nodes.push(node);
        self.n_nodes += 1;
        Ok(NodeId::new(block_no, slot))
    }

    /// Return the node to the free list. It must already be unlinked.
    pub(crate) fn free(&mut self, id: NodeId) {
        let head = self.free_head;
        self.get_mut(id).next = head;
        self.free_head = id;
        self.n_free += 1;
        self.n_nodes -= 1;
        if self.n_nodes == 0 {
            self.release_blocks();
        }
    }

    // Keeps one emptied block as the spare if none is installed.
    fn release_blocks(&mut self) {
        let mut blocks = std::mem::take(&mut self.blocks).into_iter();
        if self.free_block.is_none() {
            if let Some(mut block) = blocks.next() {
                block.nodes.clear();
                self.free_block = Some(block);
            }
        }
        self.free_head = NodeId::NIL;
        self.n_free = 0;
    }

    /// Drop every node and block. The spare block survives.
    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
        self.free_head = NodeId::NIL;
        self.n_free = 0;
        self.n_nodes = 0;
    }
}
