//! One partition of the adaptive hash index: a chained hash table from fold
//! to record reference, its node heap and the latch protecting both.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::heap::{HashNode, HeapBlock, NodeHeap, NodeId};
use crate::buf::BlockId;
use crate::dict::IndexId;
use crate::fold::Fold;
use crate::record::RecordRef;
use crate::status::Status;
use crate::utility::{is_power_of_two, next_power_of_two};

/// Outcome of [`PartitionTable::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new node was linked
    Inserted,
    /// An existing node with the same fold was redirected
    Replaced,
}

/// Hash chains plus node heap. Reached only through a partition latch.
#[derive(Debug)]
pub struct PartitionTable {
    buckets: Vec<NodeId>,
    mask: u64,
    heap: NodeHeap,
}

impl PartitionTable {
    fn new(n_buckets: u64) -> Self {
        debug_assert!(is_power_of_two(n_buckets));
        Self {
            buckets: vec![NodeId::NIL; n_buckets as usize],
            mask: n_buckets - 1,
            heap: NodeHeap::new(),
        }
    }

    /// Number of bucket chains
    #[inline]
    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Number of live hash nodes
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.heap.n_nodes()
    }

    /// Number of heap blocks holding nodes
    #[inline]
    pub fn n_heap_blocks(&self) -> usize {
        self.heap.n_blocks()
    }

    /// Whether a spare heap block is installed
    #[inline]
    pub fn has_free_block(&self) -> bool {
        self.heap.free_block_capacity().is_some()
    }

    /// Bucket a fold lands in
    #[inline]
    pub fn bucket_of(&self, fold: Fold) -> usize {
        (fold & self.mask) as usize
    }

    fn chain(&self, bucket: usize) -> Chain<'_> {
        Chain {
            heap: &self.heap,
            cur: self.buckets[bucket],
        }
    }

    /// Record stored for `fold`, if any
    pub fn search(&self, fold: Fold) -> Option<RecordRef> {
        self.chain(self.bucket_of(fold))
            .find(|(_, node)| node.fold == fold)
            .map(|(_, node)| node.rec)
    }

    /// Map `fold` to `rec`, redirecting an existing node with the same fold
    pub fn insert(
        &mut self,
        fold: Fold,
        rec: RecordRef,
        index_id: IndexId,
    ) -> Result<InsertOutcome, Status> {
        let bucket = self.bucket_of(fold);
        let existing = self
            .chain(bucket)
            .find(|(_, node)| node.fold == fold)
            .map(|(id, _)| id);
        if let Some(id) = existing {
            let node = self.heap.get_mut(id);
            node.rec = rec;
            node.index_id = index_id;
            return Ok(InsertOutcome::Replaced);
        }

        let head = self.buckets[bucket];
        let id = self.heap.alloc(HashNode {
            fold,
            rec,
            index_id,
            next: head,
        })?;
        self.buckets[bucket] = id;
        Ok(InsertOutcome::Inserted)
    }

    // Unlinks the first node of the bucket matching `pred`.
    fn remove_first(&mut self, fold: Fold, pred: impl Fn(&HashNode) -> bool) -> bool {
        let bucket = self.bucket_of(fold);
        let mut prev = NodeId::NIL;
        let mut cur = self.buckets[bucket];
        while !cur.is_nil() {
            let node = *self.heap.get(cur);
            if node.fold == fold && pred(&node) {
                if prev.is_nil() {
                    self.buckets[bucket] = node.next;
                } else {
                    self.heap.get_mut(prev).next = node.next;
                }
                self.heap.free(cur);
                return true;
            }
            prev = cur;
            cur = node.next;
        }
        false
    }

    /// Remove the node mapping `fold` to exactly `rec`
    pub fn remove_matching(&mut self, fold: Fold, rec: RecordRef) -> bool {
        self.remove_first(fold, |node| node.rec == rec)
    }

    /// Remove every node with `fold` that points into `block`
    pub fn remove_all_to_page(&mut self, fold: Fold, block: BlockId) -> usize {
        let mut removed = 0;
        while self.remove_first(fold, |node| node.rec.block == block) {
            removed += 1;
        }
        removed
    }

    /// Redirect the node mapping `fold` to `old` so it maps to `new`
    pub fn update_record(&mut self, fold: Fold, old: RecordRef, new: RecordRef) -> bool {
        let bucket = self.bucket_of(fold);
        let found = self
            .chain(bucket)
            .find(|(_, node)| node.fold == fold && node.rec == old)
            .map(|(id, _)| id);
        match found {
            Some(id) => {
                self.heap.get_mut(id).rec = new;
                true
            }
            None => false,
        }
    }

    /// Number of nodes pointing into `block`
    pub fn count_to_page(&self, block: BlockId) -> usize {
        self.entries()
            .filter(|(_, node)| node.rec.block == block)
            .count()
    }

    /// Snapshot of every `(fold, record)` pair, sorted
    pub fn snapshot(&self) -> Vec<(Fold, RecordRef)> {
        let mut out: Vec<_> = self.entries().map(|(_, n)| (n.fold, n.rec)).collect();
        out.sort_unstable();
        out
    }

    // (bucket, node) pairs across all chains.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, &HashNode)> + '_ {
        (0..self.buckets.len())
            .flat_map(move |bucket| self.chain(bucket).map(move |(_, node)| (bucket, node)))
    }

    /// Remove every node and free all heap blocks
    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|head| *head = NodeId::NIL);
        self.heap.clear();
    }
}

struct Chain<'a> {
    heap: &'a NodeHeap,
    cur: NodeId,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (NodeId, &'a HashNode);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_nil() {
            return None;
        }
        let id = self.cur;
        let node = self.heap.get(id);
        self.cur = node.next;
        Some((id, node))
    }
}

/// A latched hash partition
#[derive(Debug)]
pub struct HashPartition {
    id: usize,
    nodes_per_block: usize,
    latch: RwLock<PartitionTable>,
}

impl HashPartition {
    /// Create a partition with at least `n_buckets` chains
    pub fn new(id: usize, n_buckets: u64, nodes_per_block: usize) -> Self {
        let n_buckets = next_power_of_two(n_buckets.max(1));
        Self {
            id,
            nodes_per_block,
            latch: RwLock::new(PartitionTable::new(n_buckets)),
        }
    }

    /// Partition number
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Nodes carried by one heap block
    #[inline]
    pub fn nodes_per_block(&self) -> usize {
        self.nodes_per_block
    }

    /// Latch in shared mode
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, PartitionTable> {
        self.latch.read()
    }

    /// Latch in exclusive mode
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, PartitionTable> {
        self.latch.write()
    }

    /// Make sure a spare heap block of at least `min_nodes` nodes is
    /// installed. Allocates before latching; must be called without holding
    /// this partition's latch.
    pub fn ensure_free_block(&self, min_nodes: usize) {
        let wanted = self.nodes_per_block.max(min_nodes);
        if self
            .latch
            .read()
            .heap
            .free_block_capacity()
            .is_some_and(|cap| cap >= wanted)
        {
            return;
        }

        let block = HeapBlock::with_capacity(wanted);
        let unused = self.latch.write().heap.install_free_block(block);
        drop(unused);

        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!(partition = self.id, nodes = wanted, "heap free block installed");
        }
    }

    /// Latch in exclusive mode with room for `min_nodes` new nodes.
    ///
    /// Another thread may use up the spare between [`Self::ensure_free_block`]
    /// and the latch, so the room is re-checked under the latch and the
    /// latch released again to allocate when it falls short.
    pub fn write_reserved(&self, min_nodes: usize) -> RwLockWriteGuard<'_, PartitionTable> {
        loop {
            let table = self.latch.write();
            if table.heap.available() >= min_nodes {
                return table;
            }
            drop(table);
            self.ensure_free_block(min_nodes);
        }
    }
}
