//! The adaptive hash index.
//!
//! A partitioned hash table maps folds to leaf records of hot pages. Each
//! index is served by exactly one partition, chosen from its id. A
//! partition's latch protects its chains, its node heap, and the current
//! hash parameters (`curr_*`, `index`) of every block hashed under an index
//! that maps to it.
//!
//! Latch order, outermost first: B-tree page latches, then one partition
//! latch, then the index registry. Heap blocks are allocated before a
//! partition latch is taken and installed as that partition's spare.

mod block_state;
mod build;
mod guess;
mod heap;
mod maintenance;
mod partition;
mod search_info;
mod validate;

pub use block_state::BlockHashState;
pub use guess::Guess;
pub use partition::{HashPartition, InsertOutcome, PartitionTable};
pub use search_info::{HashPrefix, SearchInfo, SearchMatches};
pub use validate::ValidateReport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buf::{Block, BlockFreeHook, BufferPool, Page};
use crate::constants::DEFAULT_HEAP_BLOCK_NODES;
use crate::dict::{Index, IndexId, IndexMeta};
use crate::stats::{AhiStats, AhiStatsSnapshot, PartitionStats};
use crate::status::Status;
use crate::utility::murmur3_finalize;

/// Adaptive hash index sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AhiConfig {
    /// Start enabled
    pub enabled: bool,
    /// Total bucket chains across all partitions
    pub hash_size: u64,
    /// Number of partitions
    pub partitions: usize,
    /// Hash nodes per heap block
    pub heap_block_nodes: usize,
}

impl AhiConfig {
    /// Default total bucket count
    pub const DEFAULT_HASH_SIZE: u64 = 1 << 16;
    /// Default partition count
    pub const DEFAULT_PARTITIONS: usize = 8;

    /// Check the sizing
    pub fn validate(&self) -> Result<(), Status> {
        if self.partitions == 0 {
            return Err(Status::InvalidArgument);
        }
        if self.hash_size < self.partitions as u64 {
            return Err(Status::InvalidArgument);
        }
        if self.heap_block_nodes == 0 {
            return Err(Status::InvalidArgument);
        }
        Ok(())
    }

    /// Buckets per partition before rounding to a power of two
    pub fn buckets_per_partition(&self) -> u64 {
        self.hash_size.div_ceil(self.partitions as u64)
    }
}

impl Default for AhiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_size: Self::DEFAULT_HASH_SIZE,
            partitions: Self::DEFAULT_PARTITIONS,
            heap_block_nodes: DEFAULT_HEAP_BLOCK_NODES,
        }
    }
}

/// The adaptive hash index system
pub struct AdaptiveHashIndex {
    config: AhiConfig,
    partitions: Box<[HashPartition]>,
    enabled: AtomicBool,
    indexes: RwLock<HashMap<IndexId, Arc<Index>>>,
    stats: AhiStats,
}

impl AdaptiveHashIndex {
    /// Create the hash index with `config.hash_size` buckets spread over
    /// `config.partitions` partitions.
    pub fn create(config: AhiConfig) -> Result<Self, Status> {
        config.validate()?;
        let per_partition = config.buckets_per_partition();
        let partitions: Box<[HashPartition]> = (0..config.partitions)
            .map(|id| HashPartition::new(id, per_partition, config.heap_block_nodes))
            .collect();

        tracing::info!(
            partitions = config.partitions,
            buckets_per_partition = partitions[0].read().n_buckets(),
            enabled = config.enabled,
            "adaptive hash index created"
        );

        Ok(Self {
            config,
            partitions,
            enabled: AtomicBool::new(config.enabled),
            indexes: RwLock::new(HashMap::new()),
            stats: AhiStats::new(),
        })
    }

    /// Create with default heap sizing
    pub fn with_size(hash_size: u64, partitions: usize) -> Result<Self, Status> {
        Self::create(AhiConfig {
            hash_size,
            partitions,
            ..AhiConfig::default()
        })
    }

    /// Release every partition. Equivalent to dropping the value.
    pub fn destroy(self) {
        tracing::info!(
            nodes = self.partitions.iter().map(|p| p.read().n_nodes()).sum::<usize>(),
            "adaptive hash index destroyed"
        );
    }

    /// Configuration
    pub fn config(&self) -> &AhiConfig {
        &self.config
    }

    /// Whether guesses and builds are allowed. Unlatched read.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of partitions
    #[inline]
    pub fn n_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Partition by number
    #[inline]
    pub fn partition(&self, id: usize) -> &HashPartition {
        &self.partitions[id]
    }

    /// Partition number serving `index_id`
    #[inline]
    pub fn partition_of(&self, index_id: IndexId) -> usize {
        (murmur3_finalize(index_id.get()) % self.partitions.len() as u64) as usize
    }

    /// Partition serving `index`
    #[inline]
    pub fn partition_for(&self, index: &Index) -> &HashPartition {
        &self.partitions[self.partition_of(index.id())]
    }

    /// Event counters
    pub fn stats(&self) -> &AhiStats {
        &self.stats
    }

    /// Register an index and create its search statistics. Registering an
    /// id twice returns the existing entry.
    pub fn info_create(&self, meta: IndexMeta) -> Arc<Index> {
        let mut indexes = self.indexes.write();
        if let Some(existing) = indexes.get(&meta.id) {
            tracing::warn!(index = %meta.id, name = %meta.name, "index registered twice");
            return Arc::clone(existing);
        }
        let partition = self.partition_of(meta.id);
        let index = Arc::new(Index::new(meta, partition));
        indexes.insert(index.id(), Arc::clone(&index));

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(index = %index.id(), name = index.name(), partition, "search info created");
        }
        index
    }

    /// Unregister an index. Fails with `InvalidOperation` while any page is
    /// still hashed under it.
    pub fn info_destroy(&self, index: &Index) -> Status {
        if index.search_info().ref_count() > 0 {
            return Status::InvalidOperation;
        }
        match self.indexes.write().remove(&index.id()) {
            Some(_) => Status::Ok,
            None => Status::NotFound,
        }
    }

    /// Number of pages hashed under `index`
    pub fn info_ref_count(&self, index: &Index) -> usize {
        index.search_info().ref_count()
    }

    /// Registered index by id
    pub fn lookup_index(&self, id: IndexId) -> Option<Arc<Index>> {
        self.indexes.read().get(&id).cloned()
    }

    /// Turn the hash index back on. Tables start empty.
    pub fn enable(&self) {
        let _tables: Vec<_> = self.partitions.iter().map(HashPartition::write).collect();
        self.enabled.store(true, Ordering::Release);
        tracing::info!("adaptive hash index enabled");
    }

    /// Turn the hash index off and forget every entry.
    ///
    /// All partitions are latched exclusively, in partition order, so no
    /// lookup, build or row update can interleave.
    pub fn disable(&self, pool: &BufferPool) {
        let mut tables: Vec<_> = self.partitions.iter().map(HashPartition::write).collect();
        self.enabled.store(false, Ordering::Release);

        for index in self.indexes.read().values() {
            index.search_info().reset_ref_count();
        }
        let mut unhashed = 0usize;
        for block in pool.blocks() {
            if block.hash_state().is_hashed() {
                block.hash_state().clear_index();
                unhashed += 1;
            }
        }
        let mut nodes = 0usize;
        for table in tables.iter_mut() {
            nodes += table.n_nodes();
            table.clear();
        }
        drop(tables);

        tracing::info!(pages = unhashed, nodes, "adaptive hash index disabled");
    }

    /// Counters plus per-partition occupancy
    pub fn stats_snapshot(&self) -> AhiStatsSnapshot {
        let partitions: Vec<PartitionStats> = self
            .partitions
            .iter()
            .map(|p| {
                let table = p.read();
                PartitionStats {
                    id: p.id(),
                    buckets: table.n_buckets(),
                    nodes: table.n_nodes(),
                    heap_blocks: table.n_heap_blocks(),
                    has_free_block: table.has_free_block(),
                }
            })
            .collect();
        AhiStatsSnapshot {
            enabled: self.is_enabled(),
            total_nodes: partitions.iter().map(|p| p.nodes).sum(),
            total_heap_blocks: partitions.iter().map(|p| p.heap_blocks).sum(),
            partitions,
            counters: self.stats.counters(),
            hit_rate: self.stats.hit_rate(),
            corrupted: self.stats.is_corrupted(),
        }
    }
}

impl BlockFreeHook for AdaptiveHashIndex {
    fn on_block_free(&self, block: &Block, page: &Page) {
        self.drop_page_hash(block, page);
    }
}

impl std::fmt::Debug for AdaptiveHashIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveHashIndex")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("indexes", &self.indexes.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buf::BufferPoolConfig;

    fn ahi(partitions: usize) -> AdaptiveHashIndex {
        AdaptiveHashIndex::with_size(64, partitions).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(AhiConfig::default().validate().is_ok());
        let bad = AhiConfig {
            partitions: 0,
            ..AhiConfig::default()
        };
        assert_eq!(bad.validate(), Err(Status::InvalidArgument));
        let bad = AhiConfig {
            hash_size: 2,
            partitions: 4,
            ..AhiConfig::default()
        };
        assert_eq!(bad.validate(), Err(Status::InvalidArgument));
        assert!(AdaptiveHashIndex::create(bad).is_err());
    }

    #[test]
    fn test_partition_sizing() {
        let ahi = AdaptiveHashIndex::with_size(100, 3).unwrap();
        assert_eq!(ahi.n_partitions(), 3);
        for i in 0..3 {
            assert_eq!(ahi.partition(i).read().n_buckets(), 64);
        }
    }

    #[test]
    fn test_partition_of_is_stable() {
        let ahi = ahi(4);
        let id = IndexId::new(42);
        assert_eq!(ahi.partition_of(id), ahi.partition_of(id));
        assert!(ahi.partition_of(id) < 4);

        let index = ahi.info_create(IndexMeta::new(id, "i", 2, 1));
        assert_eq!(index.partition(), ahi.partition_of(id));
        assert_eq!(ahi.partition_for(&index).id(), index.partition());
    }

    #[test]
    fn test_info_create_and_destroy() {
        let ahi = ahi(2);
        let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "pk", 2, 1));
        let again = ahi.info_create(IndexMeta::new(IndexId::new(1), "pk", 2, 1));
        assert!(Arc::ptr_eq(&index, &again));
        assert_eq!(ahi.info_ref_count(&index), 0);
        assert!(ahi.lookup_index(IndexId::new(1)).is_some());

        index.search_info().inc_ref_count();
        assert_eq!(ahi.info_destroy(&index), Status::InvalidOperation);
        index.search_info().dec_ref_count();
        assert_eq!(ahi.info_destroy(&index), Status::Ok);
        assert!(ahi.lookup_index(IndexId::new(1)).is_none());
        assert_eq!(ahi.info_destroy(&index), Status::NotFound);
    }

    #[test]
    fn test_disable_enable() {
        let ahi = ahi(2);
        let pool = BufferPool::new(BufferPoolConfig {
            blocks: 2,
            page_capacity: 4,
        });
        assert!(ahi.is_enabled());
        ahi.disable(&pool);
        assert!(!ahi.is_enabled());
        assert!(!ahi.stats_snapshot().enabled);
        ahi.enable();
        assert!(ahi.is_enabled());
    }

    #[test]
    fn test_stats_snapshot_shape() {
        let ahi = ahi(4);
        let snap = ahi.stats_snapshot();
        assert_eq!(snap.partitions.len(), 4);
        assert_eq!(snap.total_nodes, 0);
        assert_eq!(snap.counters.searches, 0);
    }
}
