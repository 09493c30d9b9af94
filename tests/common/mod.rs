//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use oxiahi::buf::Block;
use oxiahi::prelude::*;
use oxiahi::record::HeapNo;

pub struct Fixture {
    pub pool: Arc<BufferPool>,
    pub ahi: Arc<AdaptiveHashIndex>,
    pub index: Arc<Index>,
}

impl Fixture {
    /// One index over rows of `n_fields` fields, `n_unique` of them unique.
    pub fn new(partitions: usize, n_fields: usize, n_unique: usize) -> Self {
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            blocks: 16,
            page_capacity: 32,
        }));
        let ahi = Arc::new(AdaptiveHashIndex::with_size(64, partitions).unwrap());
        let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "it", n_fields, n_unique));
        Self { pool, ahi, index }
    }

    /// Create page `page_no` holding `rows` in the given order.
    pub fn page(&self, page_no: u32, rows: &[&[u64]]) -> &Block {
        let block = self
            .pool
            .create_page(PageId::new(0, page_no), self.index.id())
            .unwrap();
        let mut guard = block.latch(LatchMode::ModifyLeaf);
        let page = guard.page_mut().unwrap();
        for row in rows {
            page.push_back(Record::from_u64s(row)).unwrap();
        }
        block
    }

    /// Build the hash of `block` under the fixture index.
    pub fn build(&self, block: &Block, prefix: HashPrefix) -> Status {
        let guard = block.latch(LatchMode::SearchLeaf);
        self.ahi.build_page_hash(&self.index, block, &guard, prefix)
    }

    pub fn guess(&self, key: &[u64], mode: SearchMode) -> Guess<'_> {
        self.ahi.guess(
            &self.pool,
            &self.index,
            &Tuple::from_u64s(key),
            mode,
            LatchMode::SearchLeaf,
        )
    }

    /// Total hash nodes across all partitions
    pub fn nodes(&self) -> usize {
        self.ahi.stats_snapshot().total_nodes
    }
}

pub fn heap_of(block: &Block, row: &[u64]) -> HeapNo {
    let want = Record::from_u64s(row);
    let guard = block.latch(LatchMode::SearchLeaf);
    guard
        .user_records()
        .find(|(_, rec)| **rec == want)
        .map(|(heap_no, _)| heap_no)
        .unwrap()
}

/// First field of a record as an integer
pub fn key_of(rec: &Record) -> u64 {
    u64::from_be_bytes(rec.fields()[0].data().unwrap().try_into().unwrap())
}

/// A tree with small pages over a fresh pool and hash index
pub fn tree(page_capacity: usize, blocks: usize) -> BTree {
    let pool = Arc::new(BufferPool::new(BufferPoolConfig {
        blocks,
        page_capacity,
    }));
    let ahi = Arc::new(AdaptiveHashIndex::with_size(1024, 4).unwrap());
    let index = ahi.info_create(IndexMeta::new(IndexId::new(7), "pk", 2, 1));
    BTree::create(index, pool, ahi, 0).unwrap()
}

pub fn row(k: u64) -> Record {
    Record::from_u64s(&[k, k.wrapping_mul(31)])
}

pub fn key(k: u64) -> Tuple {
    Tuple::from_u64s(&[k])
}
