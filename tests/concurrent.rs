//! Multi-threaded stress: searches, inserts and deletes racing each other
//! and a thread that keeps turning the hash index off and on.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{key, key_of, row, tree};
use oxiahi::prelude::*;

const THREADS: u64 = 4;
const PER_THREAD: u64 = 300;

#[test]
fn test_concurrent_insert_search_with_toggling() {
    let tree = Arc::new(tree(8, 1024));
    let stop = Arc::new(AtomicBool::new(false));

    let toggler = {
        let tree = Arc::clone(&tree);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut flips = 0;
            while !stop.load(Ordering::Acquire) {
                tree.ahi().disable(tree.pool());
                thread::sleep(Duration::from_millis(1));
                tree.ahi().enable();
                thread::sleep(Duration::from_millis(3));
                flips += 1;
            }
            flips
        })
    };

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base = t * 10_000;
                for i in 0..PER_THREAD {
                    assert_eq!(tree.insert(row(base + i)), Status::Ok);
                    for j in 0..=i.min(8) {
                        let k = base + i - j;
                        assert_eq!(tree.get(&key(k)).unwrap(), Some(row(k)));
                    }
                }
                for i in (0..PER_THREAD).step_by(2) {
                    assert_eq!(tree.delete(&key(base + i)), Status::Ok);
                }
                for i in 0..PER_THREAD {
                    let want = (i % 2 == 1).then(|| row(base + i));
                    assert_eq!(tree.get(&key(base + i)).unwrap(), want);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    assert!(toggler.join().unwrap() > 0);

    assert_eq!(tree.check_structure(), Status::Ok);
    assert!(tree.ahi().validate(tree.pool()).is_ok());
    let keys: Vec<u64> = tree.records().unwrap().iter().map(key_of).collect();
    let mut want: Vec<u64> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).filter(|i| i % 2 == 1).map(move |i| t * 10_000 + i))
        .collect();
    want.sort_unstable();
    assert_eq!(keys, want);
}

#[test]
fn test_concurrent_readers_on_hashed_pages() {
    let tree = Arc::new(tree(16, 256));
    for k in 0..500 {
        tree.insert(row(k));
    }
    for _ in 0..3 {
        for k in 0..500 {
            tree.get(&key(k)).unwrap();
        }
    }
    assert!(tree.ahi().info_ref_count(tree.index()) > 0);

    let readers: Vec<_> = (0..4u64)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..5_000u64 {
                    let k = (i * 7 + t * 13) % 500;
                    assert_eq!(tree.get(&key(k)).unwrap(), Some(row(k)));
                }
            })
        })
        .collect();
    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for k in 500..900 {
                assert_eq!(tree.insert(row(k)), Status::Ok);
            }
        })
    };

    for r in readers {
        r.join().unwrap();
    }
    writer.join().unwrap();

    assert!(tree.ahi().stats().counters().hash_succ > 0);
    assert_eq!(tree.check_structure(), Status::Ok);
    assert!(tree.ahi().validate(tree.pool()).is_ok());
}

#[test]
fn test_concurrent_builds_in_one_partition_with_small_heap_blocks() {
    const BUILDERS: u32 = 6;
    const ROWS: u64 = 4;

    for _round in 0..50 {
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            blocks: BUILDERS as usize,
            page_capacity: 8,
        }));
        let ahi = Arc::new(
            AdaptiveHashIndex::create(AhiConfig {
                enabled: true,
                hash_size: 64,
                partitions: 1,
                heap_block_nodes: ROWS as usize,
            })
            .unwrap(),
        );
        let index = ahi.info_create(IndexMeta::new(IndexId::new(1), "pk", 2, 1));
        for page_no in 0..BUILDERS {
            let block = pool.create_page(PageId::new(0, page_no), index.id()).unwrap();
            let mut guard = block.latch(LatchMode::ModifyLeaf);
            for k in 0..ROWS {
                let k = u64::from(page_no) * 100 + k;
                guard.page_mut().unwrap().push_back(row(k)).unwrap();
            }
        }

        let barrier = Arc::new(Barrier::new(BUILDERS as usize));
        let builders: Vec<_> = (0..BUILDERS)
            .map(|page_no| {
                let (pool, ahi, index, barrier) =
                    (Arc::clone(&pool), Arc::clone(&ahi), Arc::clone(&index), Arc::clone(&barrier));
                thread::spawn(move || {
                    let block = pool.lookup(PageId::new(0, page_no)).unwrap();
                    let guard = block.latch(LatchMode::SearchLeaf);
                    barrier.wait();
                    ahi.build_page_hash(&index, block, &guard, HashPrefix::DEFAULT)
                })
            })
            .collect();
        for b in builders {
            assert_eq!(b.join().unwrap(), Status::Ok);
        }

        assert_eq!(ahi.info_ref_count(&index), BUILDERS as usize);
        let table = ahi.partition_for(&index).read();
        for page_no in 0..BUILDERS {
            let block = pool.lookup(PageId::new(0, page_no)).unwrap();
            assert!(block.hash_state().is_hashed());
            assert_eq!(table.count_to_page(block.id()), ROWS as usize);
        }
        drop(table);
        assert!(ahi.validate(&pool).is_ok());
    }
}
