//! End-to-end scenarios: warmup, hit, miss and recovery, split, disable
//! racing a search, and flush.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{heap_of, Fixture};
use oxiahi::ahi::SearchMatches;
use oxiahi::constants::BUILD_LIMIT;
use oxiahi::prelude::*;

// A descent that matched both fields of the tuple on the up side.
const EXACT: SearchMatches = SearchMatches {
    low_match: 0,
    low_bytes: 0,
    up_match: 2,
    up_bytes: 0,
};

fn descend_to<'a>(block: &'a oxiahi::buf::Block, row: &[u64], flag: CursorFlag, m: SearchMatches) -> Cursor<'a> {
    let mut cursor = Cursor::new(block.latch(LatchMode::SearchLeaf), heap_of(block, row));
    cursor.set_flag(flag);
    cursor.set_matches(m);
    cursor
}

fn warm_up(f: &Fixture, block: &oxiahi::buf::Block, row: &[u64]) -> usize {
    let mut calls = 0;
    while !block.hash_state().is_hashed() {
        let cursor = descend_to(block, row, CursorFlag::Binary, EXACT);
        f.ahi.info_update(&f.index, &cursor);
        calls += 1;
        assert!(calls <= 2 * BUILD_LIMIT as usize, "page never hashed");
    }
    calls
}

#[test]
fn test_warmup_builds_after_build_limit() {
    let f = Fixture::new(1, 3, 2);
    let block = f.page(0, &[&[1, 1, 0], &[5, 7, 0], &[9, 9, 0]]);

    assert!(matches!(
        f.guess(&[5, 7], SearchMode::GreaterOrEqual),
        Guess::Miss(CursorFlag::Binary)
    ));
    assert_eq!(f.index.search_info().n_hash_potential(), 0);

    let cursor = descend_to(block, &[5, 7, 0], CursorFlag::Binary, EXACT);
    f.ahi.info_update(&f.index, &cursor);
    drop(cursor);
    assert_eq!(f.index.search_info().n_hash_potential(), 1);
    assert_eq!(f.index.search_info().prefix(), HashPrefix::new(2, 0, true));

    for _ in 1..BUILD_LIMIT - 1 {
        let cursor = descend_to(block, &[5, 7, 0], CursorFlag::Binary, EXACT);
        f.ahi.info_update(&f.index, &cursor);
    }
    assert!(!block.hash_state().is_hashed());

    let cursor = descend_to(block, &[5, 7, 0], CursorFlag::Binary, EXACT);
    f.ahi.info_update(&f.index, &cursor);
    drop(cursor);
    assert!(block.hash_state().is_hashed_with(f.index.id(), HashPrefix::new(2, 0, true)));
    assert_eq!(f.ahi.info_ref_count(&f.index), 1);
    assert_eq!(f.nodes(), 3);
}

#[test]
fn test_hit_after_warmup() {
    let f = Fixture::new(1, 3, 2);
    let block = f.page(0, &[&[1, 1, 0], &[5, 7, 0], &[9, 9, 0]]);
    assert_eq!(warm_up(&f, block, &[5, 7, 0]), BUILD_LIMIT as usize);

    let guess = f.guess(&[5, 7], SearchMode::GreaterOrEqual);
    assert_eq!(guess.flag(), CursorFlag::Hash);
    let cursor = guess.into_cursor().unwrap();
    assert_eq!(cursor.record(), Some(&Record::from_u64s(&[5, 7, 0])));
    assert_eq!(cursor.block().id(), block.id());
    assert!(f.index.search_info().last_hash_succ());
    drop(cursor);

    assert_eq!(f.ahi.stats().counters().hash_succ, 1);
}

#[test]
fn test_guess_on_busy_page_resets_last_success() {
    let f = Fixture::new(1, 3, 2);
    let block = f.page(0, &[&[1, 1, 0], &[5, 7, 0], &[9, 9, 0]]);
    warm_up(&f, block, &[5, 7, 0]);
    assert!(f.guess(&[5, 7], SearchMode::GreaterOrEqual).is_hit());
    assert!(f.index.search_info().last_hash_succ());

    let writer = block.latch(LatchMode::ModifyLeaf);
    assert!(matches!(
        f.guess(&[5, 7], SearchMode::GreaterOrEqual),
        Guess::Miss(CursorFlag::Binary)
    ));
    assert!(!f.index.search_info().last_hash_succ());
    assert_eq!(f.ahi.stats().counters().hash_fail, 1);
    drop(writer);

    assert!(f.guess(&[5, 7], SearchMode::GreaterOrEqual).is_hit());
}

#[test]
fn test_miss_then_recovery_through_hash_ref() {
    let f = Fixture::new(1, 3, 2);
    let block = f.page(0, &[&[5, 7, 1], &[5, 7, 2], &[5, 7, 3]]);

    let cursor = descend_to(block, &[5, 7, 1], CursorFlag::Binary, EXACT);
    f.ahi.info_update(&f.index, &cursor);
    drop(cursor);
    let prefix = f.index.search_info().prefix();
    assert_eq!(prefix, HashPrefix::new(2, 0, true));
    assert_eq!(f.build(block, prefix), Status::Ok);
    // All three records share one fold; the left-most one is kept.
    assert_eq!(f.nodes(), 1);

    assert!(matches!(
        f.guess(&[5, 7, 3], SearchMode::GreaterOrEqual),
        Guess::Miss(CursorFlag::HashFail)
    ));
    assert_eq!(f.ahi.stats().counters().hash_fail, 1);

    let m = SearchMatches {
        low_match: 2,
        low_bytes: 0,
        up_match: 3,
        up_bytes: 0,
    };
    let cursor = descend_to(block, &[5, 7, 3], CursorFlag::HashFail, m);
    f.ahi.info_update(&f.index, &cursor);
    drop(cursor);
    assert_eq!(f.nodes(), 1);

    let hit = f
        .guess(&[5, 7, 3], SearchMode::GreaterOrEqual)
        .into_cursor()
        .unwrap();
    assert_eq!(hit.record(), Some(&Record::from_u64s(&[5, 7, 3])));
}

#[test]
fn test_split_moves_hash_to_new_page() {
    let f = Fixture::new(2, 1, 1);
    let prefix = HashPrefix::new(1, 0, true);
    let a = f.page(0, &[&[1], &[2], &[3], &[4]]);
    let b = f.pool.create_page(PageId::new(0, 1), f.index.id()).unwrap();
    assert_eq!(f.build(a, prefix), Status::Ok);
    assert_eq!(f.ahi.info_ref_count(&f.index), 1);

    {
        let mut ga = a.latch(LatchMode::ModifyLeaf);
        let mut gb = b.latch(LatchMode::ModifyLeaf);
        let split_at = heap_of_locked(&ga, 3);
        let moved: Vec<Record> = ga
            .user_records()
            .skip_while(|(heap_no, _)| *heap_no != split_at)
            .map(|(_, rec)| rec.clone())
            .collect();
        for rec in moved {
            gb.page_mut().unwrap().push_back(rec).unwrap();
        }
        f.ahi.move_or_delete(&f.index, b, &gb, a, &ga);
        ga.page_mut().unwrap().truncate_from(split_at);
    }

    assert!(!a.hash_state().is_hashed());
    assert!(b.hash_state().is_hashed_with(f.index.id(), prefix));
    assert_eq!(f.ahi.info_ref_count(&f.index), 1);
    assert_eq!(f.nodes(), 2);
    assert!(f.ahi.validate(&f.pool).is_ok());
}

fn heap_of_locked(page: &oxiahi::buf::Page, key: u64) -> oxiahi::record::HeapNo {
    let want = Record::from_u64s(&[key]);
    page.user_records()
        .find(|(_, rec)| **rec == want)
        .map(|(heap_no, _)| heap_no)
        .unwrap()
}

#[test]
fn test_disable_during_search() {
    let f = Arc::new(Fixture::new(2, 3, 2));
    let block = f.page(0, &[&[1, 1, 0], &[5, 7, 0], &[9, 9, 0]]);
    warm_up(&f, block, &[5, 7, 0]);

    let barrier = Arc::new(Barrier::new(2));
    let searcher = {
        let f = Arc::clone(&f);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let mut hits = 0;
            for _ in 0..2_000 {
                if let Guess::Hit(cursor) = f.guess(&[5, 7], SearchMode::GreaterOrEqual) {
                    assert_eq!(cursor.record(), Some(&Record::from_u64s(&[5, 7, 0])));
                    hits += 1;
                }
            }
            hits
        })
    };

    barrier.wait();
    f.ahi.disable(&f.pool);
    let hits = searcher.join().unwrap();
    assert!(hits <= 2_000);

    assert!(matches!(
        f.guess(&[5, 7], SearchMode::GreaterOrEqual),
        Guess::Miss(CursorFlag::Binary)
    ));
    assert_eq!(f.ahi.info_ref_count(&f.index), 0);
    assert!(!block.hash_state().is_hashed());
}

#[test]
fn test_flush_all_then_enable() {
    let f = Fixture::new(4, 3, 2);
    let block = f.page(0, &[&[1, 1, 0], &[5, 7, 0], &[9, 9, 0]]);
    warm_up(&f, block, &[5, 7, 0]);
    assert!(f.nodes() > 0);

    f.ahi.disable(&f.pool);
    f.ahi.enable();

    assert!(matches!(
        f.guess(&[5, 7], SearchMode::GreaterOrEqual),
        Guess::Miss(CursorFlag::Binary)
    ));
    let report = f.ahi.validate(&f.pool);
    assert_eq!(report.nodes, 0);
    assert!(report.is_ok());
}
