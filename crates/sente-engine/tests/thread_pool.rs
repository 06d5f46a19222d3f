//! Integration tests for the Lazy SMP thread pool.
//!
//! Verifies that every thread count returns a legal move, that stop and
//! ponder signals reach the threads, and that pool reconfiguration between
//! searches keeps it usable.

mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use sente_core::{MoveList, Position, SyntheticPosition};
use sente_engine::{BestMoveResult, EngineError, Limits, Outcome, ThreadPool};

use common::{TreeBuilder, drop_at, playable_root, pool};

/// Helper: search `pos` to `depth` with `threads` threads.
fn search_with_threads(pos: &SyntheticPosition, depth: i32, threads: usize) -> BestMoveResult {
    let mut pool = pool(threads);
    pool.search(pos, Limits::fixed_depth(depth))
}

fn assert_legal(pos: &SyntheticPosition, result: &BestMoveResult) {
    let mv = result.best_move().expect("a move, not a resignation");
    let mut moves = MoveList::new();
    pos.legal_moves(&mut moves);
    assert!(moves.contains(mv), "{mv} is not legal at the root");
}

// ── Basic correctness ─────────────────────────────────────────────────────────

#[test]
fn single_thread_returns_legal_move() {
    let pos = playable_root(1);
    let result = search_with_threads(&pos, 5, 1);
    assert_legal(&pos, &result);
    assert_eq!(result.depth, 5);
    assert_eq!(result.pv.first().copied(), result.best_move());
}

#[test]
fn multi_thread_returns_legal_moves() {
    for threads in [2, 4] {
        for seed in [3, 40, 900] {
            let pos = playable_root(seed);
            let result = search_with_threads(&pos, 5, threads);
            assert_legal(&pos, &result);
            assert!(result.depth >= 5, "{threads} threads reached only depth {}", result.depth);
        }
    }
}

#[test]
fn ponder_move_follows_best_move() {
    let pos = playable_root(12);
    let result = search_with_threads(&pos, 6, 1);
    let best = result.best_move().unwrap();
    if let Some(ponder) = result.ponder {
        let mut after = pos.clone();
        after.make_move(best);
        let mut replies = MoveList::new();
        after.legal_moves(&mut replies);
        assert!(replies.contains(ponder), "ponder move {ponder} is not a reply to {best}");
    }
}

// ── Stop-signal behaviour ─────────────────────────────────────────────────────

#[test]
fn stop_terminates_infinite_search() {
    let (tx, rx) = mpsc::channel::<BestMoveResult>();
    thread::spawn(move || {
        let pos = playable_root(5);
        let mut pool = pool(4);
        pool.start_search(&pos, Limits::infinite());
        thread::sleep(Duration::from_millis(100));
        assert!(pool.is_searching());
        pool.stop();
        let _ = tx.send(pool.wait_for_completion());
    });

    let result = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("stopped search did not report within 10 seconds");
    assert!(matches!(result.outcome, Outcome::Move(_)));
}

#[test]
fn ponder_hit_releases_finished_ponder_search() {
    let (tx, rx) = mpsc::channel::<BestMoveResult>();
    thread::spawn(move || {
        let pos = playable_root(8);
        let mut pool = pool(2);
        let limits = Limits {
            ponder: true,
            ..Limits::fixed_depth(3)
        };
        pool.start_search(&pos, limits);
        // Depth 3 finishes quickly; the result is held while pondering.
        thread::sleep(Duration::from_millis(200));
        assert!(pool.is_searching());
        pool.ponder_hit();
        let _ = tx.send(pool.wait_for_completion());
    });

    let result = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("ponder hit did not release the search");
    assert!(result.best_move().is_some());
}

#[test]
fn new_search_stops_the_running_one() {
    let pos = playable_root(21);
    let mut pool = pool(2);
    pool.start_search(&pos, Limits::infinite());
    thread::sleep(Duration::from_millis(20));
    let result = pool.search(&pos, Limits::fixed_depth(3));
    assert_eq!(result.depth, 3);
    assert!(!pool.is_searching());
}

#[test]
fn failing_evaluation_still_delivers_a_move() {
    let (tx, rx) = mpsc::channel::<(BestMoveResult, BestMoveResult)>();
    thread::spawn(move || {
        let mut tree = TreeBuilder::new();
        let bad = tree.faulty();
        let good = tree.node(0);
        tree.edge(TreeBuilder::ROOT, drop_at("5e"), bad)
            .edge(TreeBuilder::ROOT, drop_at("4e"), good);
        let pos = tree.build();

        let mut pool = pool(3);
        let failed = pool.search(&pos, Limits::fixed_depth(4));
        // The threads survive and the pool keeps working.
        let next = pool.search(&TreeBuilder::new().build(), Limits::fixed_depth(2));
        let _ = tx.send((failed, next));
    });

    let (failed, next) = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("a panicking search thread hung the pool");
    let mv = failed.best_move().expect("a move, not a resignation");
    assert!(mv == drop_at("5e") || mv == drop_at("4e"), "{mv} is not a root move");
    assert_eq!(next.outcome, Outcome::Resign);
}

// ── Node counting ─────────────────────────────────────────────────────────────

#[test]
fn multi_thread_reports_total_nodes() {
    let pos = playable_root(2);
    let single = search_with_threads(&pos, 6, 1);
    let quad = search_with_threads(&pos, 6, 4);
    assert!(single.nodes > 0);
    assert!(quad.nodes > 0);
}

#[test]
fn node_limit_stops_the_search() {
    let pos = playable_root(30);
    let mut pool = pool(1);
    let limits = Limits {
        nodes: Some(20_000),
        ..Limits::default()
    };
    let result = pool.search(&pos, limits);
    assert!(result.best_move().is_some());
    // The limit is checked every 2048 nodes.
    assert!(result.nodes <= 20_000 + 4096, "searched {} nodes", result.nodes);
}

// ── Reconfiguration ───────────────────────────────────────────────────────────

#[test]
fn set_threads_respawns_pool() {
    let pos = playable_root(4);
    let mut pool: ThreadPool<SyntheticPosition> = pool(1);
    pool.set_threads(3).unwrap();
    assert_eq!(pool.threads(), 3);
    let result = pool.search(&pos, Limits::fixed_depth(4));
    assert_legal(&pos, &result);

    pool.set_threads(1).unwrap();
    assert_eq!(pool.threads(), 1);
    assert_legal(&pos, &pool.search(&pos, Limits::fixed_depth(4)));
}

#[test]
fn out_of_range_options_are_rejected() {
    let mut pool: ThreadPool<SyntheticPosition> = pool(1);
    assert!(matches!(pool.set_threads(0), Err(EngineError::InvalidOption { name: "threads", .. })));
    assert!(matches!(pool.resize_hash(0), Err(EngineError::InvalidOption { name: "hash_mb", .. })));
    assert!(matches!(pool.set_multi_pv(0), Err(EngineError::InvalidOption { name: "multi_pv", .. })));
    assert_eq!(pool.threads(), 1);
}

#[test]
fn resize_hash_keeps_pool_usable() {
    let pos = playable_root(6);
    let mut pool = pool(2);
    pool.search(&pos, Limits::fixed_depth(4));
    pool.resize_hash(2).unwrap();
    assert_eq!(pool.config().hash_mb, 2);
    assert_eq!(pool.hashfull(), 0);
    assert_legal(&pos, &pool.search(&pos, Limits::fixed_depth(4)));
}

#[test]
fn clear_hash_empties_the_table() {
    let pos = playable_root(7);
    let mut pool = pool(1);
    pool.search(&pos, Limits::fixed_depth(6));
    pool.clear_hash();
    assert_eq!(pool.hashfull(), 0);
}

#[test]
fn waiting_without_a_search_resigns() {
    let pool: ThreadPool<SyntheticPosition> = pool(1);
    let result = pool.wait_for_completion();
    assert_eq!(result.outcome, Outcome::Resign);
    assert_eq!(result.depth, 0);
}
