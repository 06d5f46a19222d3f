//! End-to-end searches over hand-built trees and the synthetic tree.

mod common;

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use sente_core::{Position, SCORE_INFINITE, mate_in};
use sente_engine::{EngineConfig, Limits, Outcome, ScoreBound, SearchInfo, SearchParams, ThreadPool};

use common::{ScriptedPosition, TreeBuilder, drop_at, playable_root, pool};

/// Root with a quiet move, a move mating in three plies and a mate in one.
fn mate_tree() -> ScriptedPosition {
    let mut tree = TreeBuilder::new();
    let quiet = tree.node(-50);
    let slow = tree.node(-300);
    let slow_reply = tree.node(400);
    let slow_mate = tree.mated();
    let fast_mate = tree.mated();
    tree.edge(TreeBuilder::ROOT, drop_at("5e"), quiet)
        .edge(TreeBuilder::ROOT, drop_at("1a"), slow)
        .edge(slow, drop_at("9i"), slow_reply)
        .edge(slow_reply, drop_at("2b"), slow_mate)
        .edge(TreeBuilder::ROOT, drop_at("3c"), fast_mate);
    let leaf = tree.node(60);
    tree.edge(quiet, drop_at("4d"), leaf);
    tree.build()
}

// ── Mates and terminal roots ──────────────────────────────────────────────────

#[test]
fn finds_mate_in_one() {
    for threads in [1, 3] {
        let mut pool = pool(threads);
        let result = pool.search(&mate_tree(), Limits::fixed_depth(4));
        assert_eq!(result.best_move(), Some(drop_at("3c")), "{threads} threads");
        assert_eq!(result.score, mate_in(1));
        assert_eq!(result.to_string(), "bestmove P*3c");
    }
}

#[test]
fn slower_mate_is_found_without_the_fast_one() {
    let mut tree = TreeBuilder::new();
    let quiet = tree.node(-50);
    let slow = tree.node(-300);
    let slow_reply = tree.node(400);
    let slow_mate = tree.mated();
    tree.edge(TreeBuilder::ROOT, drop_at("5e"), quiet)
        .edge(TreeBuilder::ROOT, drop_at("1a"), slow)
        .edge(slow, drop_at("9i"), slow_reply)
        .edge(slow_reply, drop_at("2b"), slow_mate);
    let leaf = tree.node(60);
    tree.edge(quiet, drop_at("4d"), leaf);

    let mut pool = pool(1);
    let result = pool.search(&tree.build(), Limits::fixed_depth(5));
    assert_eq!(result.best_move(), Some(drop_at("1a")));
    assert_eq!(result.score, mate_in(3));
    assert_eq!(result.ponder, Some(drop_at("9i")));
}

#[test]
fn no_legal_moves_resigns() {
    let mut pool = pool(2);
    let result = pool.search(&TreeBuilder::new().build(), Limits::fixed_depth(3));
    assert_eq!(result.outcome, Outcome::Resign);
    assert_eq!(result.to_string(), "bestmove resign");
}

#[test]
fn declared_win_is_reported_without_searching() {
    let mut tree = TreeBuilder::new();
    let child = tree.node(0);
    tree.edge(TreeBuilder::ROOT, drop_at("5e"), child).declare_win(TreeBuilder::ROOT);

    let mut pool = pool(1);
    let result = pool.search(&tree.build(), Limits::fixed_depth(3));
    assert_eq!(result.outcome, Outcome::Win);
    assert_eq!(result.to_string(), "bestmove win");
}

#[test]
fn search_moves_restrict_the_root() {
    let mut pool = pool(1);
    let limits = Limits {
        search_moves: vec![drop_at("5e")],
        ..Limits::fixed_depth(4)
    };
    let result = pool.search(&mate_tree(), limits);
    assert_eq!(result.best_move(), Some(drop_at("5e")));
}

#[test]
fn mate_limit_stops_once_proven() {
    let mut pool = pool(1);
    let limits = Limits {
        mate: Some(1),
        ..Limits::default()
    };
    let result = pool.search(&mate_tree(), limits);
    assert_eq!(result.score, mate_in(1));
    assert!(result.depth < 10, "kept searching to depth {}", result.depth);
}

// ── Determinism and tables ────────────────────────────────────────────────────

#[test]
fn single_thread_is_deterministic_across_games() {
    let pos = playable_root(17);
    let mut pool = pool(1);
    let first = pool.search(&pos, Limits::fixed_depth(7));
    pool.new_game();
    let second = pool.search(&pos, Limits::fixed_depth(7));
    assert_eq!(first.best_move(), second.best_move());
    assert_eq!(first.score, second.score);
    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.pv, second.pv);
}

#[test]
fn warm_table_saves_nodes() {
    let pos = playable_root(23);
    let mut pool = pool(1);
    let cold = pool.search(&pos, Limits::fixed_depth(7));
    let warm = pool.search(&pos, Limits::fixed_depth(7));
    assert!(warm.nodes <= cold.nodes, "warm {} > cold {}", warm.nodes, cold.nodes);
}

// ── Time ──────────────────────────────────────────────────────────────────────

#[test]
fn move_time_is_respected() {
    let movetime = Duration::from_millis(150);
    let overhead = Duration::from_millis(EngineConfig::default().time.move_overhead_ms);
    // The clock is read every 2048 nodes, then the helpers have to unwind.
    let slack = Duration::from_millis(100);

    for threads in [1, 2] {
        let mut pool = pool(threads);
        for seed in [11, 31, 47] {
            let pos = playable_root(seed);
            let start = Instant::now();
            let result = pool.search(&pos, Limits::fixed_time(movetime));
            let elapsed = start.elapsed();
            assert!(result.best_move().is_some());
            assert!(
                elapsed <= movetime + overhead + slack,
                "{threads} threads, seed {seed}: took {elapsed:?}"
            );
        }
    }
}

/// A quiet root whose moves all check; every check allows three evasions
/// that check back, so neither the main search nor quiescence runs out of
/// moves.
fn endless_checks() -> ScriptedPosition {
    let mut tree = TreeBuilder::new();
    let checked = tree.checked(0);
    for sq in ["1a", "2a", "3a"] {
        tree.edge(TreeBuilder::ROOT, drop_at(sq), checked)
            .edge(checked, drop_at(sq), checked);
    }
    tree.build()
}

#[test]
fn endless_checks_honor_the_move_time() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for threads in [1, 2] {
            let mut pool = pool(threads);
            let start = Instant::now();
            let result = pool.search(&endless_checks(), Limits::fixed_time(Duration::from_millis(100)));
            let _ = tx.send((threads, result, start.elapsed()));
        }
    });

    for _ in 0..2 {
        let (threads, result, elapsed) = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("search over endless checks ignored the clock");
        assert!(result.best_move().is_some());
        assert!(elapsed < Duration::from_millis(500), "{threads} threads took {elapsed:?}");
    }
}

#[test]
fn stop_interrupts_endless_checks() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut pool = pool(2);
        pool.start_search(&endless_checks(), Limits::infinite());
        thread::sleep(Duration::from_millis(50));
        pool.stop();
        let _ = tx.send(pool.wait_for_completion());
    });

    let result = rx.recv_timeout(Duration::from_secs(10)).expect("stop was not honored");
    assert!(result.best_move().is_some());
}

#[test]
fn clock_search_returns_in_time() {
    let pos = playable_root(13);
    let mut pool = pool(1);
    let start = Instant::now();
    let result = pool.search(
        &pos,
        Limits::clock(Duration::from_secs(2), Duration::ZERO, Duration::ZERO),
    );
    assert!(result.best_move().is_some());
    assert!(start.elapsed() < Duration::from_secs(3));
}

// ── Reporting ─────────────────────────────────────────────────────────────────

fn collect_infos<P: Position>(pool: &mut ThreadPool<P>) -> Arc<Mutex<Vec<SearchInfo>>> {
    let infos = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&infos);
    pool.set_info_callback(move |info| sink.lock().unwrap().push(info.clone()));
    infos
}

#[test]
fn one_exact_report_per_completed_depth() {
    let pos = playable_root(19);
    let mut pool = pool(1);
    let infos = collect_infos(&mut pool);
    let result = pool.search(&pos, Limits::fixed_depth(5));

    let infos = infos.lock().unwrap();
    let mut depths: Vec<i32> = infos
        .iter()
        .filter(|i| i.bound == ScoreBound::Exact)
        .map(|i| i.depth)
        .collect();
    depths.dedup();
    assert_eq!(depths, vec![1, 2, 3, 4, 5]);

    let last = infos.last().unwrap();
    assert_eq!(last.depth, 5);
    assert_eq!(last.pv.first().copied(), result.best_move());
    assert!(last.to_string().starts_with("info depth 5 "));
}

#[test]
fn multi_pv_reports_distinct_lines() {
    let pos = playable_root(27);
    let mut pool = pool(1);
    pool.set_multi_pv(3).unwrap();
    let infos = collect_infos(&mut pool);
    pool.search(&pos, Limits::fixed_depth(4));

    let infos = infos.lock().unwrap();
    // The closing report of the last iteration carries every line.
    let last_depth: Vec<&SearchInfo> = infos[infos.len() - 3..].iter().collect();
    assert!(last_depth.iter().all(|i| i.depth == 4));
    let lines: Vec<usize> = last_depth.iter().map(|i| i.multi_pv).collect();
    assert_eq!(lines, vec![1, 2, 3]);

    let firsts: Vec<_> = last_depth.iter().map(|i| i.pv[0]).collect();
    assert!(firsts[0] != firsts[1] && firsts[1] != firsts[2] && firsts[0] != firsts[2]);
    assert!(last_depth.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(last_depth.iter().all(|i| i.score > -SCORE_INFINITE));
}

#[test]
fn resignation_reports_mated_score() {
    let mut pool = pool(1);
    let infos = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&infos);
    pool.set_info_callback(move |info: &SearchInfo| sink.lock().unwrap().push(info.to_string()));
    pool.search(&TreeBuilder::new().build(), Limits::fixed_depth(2));
    let infos = infos.lock().unwrap();
    assert_eq!(infos.len(), 1);
    assert!(infos[0].starts_with("info depth 0 seldepth 0 multipv 1 score mate 0"));
}

#[test]
fn aspiration_window_widens_after_fail_high() {
    // The reply to 5e walks into a position worth 500 that a one-ply search
    // cannot see, so depth 2 fails high out of the window around 0.
    let mut tree = TreeBuilder::new();
    let reply = tree.node(0);
    let gain = tree.node(500);
    tree.edge(TreeBuilder::ROOT, drop_at("5e"), reply)
        .edge(reply, drop_at("4d"), gain);

    let config = EngineConfig {
        hash_mb: 4,
        threads: 1,
        search: SearchParams {
            aspiration_min_depth: 1,
            aspiration_delta: 1,
            aspiration_second_delta: 4,
            info_interval_ms: 0,
            ..SearchParams::default()
        },
        ..EngineConfig::default()
    };
    let mut pool = ThreadPool::new(config).unwrap();
    let infos = collect_infos(&mut pool);
    let result = pool.search(&tree.build(), Limits::fixed_depth(2));

    let infos = infos.lock().unwrap();
    let reports: Vec<(i32, ScoreBound, i32)> = infos.iter().map(|i| (i.depth, i.bound, i.score)).collect();
    assert_eq!(
        reports,
        vec![(1, ScoreBound::Exact, 0), (2, ScoreBound::Lower, 500), (2, ScoreBound::Exact, 500)]
    );
    assert!(infos[1].to_string().contains("lowerbound"));
    assert_eq!(result.score, 500);
    assert_eq!(result.depth, 2);
    assert_eq!(result.pv, vec![drop_at("5e"), drop_at("4d")]);
}
