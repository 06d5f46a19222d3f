//! Shared fixtures: a hand-built game tree and seed helpers for the
//! synthetic tree.

#![allow(dead_code)]

use sente_core::{Move, MoveList, PieceKind, Position, Square, SyntheticPosition};
use sente_engine::{EngineConfig, ThreadPool};

pub use sente_core::{ScriptedPosition, TreeBuilder};

/// A pawn drop on `sq`, the cheapest way to name distinct quiet moves.
pub fn drop_at(sq: &str) -> Move {
    Move::new_drop(PieceKind::Pawn, Square::from_usi(sq).unwrap())
}

/// A synthetic root with legal moves, not in check.
pub fn playable_root(from_seed: u64) -> SyntheticPosition {
    (from_seed..)
        .map(SyntheticPosition::new)
        .find(|pos| {
            let mut moves = MoveList::new();
            pos.legal_moves(&mut moves);
            !pos.in_check() && moves.len() >= 4
        })
        .unwrap()
}

/// A pool over `threads` threads with a small table.
pub fn pool<P: Position>(threads: usize) -> ThreadPool<P> {
    let config = EngineConfig {
        hash_mb: 4,
        threads,
        ..EngineConfig::default()
    };
    ThreadPool::new(config).unwrap()
}
