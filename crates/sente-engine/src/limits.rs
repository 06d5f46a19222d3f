//! Per-search budget handed to the thread pool when a search starts.

use std::time::Duration;

use sente_core::{Color, Depth, Move};

/// What a single search may spend, and when it must stop.
///
/// Read by every worker; never mutated once the search has started.
#[derive(Debug, Clone, Default)]
pub struct Limits {
    /// Remaining clock time per side, indexed by [`Color::index`].
    pub time: [Duration; Color::COUNT],
    /// Increment per move, indexed by [`Color::index`].
    pub increment: [Duration; Color::COUNT],
    /// Fixed per-move time granted on top of the clock (byoyomi).
    pub byoyomi: Duration,
    pub moves_to_go: Option<u32>,
    pub depth: Option<Depth>,
    /// Total nodes over all threads.
    pub nodes: Option<u64>,
    /// Stop once a mate in at most this many moves is proven.
    pub mate: Option<u32>,
    /// Think for exactly this long.
    pub move_time: Option<Duration>,
    /// Restrict the root to these moves. Empty means every legal move.
    pub search_moves: Vec<Move>,
    pub infinite: bool,
    pub ponder: bool,
}

impl Limits {
    /// Search to a fixed depth.
    pub fn fixed_depth(depth: Depth) -> Limits {
        Limits {
            depth: Some(depth),
            ..Limits::default()
        }
    }

    /// Search for a fixed wall-clock time.
    pub fn fixed_time(move_time: Duration) -> Limits {
        Limits {
            move_time: Some(move_time),
            ..Limits::default()
        }
    }

    /// Search until stopped.
    pub fn infinite() -> Limits {
        Limits {
            infinite: true,
            ..Limits::default()
        }
    }

    /// Play on a clock: `time` remaining for both sides, plus increment and byoyomi.
    pub fn clock(time: Duration, increment: Duration, byoyomi: Duration) -> Limits {
        Limits {
            time: [time; Color::COUNT],
            increment: [increment; Color::COUNT],
            byoyomi,
            ..Limits::default()
        }
    }

    /// Return `true` when the budget comes from the game clock, so the time
    /// manager decides when to stop.
    pub fn use_time_management(&self) -> bool {
        self.depth.is_none()
            && self.nodes.is_none()
            && self.mate.is_none()
            && self.move_time.is_none()
            && !self.infinite
    }

    /// Return `true` when the search ends on a wall-clock deadline.
    pub fn time_limited(&self) -> bool {
        self.use_time_management() || self.move_time.is_some()
    }
}
