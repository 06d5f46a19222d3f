//! Time management: turn the game clock into soft and hard think-time limits.
//!
//! The soft limit ("optimum") decides whether another iteration is worth
//! starting; the hard limit ("maximum") is the ceiling enforced from inside the
//! search. Both come from a move-importance curve summed over a range of
//! hypothetical move horizons, keeping the most conservative answer.

use std::time::Duration;

use sente_core::Color;

use crate::config::check_range;
use crate::error::EngineError;
use crate::limits::Limits;

/// Longest horizon of future moves the budget is spread over.
const MOVE_HORIZON: u32 = 47;
/// Hard limit may use this many times the importance share of the current move.
const MAX_RATIO: f64 = 3.0;
/// Hard limit may steal this fraction of the budget of later moves.
const STEAL_RATIO: f64 = 0.33;
/// Fraction of the normal budget spent at the very start of a game.
const OPENING_COMPRESSION: f64 = 1.0 / 3.0;

/// Clock-handling options.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct TimeOptions {
    /// Subtracted from every limit to cover I/O and scheduling latency.
    pub move_overhead_ms: u64,
    /// Reserve kept back from the clock regardless of horizon.
    pub emergency_base_ms: u64,
    /// Extra reserve per move inside the emergency horizon.
    pub emergency_move_ms: u64,
    pub emergency_move_horizon: u32,
    pub minimum_thinking_ms: u64,
    /// Percentage weight of the current move; above 100 thinks longer.
    pub slow_mover: u32,
    /// Pondering is enabled, so the opponent's time is partly ours.
    pub ponder: bool,
    /// Ply at which the importance curve falls to half of its peak.
    pub importance_shift: f64,
    pub importance_scale: f64,
    pub importance_skew: f64,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            move_overhead_ms: 50,
            emergency_base_ms: 60,
            emergency_move_ms: 30,
            emergency_move_horizon: 40,
            minimum_thinking_ms: 20,
            slow_mover: 100,
            ponder: false,
            importance_shift: 330.0,
            importance_scale: 48.0,
            importance_skew: 1.0,
        }
    }
}

impl TimeOptions {
    /// Reject options the importance curve cannot be evaluated with.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_range("time.slow_mover", self.slow_mover, 1, 1000)?;
        check_range("time.emergency_move_horizon", self.emergency_move_horizon, 0, 1000)?;
        check_range("time.importance_scale", self.importance_scale, 0.01, 1.0e6)?;
        check_range("time.importance_shift", self.importance_shift, -1.0e6, 1.0e6)?;
        check_range("time.importance_skew", self.importance_skew, 0.01, 100.0)?;
        Ok(())
    }

    /// Weight of the move at `ply`; non-increasing in `ply`.
    pub fn move_importance(&self, ply: u32) -> f64 {
        let x = (f64::from(ply) - self.importance_shift) / self.importance_scale;
        (1.0 + x.exp()).powf(-self.importance_skew).max(f64::MIN_POSITIVE)
    }
}

#[derive(Clone, Copy)]
enum Budget {
    Optimum,
    Maximum,
}

/// Share of `time_ms` the current move may use when `moves_to_go` moves
/// must be played from it.
fn remaining(options: &TimeOptions, time_ms: i64, moves_to_go: u32, ply: u32, budget: Budget) -> i64 {
    let (max_ratio, steal_ratio) = match budget {
        Budget::Optimum => (1.0, 0.0),
        Budget::Maximum => (MAX_RATIO, STEAL_RATIO),
    };

    let this_move = options.move_importance(ply) * f64::from(options.slow_mover) / 100.0;
    let other_moves: f64 = (1..moves_to_go)
        .map(|i| options.move_importance(ply + 2 * i))
        .sum();

    let ratio1 = (max_ratio * this_move) / (max_ratio * this_move + other_moves);
    let ratio2 = (this_move + steal_ratio * other_moves) / (this_move + other_moves);

    (time_ms as f64 * ratio1.min(ratio2)) as i64
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Opening compression factor: 1/3 at the start of a game, rising to 1 around ply 40.
fn opening_factor(ply: u32) -> f64 {
    sigmoid((f64::from(ply) - 32.0) * 0.5) * (1.0 - OPENING_COMPRESSION) + OPENING_COMPRESSION
}

fn as_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn from_ms(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// Soft and hard limits for one search, plus the PV-instability allowance.
#[derive(Debug, Clone, Copy)]
pub struct TimeManager {
    soft: Duration,
    hard: Duration,
    unstable_extra: Duration,
}

impl TimeManager {
    /// Compute the limits for the side `us` to move at game ply `ply`.
    pub fn new(limits: &Limits, us: Color, ply: u32, options: &TimeOptions) -> TimeManager {
        let overhead = options.move_overhead_ms as i64;

        if let Some(move_time) = limits.move_time {
            let t = from_ms((as_ms(move_time) - overhead).max(1));
            return TimeManager {
                soft: t,
                hard: t,
                unstable_extra: Duration::ZERO,
            };
        }

        let time = as_ms(limits.time[us.index()]);
        let inc = as_ms(limits.increment[us.index()]);
        let byoyomi = as_ms(limits.byoyomi);
        let min_thinking = options.minimum_thinking_ms as i64;
        let ceiling = time + byoyomi;

        let mut soft = ceiling;
        let mut hard = ceiling;

        let horizon = limits
            .moves_to_go
            .map_or(MOVE_HORIZON, |mtg| mtg.clamp(1, MOVE_HORIZON));
        for hyp in 1..=horizon {
            let reserve = options.emergency_base_ms as i64
                + options.emergency_move_ms as i64 * i64::from(hyp.min(options.emergency_move_horizon));
            let hyp_time = (time + inc * i64::from(hyp - 1) + byoyomi - reserve).max(0);

            let t_opt = min_thinking + remaining(options, hyp_time, hyp, ply, Budget::Optimum);
            let t_max = min_thinking + remaining(options, hyp_time, hyp, ply, Budget::Maximum);
            soft = soft.min(t_opt);
            hard = hard.min(t_max);
        }

        if options.ponder {
            soft += soft / 4;
        }

        // Never think for less than the byoyomi we are granted anyway.
        soft = soft.max(byoyomi);
        hard = hard.max(byoyomi);

        let factor = opening_factor(ply);
        soft = (soft as f64 * factor) as i64;
        hard = (hard as f64 * factor) as i64;

        // Once the clock is spent, the byoyomi is the whole budget.
        if soft >= time {
            soft = ceiling;
        }
        if hard >= time {
            hard = ceiling;
        }
        soft = soft.min(ceiling);
        hard = hard.min(ceiling);

        soft = soft.min(hard);
        soft = soft.max(min_thinking);
        hard = hard.max(min_thinking);

        TimeManager {
            soft: from_ms((soft - overhead).max(1)),
            hard: from_ms((hard - overhead).max(1)),
            unstable_extra: Duration::ZERO,
        }
    }

    /// Time after which starting another iteration is not worthwhile.
    pub fn soft_limit(&self) -> Duration {
        self.soft
    }

    /// Time after which the search is stopped unconditionally.
    pub fn hard_limit(&self) -> Duration {
        self.hard
    }

    /// Soft limit plus the allowance earned by best-move changes.
    pub fn available(&self) -> Duration {
        self.soft + self.unstable_extra
    }

    /// Extend the soft limit by half of it per best-move change in the last
    /// iteration and a third per change in the one before, never beyond the
    /// hard limit.
    pub fn set_pv_instability(&mut self, current_changes: u32, previous_changes: u32) {
        let extra = self.soft / 2 * current_changes + self.soft / 3 * previous_changes;
        self.unstable_extra = extra.min(self.hard.saturating_sub(self.soft));
    }
}
