//! Search algorithms, shared tables, and the thread pool that drives them.

pub mod control;
pub mod history;
pub mod ordering;
pub mod pool;
mod pvs;
mod qsearch;
pub mod root;
pub mod stack;
pub mod tables;
pub mod tt;
mod worker;

pub use pool::ThreadPool;
pub use worker::InfoCallback;

use std::fmt;
use std::time::Duration;

use sente_core::{Depth, Move, PieceKind, Score, mate_distance};

/// How a reported score relates to the true value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Exact,
    /// The search failed high; the true score is at least this.
    Lower,
    /// The search failed low; the true score is at most this.
    Upper,
}

/// Progress report for one PV line, emitted by the main thread.
#[derive(Debug, Clone)]
pub struct SearchInfo {
    pub depth: Depth,
    pub sel_depth: usize,
    /// 1-based index of the line.
    pub multi_pv: usize,
    pub score: Score,
    pub bound: ScoreBound,
    /// Nodes over all threads.
    pub nodes: u64,
    pub nps: u64,
    pub time: Duration,
    /// Per-mille of the transposition table in use.
    pub hashfull: usize,
    pub pv: Vec<Move>,
}

/// Write a score as `cp <centipawns>` or `mate <plies>`.
fn write_score(f: &mut fmt::Formatter<'_>, score: Score) -> fmt::Result {
    match mate_distance(score) {
        Some(plies) => write!(f, "mate {plies}"),
        None => write!(f, "cp {}", score * 100 / PieceKind::Pawn.value()),
    }
}

impl fmt::Display for SearchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "info depth {} seldepth {} multipv {} score ",
            self.depth, self.sel_depth, self.multi_pv
        )?;
        write_score(f, self.score)?;
        match self.bound {
            ScoreBound::Exact => {}
            ScoreBound::Lower => write!(f, " lowerbound")?,
            ScoreBound::Upper => write!(f, " upperbound")?,
        }
        write!(
            f,
            " nodes {} nps {} time {} hashfull {}",
            self.nodes,
            self.nps,
            self.time.as_millis(),
            self.hashfull
        )?;
        if !self.pv.is_empty() {
            write!(f, " pv")?;
            for mv in &self.pv {
                write!(f, " {mv}")?;
            }
        }
        Ok(())
    }
}

/// What the engine decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Move(Move),
    /// No legal move: the side to move is lost.
    Resign,
    /// The side to move declares an entering-king win.
    Win,
}

/// Result of a completed search.
#[derive(Debug, Clone)]
pub struct BestMoveResult {
    pub outcome: Outcome,
    /// Expected reply, for pondering.
    pub ponder: Option<Move>,
    pub score: Score,
    /// Deepest fully completed iteration of the reporting thread.
    pub depth: Depth,
    /// Nodes over all threads.
    pub nodes: u64,
    pub pv: Vec<Move>,
}

impl BestMoveResult {
    /// The chosen move, if the outcome is a move.
    pub fn best_move(&self) -> Option<Move> {
        match self.outcome {
            Outcome::Move(mv) => Some(mv),
            Outcome::Resign | Outcome::Win => None,
        }
    }
}

impl fmt::Display for BestMoveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Move(mv) => {
                write!(f, "bestmove {mv}")?;
                if let Some(ponder) = self.ponder {
                    write!(f, " ponder {ponder}")?;
                }
                Ok(())
            }
            Outcome::Resign => write!(f, "bestmove resign"),
            Outcome::Win => write!(f, "bestmove win"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{Square, mate_in, mated_in};

    fn drop_at(sq: &str) -> Move {
        Move::new_drop(PieceKind::Pawn, Square::from_usi(sq).unwrap())
    }

    fn info(score: Score, bound: ScoreBound) -> SearchInfo {
        SearchInfo {
            depth: 7,
            sel_depth: 12,
            multi_pv: 1,
            score,
            bound,
            nodes: 5000,
            nps: 250_000,
            time: Duration::from_millis(20),
            hashfull: 3,
            pv: vec![drop_at("5e"), drop_at("5d")],
        }
    }

    #[test]
    fn info_line_centipawns() {
        let line = info(180, ScoreBound::Exact).to_string();
        assert_eq!(
            line,
            "info depth 7 seldepth 12 multipv 1 score cp 200 nodes 5000 nps 250000 time 20 hashfull 3 pv P*5e P*5d"
        );
    }

    #[test]
    fn info_line_bounds_and_mates() {
        assert!(info(0, ScoreBound::Lower).to_string().contains("score cp 0 lowerbound nodes"));
        assert!(info(0, ScoreBound::Upper).to_string().contains("upperbound"));
        assert!(info(mate_in(3), ScoreBound::Exact).to_string().contains("score mate 3 "));
        assert!(info(mated_in(2), ScoreBound::Exact).to_string().contains("score mate -2 "));
    }

    #[test]
    fn bestmove_line() {
        let mv = drop_at("5e");
        let result = BestMoveResult {
            outcome: Outcome::Move(mv),
            ponder: Some(drop_at("4d")),
            score: 0,
            depth: 1,
            nodes: 1,
            pv: vec![mv],
        };
        assert_eq!(result.to_string(), "bestmove P*5e ponder P*4d");
        assert_eq!(result.best_move(), Some(mv));

        let resign = BestMoveResult {
            outcome: Outcome::Resign,
            ponder: None,
            ..result.clone()
        };
        assert_eq!(resign.to_string(), "bestmove resign");
        assert_eq!(resign.best_move(), None);

        let win = BestMoveResult {
            outcome: Outcome::Win,
            ..result
        };
        assert_eq!(win.to_string(), "bestmove win");
    }
}
