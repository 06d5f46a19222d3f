//! Root move bookkeeping and PV exchange with the transposition table.

use sente_core::{DEPTH_NONE, MAX_PLY, Move, MoveList, Position, Repetition, SCORE_INFINITE, SCORE_NONE, Score};

use crate::search::tt::{Bound, TranspositionTable};

/// One legal move at the root with its latest score and line.
#[derive(Debug, Clone)]
pub struct RootMove {
    pub score: Score,
    /// Score from the previous iteration, centre of the aspiration window.
    pub prev_score: Score,
    /// `pv[0]` is the root move itself.
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(mv: Move) -> Self {
        Self {
            score: -SCORE_INFINITE,
            prev_score: -SCORE_INFINITE,
            pv: vec![mv],
        }
    }

    #[inline]
    pub fn mv(&self) -> Move {
        self.pv[0]
    }

    /// Write the PV back into `tt` so the next iteration searches it first.
    ///
    /// Entries already holding the PV move are left alone.
    pub fn insert_pv_in_tt<P: Position>(&self, pos: &mut P, tt: &TranspositionTable) {
        let mut undos = Vec::with_capacity(self.pv.len());
        for (ply, &mv) in self.pv.iter().enumerate() {
            if tt.probe(pos.key(), ply).is_none_or(|entry| entry.mv != mv) {
                tt.store(pos.key(), SCORE_NONE, Bound::None, DEPTH_NONE, mv, SCORE_NONE, ply);
            }
            undos.push(pos.make_move(mv));
        }
        for (&mv, undo) in self.pv.iter().zip(undos).rev() {
            pos.unmake_move(mv, undo);
        }
    }

    /// Extend a PV cut short by a TT cutoff by following TT moves.
    ///
    /// Stops at an illegal or missing move, a repetition, or `MAX_PLY`.
    pub fn extract_pv_from_tt<P: Position>(&mut self, pos: &mut P, tt: &TranspositionTable) {
        let root = self.mv();
        self.pv.truncate(1);

        let mut undos = vec![pos.make_move(root)];
        let mut legal = MoveList::new();
        while self.pv.len() < MAX_PLY {
            let Some(entry) = tt.probe(pos.key(), self.pv.len()) else {
                break;
            };
            legal.clear();
            pos.legal_moves(&mut legal);
            if entry.mv.is_none() || !legal.contains(entry.mv) {
                break;
            }
            if self.pv.len() >= 2 && pos.repetition(self.pv.len()) != Repetition::None {
                break;
            }
            undos.push(pos.make_move(entry.mv));
            self.pv.push(entry.mv);
        }

        for (&mv, undo) in self.pv.iter().zip(undos).rev() {
            pos.unmake_move(mv, undo);
        }
    }
}

/// Stable sort by descending score. Equal scores keep their order, so the
/// previous best stays ahead of moves that merely tie it.
pub fn sort_root_moves(moves: &mut [RootMove]) {
    moves.sort_by(|a, b| b.score.cmp(&a.score));
}
