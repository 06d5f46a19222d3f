//! The board-state contract consumed by the search.
//!
//! Move generation, make/unmake, hashing and evaluation live behind this
//! trait; the search never looks inside a position. Every `make_*` call is
//! paired with the matching `unmake_*` before control returns up the
//! recursion, so a position handed to the search comes back unchanged.

use crate::color::Color;
use crate::move_list::MoveList;
use crate::moves::Move;
use crate::piece_kind::PieceKind;
use crate::score::Score;

/// Salt XORed into the key of a node searched with an excluded move.
pub const EXCLUSION_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Outcome of a repetition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repetition {
    /// No repetition within the inspected window.
    None,
    /// Ordinary repetition: a draw.
    Draw,
    /// Repetition by perpetual check from the opponent: the side to move wins.
    Win,
    /// Repetition by our perpetual check: the side to move loses.
    Lose,
    /// Same board with more material in hand for the side to move.
    Superior,
    /// Same board with less material in hand for the side to move.
    Inferior,
}

/// A mutable board state the search can walk.
pub trait Position: Clone + Send + 'static {
    /// State saved by `make_move`/`make_null_move` and consumed by the matching unmake.
    type Undo;

    fn side_to_move(&self) -> Color;

    /// 64-bit fingerprint of the position.
    fn key(&self) -> u64;

    /// Plies played since the start of the game.
    fn game_ply(&self) -> u32;

    /// Append every legal move to `moves`.
    fn legal_moves(&self, moves: &mut MoveList);

    fn make_move(&mut self, mv: Move) -> Self::Undo;

    fn unmake_move(&mut self, mv: Move, undo: Self::Undo);

    /// Pass the turn. Never called while in check.
    fn make_null_move(&mut self) -> Self::Undo;

    fn unmake_null_move(&mut self, undo: Self::Undo);

    fn in_check(&self) -> bool;

    /// Return `true` if the legal move `mv` checks the opponent.
    fn gives_check(&self, mv: Move) -> bool;

    /// Static evaluation from the side to move's point of view.
    ///
    /// Takes `&mut self` so implementations can keep incremental state; the
    /// search calls it at every main-search node, even in check.
    fn evaluate(&mut self) -> Score;

    /// Inspect up to `max_back` plies of history for a repetition.
    fn repetition(&self, max_back: usize) -> Repetition;

    /// Static exchange evaluation of `mv` (material balance of the exchange on `mv.to()`).
    fn see(&self, mv: Move) -> Score;

    /// Key used by the singular-extension search, distinct from [`key`](Self::key).
    fn exclusion_key(&self) -> u64 {
        self.key() ^ EXCLUSION_SALT
    }

    /// Return `true` if the side to move can declare a win by entering king.
    fn declared_win(&self) -> bool {
        false
    }

    /// Return `true` if the exchange started by `mv` nets at least `threshold`.
    fn see_ge(&self, mv: Move, threshold: Score) -> bool {
        self.see(mv) >= threshold
    }

    /// Material swing for capturing a piece of `kind`.
    fn capture_value(&self, kind: PieceKind) -> Score {
        kind.capture_value()
    }

    /// Material swing for promoting a piece of `kind`.
    fn promotion_value(&self, kind: PieceKind) -> Score {
        kind.promotion_value()
    }

    /// Find a move that mates immediately.
    ///
    /// The default tries every checking move and looks for a reply; engines
    /// with a dedicated detector should override it.
    fn mate_in_one(&mut self) -> Option<Move> {
        let mut moves = MoveList::new();
        self.legal_moves(&mut moves);
        let mut replies = MoveList::new();
        for &mv in moves.iter() {
            if !self.gives_check(mv) {
                continue;
            }
            let undo = self.make_move(mv);
            replies.clear();
            self.legal_moves(&mut replies);
            let mated = replies.is_empty();
            self.unmake_move(mv, undo);
            if mated {
                return Some(mv);
            }
        }
        None
    }

    /// Return `true` if `mv` is likely to parry `threat`, the opponent's
    /// best reply to a null move.
    fn refutes(&self, mv: Move, threat: Move) -> bool {
        mv.from() == Some(threat.to()) || threat.from() == Some(mv.to())
    }

    /// Return `true` if playing `first` made `threat` possible.
    fn allows(&self, first: Move, threat: Move) -> bool {
        threat.from() == Some(first.to()) || first.from() == Some(threat.to())
    }
}
