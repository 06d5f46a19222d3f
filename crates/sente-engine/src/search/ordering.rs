//! Move ordering: TT move, captures by MVV-LVA and SEE, killers, history.

use sente_core::{DEPTH_QS_CHECKS, Depth, MAX_MOVES, Move, MoveList, Position, Score, Square};

use crate::search::history::History;

const TT_MOVE: i32 = 1_000_000;
const GOOD_CAPTURE: i32 = 200_000;
const KILLER_0: i32 = 100_001;
const KILLER_1: i32 = 100_000;
const BAD_CAPTURE: i32 = -200_000;

/// Attacker weights are capped so a king capture still sorts by victim.
const ATTACKER_CAP: Score = 1_500;

/// Most valuable victim, least valuable attacker.
fn mvv_lva<P: Position>(pos: &P, mv: Move) -> i32 {
    let victim = mv.captured().map_or(0, |kind| pos.capture_value(kind));
    let promotion = if mv.is_promotion() {
        pos.promotion_value(mv.piece_kind())
    } else {
        0
    };
    (victim + promotion) * 16 - mv.piece_kind().value().min(ATTACKER_CAP)
}

/// Incremental move picker using selection sort.
///
/// Moves are filtered and scored up front; [`next`](Self::next) yields them
/// in descending score order.
pub struct MovePicker {
    moves: [Move; MAX_MOVES],
    scores: [i32; MAX_MOVES],
    len: usize,
    cursor: usize,
}

impl MovePicker {
    fn from_moves(list: &MoveList, mut score: impl FnMut(Move) -> i32) -> Self {
        let mut picker = Self {
            moves: [Move::NONE; MAX_MOVES],
            scores: [0; MAX_MOVES],
            len: list.len(),
            cursor: 0,
        };
        for (i, &mv) in list.iter().enumerate() {
            picker.moves[i] = mv;
            picker.scores[i] = score(mv);
        }
        picker
    }

    /// Every legal move, for the main search.
    ///
    /// Order: TT move, captures and pawn promotions that do not lose
    /// material, killers, remaining quiets by history, losing captures.
    pub fn main<P: Position>(pos: &P, tt_move: Move, killers: [Move; 2], history: &History) -> Self {
        let mut moves = MoveList::new();
        pos.legal_moves(&mut moves);
        Self::from_moves(&moves, |mv| {
            if mv == tt_move {
                TT_MOVE
            } else if mv.is_capture_or_pawn_promotion() {
                let see = pos.see(mv);
                if see >= 0 {
                    GOOD_CAPTURE + mvv_lva(pos, mv)
                } else {
                    BAD_CAPTURE + see
                }
            } else if mv == killers[0] {
                KILLER_0
            } else if mv == killers[1] {
                KILLER_1
            } else {
                history.get(mv)
            }
        })
    }

    /// Moves for quiescence search at `depth` (≤ 0).
    ///
    /// In check every evasion is generated. Otherwise captures and pawn
    /// promotions, plus quiet checks at the first quiescence ply. From
    /// `recapture_depth` down, only captures on `recapture_square`.
    pub fn qsearch<P: Position>(
        pos: &P,
        tt_move: Move,
        depth: Depth,
        recapture_depth: Depth,
        recapture_square: Option<Square>,
        history: &History,
    ) -> Self {
        let mut legal = MoveList::new();
        pos.legal_moves(&mut legal);

        let in_check = pos.in_check();
        let recaptures_only = !in_check && depth <= recapture_depth;
        let mut moves = MoveList::new();
        for &mv in legal.iter() {
            let keep = if in_check {
                true
            } else if recaptures_only {
                mv.is_capture() && Some(mv.to()) == recapture_square
            } else if mv.is_capture_or_pawn_promotion() {
                true
            } else {
                depth >= DEPTH_QS_CHECKS && pos.gives_check(mv)
            };
            if keep {
                moves.push(mv);
            }
        }

        Self::from_moves(&moves, |mv| {
            if mv == tt_move && !recaptures_only {
                TT_MOVE
            } else if mv.is_capture_or_pawn_promotion() {
                GOOD_CAPTURE + mvv_lva(pos, mv)
            } else {
                history.get(mv)
            }
        })
    }

    /// Captures whose exchange nets more than `threshold`, for ProbCut.
    pub fn probcut<P: Position>(pos: &P, tt_move: Move, threshold: Score) -> Self {
        let mut legal = MoveList::new();
        pos.legal_moves(&mut legal);

        let mut moves = MoveList::new();
        for &mv in legal.iter() {
            if mv.is_capture() && pos.see(mv) > threshold {
                moves.push(mv);
            }
        }

        Self::from_moves(&moves, |mv| {
            if mv == tt_move {
                TT_MOVE
            } else {
                GOOD_CAPTURE + mvv_lva(pos, mv)
            }
        })
    }

    /// Number of moves the picker will yield in total.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Yield the next highest-scored move via selection sort.
    ///
    /// Ties keep generation order.
    pub fn next(&mut self) -> Option<Move> {
        if self.cursor >= self.len {
            return None;
        }

        // Find the index of the maximum score in cursor..len
        let mut best_idx = self.cursor;
        for i in (self.cursor + 1)..self.len {
            if self.scores[i] > self.scores[best_idx] {
                best_idx = i;
            }
        }

        // Rotate rather than swap so equal scores stay in generation order
        self.moves[self.cursor..=best_idx].rotate_right(1);
        self.scores[self.cursor..=best_idx].rotate_right(1);

        let mv = self.moves[self.cursor];
        self.cursor += 1;
        Some(mv)
    }
}
