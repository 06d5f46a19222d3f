//! Score and depth conventions.
//!
//! Scores are side-to-move relative and centered on zero (draw). A mate
//! `n` plies from the root scores `SCORE_MATE - n`, so a shorter mate always
//! compares as stronger than a longer one.

/// Search score.
pub type Score = i32;

/// Remaining search depth in plies.
pub type Depth = i32;

/// Maximum search ply (array sizing and recursion limit).
pub const MAX_PLY: usize = 128;

pub const SCORE_ZERO: Score = 0;
pub const SCORE_DRAW: Score = 0;

/// Scores at or above this are treated as decided by the aspiration driver.
pub const SCORE_KNOWN_WIN: Score = 10_000;

/// Largest value the static evaluation may return.
pub const SCORE_MAX_EVAL: Score = 30_000;

pub const SCORE_MATE: Score = 32_600;
pub const SCORE_MATE_IN_MAX_PLY: Score = SCORE_MATE - MAX_PLY as Score;
pub const SCORE_MATED_IN_MAX_PLY: Score = -SCORE_MATE_IN_MAX_PLY;

/// Repetition that favours the side to move; sits just inside the mate range.
pub const SCORE_SUPERIOR: Score = SCORE_MATE_IN_MAX_PLY - 1;
pub const SCORE_INFERIOR: Score = -SCORE_SUPERIOR;

pub const SCORE_INFINITE: Score = 32_601;

/// "No score" sentinel (unevaluated node, score-less TT entry).
pub const SCORE_NONE: Score = 32_602;

/// Depth tag of the first quiescence ply (checks are generated).
pub const DEPTH_QS_CHECKS: Depth = 0;
/// Depth tag of deeper quiescence plies (captures only).
pub const DEPTH_QS_NO_CHECKS: Depth = -1;
/// Depth tag of entries that carry no search result.
pub const DEPTH_NONE: Depth = -6;

/// Score for giving mate `ply` plies from the root.
#[inline]
pub const fn mate_in(ply: usize) -> Score {
    SCORE_MATE - ply as Score
}

/// Score for being mated `ply` plies from the root.
#[inline]
pub const fn mated_in(ply: usize) -> Score {
    -SCORE_MATE + ply as Score
}

/// Return `true` if `score` encodes a forced mate for either side.
#[inline]
pub const fn is_mate_score(score: Score) -> bool {
    score.abs() >= SCORE_MATE_IN_MAX_PLY && score.abs() <= SCORE_MATE
}

/// Plies to mate encoded in a mate score (positive when the side to move mates).
#[inline]
pub const fn mate_distance(score: Score) -> Option<i32> {
    if !is_mate_score(score) {
        None
    } else if score > 0 {
        Some(SCORE_MATE - score)
    } else {
        Some(-(SCORE_MATE + score))
    }
}
