//! Core shogi types shared by the search: moves, scores, and the position contract.

mod color;
mod move_list;
mod moves;
mod piece_kind;
mod position;
mod score;
mod scripted;
mod square;
mod synthetic;

pub use color::Color;
pub use move_list::{MAX_MOVES, MoveList};
pub use moves::Move;
pub use piece_kind::PieceKind;
pub use position::{EXCLUSION_SALT, Position, Repetition};
pub use score::{
    DEPTH_NONE, DEPTH_QS_CHECKS, DEPTH_QS_NO_CHECKS, Depth, MAX_PLY, SCORE_DRAW, SCORE_INFERIOR,
    SCORE_INFINITE, SCORE_KNOWN_WIN, SCORE_MATE, SCORE_MATE_IN_MAX_PLY, SCORE_MATED_IN_MAX_PLY,
    SCORE_MAX_EVAL, SCORE_NONE, SCORE_SUPERIOR, SCORE_ZERO, Score, is_mate_score, mate_distance,
    mate_in, mated_in,
};
pub use scripted::{ScriptedPosition, TreeBuilder};
pub use square::Square;
pub use synthetic::{SyntheticPosition, SyntheticUndo};
