//! Per-ply scratch state threaded through the recursion.

use sente_core::{Depth, MAX_PLY, Move, SCORE_NONE, Score};

/// Frames before ply 0, so the root can look two plies back.
const OFFSET: usize = 2;

/// Total frames: lookback, every reachable ply, and the lookahead cleared by
/// [`SearchStack::prepare_children`].
const FRAMES: usize = MAX_PLY + 8;

/// Rows of the PV table: one per ply, plus room for the deepest child.
const PV_ROWS: usize = MAX_PLY + 2;

/// Scratch state of one ply.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Move being searched from this node (`NULL` for a null move).
    pub current_move: Move,
    /// Move left out by a singular-extension search.
    pub excluded_move: Move,
    /// Quiet moves that caused a cutoff at this ply.
    pub killers: [Move; 2],
    pub static_eval: Score,
    /// Late-move reduction applied to the move being searched.
    pub reduction: Depth,
    /// Null move and ProbCut are disabled at this node.
    pub skip_null: bool,
}

impl Frame {
    const EMPTY: Frame = Frame {
        current_move: Move::NONE,
        excluded_move: Move::NONE,
        killers: [Move::NONE; 2],
        static_eval: SCORE_NONE,
        reduction: 0,
        skip_null: false,
    };

    /// Remember `mv` as the newest killer.
    pub fn set_killer(&mut self, mv: Move) {
        if self.killers[0] != mv {
            self.killers[1] = self.killers[0];
            self.killers[0] = mv;
        }
    }

    pub fn is_killer(&self, mv: Move) -> bool {
        self.killers[0] == mv || self.killers[1] == mv
    }
}

/// Triangular PV table for collecting principal variation lines.
///
/// Row `ply` holds the PV from `ply` onward.
struct PvTable {
    moves: Box<[[Move; PV_ROWS]; PV_ROWS]>,
    len: [usize; PV_ROWS],
}

impl PvTable {
    fn new() -> Self {
        Self {
            moves: Box::new([[Move::NONE; PV_ROWS]; PV_ROWS]),
            len: [0; PV_ROWS],
        }
    }

    fn clear_ply(&mut self, ply: usize) {
        if ply < PV_ROWS {
            self.len[ply] = 0;
        }
    }

    /// Row `ply` becomes `[mv, row[ply + 1]...]`.
    fn update(&mut self, ply: usize, mv: Move) {
        if ply >= PV_ROWS {
            return;
        }
        self.moves[ply][0] = mv;

        let child_ply = ply + 1;
        if child_ply < PV_ROWS {
            let copy_len = self.len[child_ply].min(PV_ROWS - 1);
            // split_at_mut for a safe simultaneous borrow of two rows
            let (top, bottom) = self.moves.split_at_mut(child_ply);
            top[ply][1..1 + copy_len].copy_from_slice(&bottom[0][..copy_len]);
            self.len[ply] = 1 + copy_len;
        } else {
            self.len[ply] = 1;
        }
    }

    fn line(&self, ply: usize) -> &[Move] {
        if ply < PV_ROWS {
            &self.moves[ply][..self.len[ply]]
        } else {
            &[]
        }
    }
}

/// Fixed array of [`Frame`]s indexed by ply, allocated once per worker.
pub struct SearchStack {
    frames: Box<[Frame]>,
    pv: PvTable,
}

impl SearchStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::EMPTY; FRAMES].into_boxed_slice(),
            pv: PvTable::new(),
        }
    }

    /// Reset every frame before a new root search.
    pub fn reset(&mut self) {
        self.frames.fill(Frame::EMPTY);
        self.pv.len = [0; PV_ROWS];
    }

    #[inline]
    pub fn at(&self, ply: usize) -> &Frame {
        &self.frames[ply + OFFSET]
    }

    #[inline]
    pub fn at_mut(&mut self, ply: usize) -> &mut Frame {
        &mut self.frames[ply + OFFSET]
    }

    /// The frame `back` plies above `ply` (`back` ≤ 2).
    #[inline]
    pub fn before(&self, ply: usize, back: usize) -> &Frame {
        debug_assert!(back <= OFFSET);
        &self.frames[ply + OFFSET - back]
    }

    /// Reset the child frame and the grandchild's killers on entry to a node.
    pub fn prepare_children(&mut self, ply: usize) {
        let child = &mut self.frames[ply + OFFSET + 1];
        child.excluded_move = Move::NONE;
        child.current_move = Move::NONE;
        child.skip_null = false;
        child.reduction = 0;
        self.frames[ply + OFFSET + 2].killers = [Move::NONE; 2];
    }

    #[inline]
    pub fn clear_pv(&mut self, ply: usize) {
        self.pv.clear_ply(ply);
    }

    /// Make `mv` followed by the child's line the PV of `ply`.
    #[inline]
    pub fn update_pv(&mut self, ply: usize, mv: Move) {
        self.pv.update(ply, mv);
    }

    /// Current PV from `ply` onward.
    #[inline]
    pub fn pv(&self, ply: usize) -> &[Move] {
        self.pv.line(ply)
    }
}

impl Default for SearchStack {
    fn default() -> Self {
        Self::new()
    }
}
