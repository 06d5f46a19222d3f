//! Quiescence search.

use sente_core::{
    DEPTH_NONE, DEPTH_QS_CHECKS, DEPTH_QS_NO_CHECKS, Depth, MAX_PLY, Move, PieceKind, Position, SCORE_DRAW,
    SCORE_INFINITE, SCORE_KNOWN_WIN, SCORE_MATED_IN_MAX_PLY, SCORE_NONE, Score, mate_in, mated_in,
};

use crate::search::ordering::MovePicker;
use crate::search::tt::Bound;
use crate::search::worker::{NodeType, Worker, checked_eval};

impl<P: Position> Worker<'_, P> {
    /// Resolve captures (and evasions, and checks at the first ply) until the
    /// position is quiet. `depth` is zero at the horizon and decreases.
    pub(super) fn qsearch(&mut self, node: NodeType, ply: usize, mut alpha: Score, beta: Score, depth: Depth) -> Score {
        debug_assert!(node != NodeType::Root);
        debug_assert!(alpha < beta && depth <= 0);

        if self.stopped() || ply > MAX_PLY {
            return SCORE_DRAW;
        }
        if let Some(score) = self.repetition_score(ply) {
            return score;
        }

        let shared = self.shared;
        let params = shared.params;
        let pv_node = node.is_pv();
        let in_check = self.pos.in_check();
        let old_alpha = alpha;

        if pv_node {
            self.stack.clear_pv(ply);
            if self.sel_depth < ply + 1 {
                self.sel_depth = ply + 1;
            }
        }
        self.stack.at_mut(ply).current_move = Move::NONE;

        // Entries deep enough to have generated checks serve every quiescence ply.
        let tt_depth = if in_check || depth >= DEPTH_QS_CHECKS {
            DEPTH_QS_CHECKS
        } else {
            DEPTH_QS_NO_CHECKS
        };

        let key = self.pos.key();
        let tte = shared.tt.probe(key, ply);
        let tt_move = tte.map_or(Move::NONE, |e| e.mv);
        let tt_score = tte.map_or(SCORE_NONE, |e| e.score);

        let cutoff = tte.is_some_and(|entry| {
            let bound_ok = match (pv_node, tt_score >= beta) {
                (true, _) => entry.bound == Bound::Exact,
                (false, true) => entry.bound.includes(Bound::Lower),
                (false, false) => entry.bound.includes(Bound::Upper),
            };
            entry.depth >= tt_depth && tt_score != SCORE_NONE && bound_ok
        });
        if cutoff {
            self.stack.at_mut(ply).current_move = tt_move;
            return tt_score;
        }
        self.count_node();

        // Past the recapture horizon a check is not resolved: chains of
        // checks and evasions would not terminate.
        if in_check && depth <= params.qsearch_recapture_depth {
            return checked_eval(self.pos.evaluate());
        }

        // Stand pat
        let static_eval;
        let mut best_score;
        let futility_base;
        if in_check {
            static_eval = SCORE_NONE;
            best_score = -SCORE_INFINITE;
            futility_base = -SCORE_INFINITE;
        } else {
            if self.pos.mate_in_one().is_some() {
                return mate_in(ply + 1);
            }

            static_eval = match tte {
                Some(entry) if entry.eval != SCORE_NONE => entry.eval,
                _ => checked_eval(self.pos.evaluate()),
            };
            best_score = static_eval;

            if best_score >= beta {
                if tte.is_none() {
                    shared.tt.store(key, best_score, Bound::Lower, DEPTH_NONE, Move::NONE, static_eval, ply);
                }
                return best_score;
            }
            if pv_node && best_score > alpha {
                alpha = best_score;
            }
            futility_base = best_score + params.qsearch_futility_margin;
        }
        self.stack.at_mut(ply).static_eval = static_eval;

        let prev_move = self.stack.before(ply, 1).current_move;
        let recapture_square = prev_move.is_some().then(|| prev_move.to());
        let mut picker = MovePicker::qsearch(
            &self.pos,
            tt_move,
            depth,
            params.qsearch_recapture_depth,
            recapture_square,
            &shared.history,
        );
        let mut best_move = Move::NONE;

        while let Some(mv) = picker.next() {
            let gives_check = self.pos.gives_check(mv);

            // Futility pruning
            if !pv_node && !in_check && !gives_check && mv != tt_move && futility_base > -SCORE_KNOWN_WIN {
                let mut futility_value = futility_base + mv.captured().map_or(0, |kind| self.pos.capture_value(kind));
                if mv.is_promotion() {
                    futility_value += self.pos.promotion_value(mv.piece_kind());
                }
                if futility_value < beta {
                    best_score = best_score.max(futility_value);
                    continue;
                }

                // Exchanges that cannot lift the stand pat margin to beta
                if futility_base < beta && depth < DEPTH_QS_CHECKS && !self.pos.see_ge(mv, beta - futility_base + 1) {
                    best_score = best_score.max(futility_base);
                    continue;
                }
            }

            // Quiet evasions once a mate is ruled out
            let evasion_prunable =
                in_check && best_score > SCORE_MATED_IN_MAX_PLY && !mv.is_capture_or_pawn_promotion();

            // Losing exchanges
            if !pv_node
                && (!in_check || evasion_prunable)
                && mv != tt_move
                && !(mv.is_promotion() && mv.piece_kind() == PieceKind::Pawn)
                && self.pos.see(mv) < 0
            {
                continue;
            }

            self.stack.at_mut(ply).current_move = mv;
            let undo = self.pos.make_move(mv);
            let score = -self.qsearch(node, ply + 1, -beta, -alpha, depth - 1);
            self.pos.unmake_move(mv, undo);

            if self.stopped() {
                return SCORE_DRAW;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    if pv_node && score < beta {
                        alpha = score;
                        best_move = mv;
                        self.stack.update_pv(ply, mv);
                    } else {
                        shared.tt.store(key, score, Bound::Lower, tt_depth, mv, static_eval, ply);
                        return score;
                    }
                }
            }
        }

        if in_check && best_score == -SCORE_INFINITE {
            return mated_in(ply);
        }

        let bound = if pv_node && best_score > old_alpha { Bound::Exact } else { Bound::Upper };
        shared.tt.store(key, best_score, bound, tt_depth, best_move, static_eval, ply);
        best_score
    }
}
