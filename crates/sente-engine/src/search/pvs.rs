//! Principal variation search.

use sente_core::{
    DEPTH_NONE, Depth, MAX_PLY, Move, Position, SCORE_DRAW, SCORE_INFINITE, SCORE_KNOWN_WIN, SCORE_MATE_IN_MAX_PLY,
    SCORE_MATED_IN_MAX_PLY, SCORE_NONE, Score, mate_in, mated_in,
};

use crate::search::ordering::MovePicker;
use crate::search::tt::Bound;
use crate::search::worker::{NodeType, Worker, checked_eval};

/// Quiet moves remembered per node for the history penalty.
const MAX_QUIETS: usize = 64;

impl<P: Position> Worker<'_, P> {
    /// Search the node at `ply` to `depth` plies inside `(alpha, beta)`.
    ///
    /// `cut_node` marks expected fail-high nodes, which are reduced more.
    pub(super) fn search(
        &mut self,
        node: NodeType,
        ply: usize,
        mut alpha: Score,
        mut beta: Score,
        depth: Depth,
        cut_node: bool,
    ) -> Score {
        debug_assert!(-SCORE_INFINITE <= alpha && alpha < beta && beta <= SCORE_INFINITE);
        debug_assert!(depth > 0);

        let shared = self.shared;
        let params = shared.params;
        let pv_node = node.is_pv();
        let root = node == NodeType::Root;

        self.stack.clear_pv(ply);
        if pv_node && self.sel_depth < ply + 1 {
            self.sel_depth = ply + 1;
        }

        // The root position is never scored as a repetition, even when
        // searched as an ordinary node.
        if ply > 0 {
            // Step 1. Aborted search, maximum ply, repetition
            if let Some(score) = self.repetition_score(ply) {
                return score;
            }
            if self.stopped() || ply > MAX_PLY {
                return SCORE_DRAW;
            }

            // Step 2. Mate distance pruning
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let in_check = self.pos.in_check();
        self.stack.prepare_children(ply);
        self.stack.at_mut(ply).current_move = Move::NONE;
        let excluded = self.stack.at(ply).excluded_move;
        let skip_null = self.stack.at(ply).skip_null;
        let prev_move = self.stack.before(ply, 1).current_move;

        // Step 3. Transposition table lookup
        let key = if excluded.is_some() {
            self.pos.exclusion_key()
        } else {
            self.pos.key()
        };
        self.count_node();
        let mut tte = shared.tt.probe(key, ply);
        let mut tt_move = if root {
            self.root_moves[self.pv_idx].mv()
        } else {
            tte.map_or(Move::NONE, |e| e.mv)
        };
        let tt_score = tte.map_or(SCORE_NONE, |e| e.score);

        if !pv_node
            && let Some(entry) = tte
            && entry.depth >= depth
            && tt_score != SCORE_NONE
            && entry.bound.includes(if tt_score >= beta { Bound::Lower } else { Bound::Upper })
        {
            let frame = self.stack.at_mut(ply);
            frame.current_move = tt_move;
            if tt_score >= beta && tt_move.is_some() && !tt_move.is_capture_or_pawn_promotion() {
                frame.set_killer(tt_move);
            }
            return tt_score;
        }

        // Step 4. Mate in one
        if !root
            && !in_check
            && excluded.is_none()
            && let Some(mate_move) = self.pos.mate_in_one()
        {
            let score = mate_in(ply + 1);
            self.stack.at_mut(ply).static_eval = score;
            shared.tt.store(key, score, Bound::Exact, depth, mate_move, score, ply);
            return score;
        }

        // Step 5. Static evaluation
        let raw_eval = checked_eval(self.pos.evaluate());
        let static_eval = if in_check { SCORE_NONE } else { raw_eval };
        self.stack.at_mut(ply).static_eval = static_eval;
        let mut threat_move = Move::NONE;

        if !in_check {
            let mut eval = static_eval;
            match tte {
                Some(entry) => {
                    if tt_score != SCORE_NONE
                        && entry.bound.includes(if tt_score > eval { Bound::Lower } else { Bound::Upper })
                    {
                        eval = tt_score;
                    }
                }
                None => {
                    shared
                        .tt
                        .store(key, SCORE_NONE, Bound::None, DEPTH_NONE, Move::NONE, static_eval, ply);
                }
            }

            // The eval swing of the previous quiet move feeds the gains table
            let prev_eval = self.stack.before(ply, 1).static_eval;
            if prev_move.is_some() && prev_eval != SCORE_NONE && !prev_move.is_capture_or_pawn_promotion() {
                shared.gains.update(prev_move, -prev_eval - static_eval);
            }

            // Step 6. Razoring
            if !pv_node
                && depth < params.razor_depth
                && eval + params.razor_margin(depth) < beta
                && tt_move.is_none()
                && beta.abs() < SCORE_MATE_IN_MAX_PLY
            {
                let r_beta = beta - params.razor_margin(depth);
                let score = self.qsearch(NodeType::NonPv, ply, r_beta - 1, r_beta, 0);
                if score < r_beta {
                    return score;
                }
            }

            // Step 7. Static null move pruning
            if !pv_node
                && !skip_null
                && depth < params.static_null_depth
                && eval - shared.tables.futility_margin(depth, 0) >= beta
                && beta.abs() < SCORE_MATE_IN_MAX_PLY
            {
                return eval - shared.tables.futility_margin(depth, 0);
            }

            // Step 8. Null move search with verification
            if !pv_node
                && !skip_null
                && depth >= params.null_min_depth
                && eval >= beta
                && beta.abs() < SCORE_MATE_IN_MAX_PLY
            {
                let mut reduction = params.null_base_reduction + depth / params.null_depth_divisor;
                if eval - params.null_eval_margin > beta {
                    reduction += 1;
                }

                self.stack.at_mut(ply).current_move = Move::NULL;
                self.stack.at_mut(ply + 1).skip_null = true;
                let undo = self.pos.make_null_move();
                let null_score = if depth - reduction < 1 {
                    -self.qsearch(NodeType::NonPv, ply + 1, -beta, -beta + 1, 0)
                } else {
                    -self.search(NodeType::NonPv, ply + 1, -beta, -beta + 1, depth - reduction, !cut_node)
                };
                self.pos.unmake_null_move(undo);
                self.stack.at_mut(ply + 1).skip_null = false;

                if null_score >= beta {
                    // Do not return unproven mates
                    let null_score = if null_score >= SCORE_MATE_IN_MAX_PLY { beta } else { null_score };
                    if depth < params.null_verify_depth {
                        return null_score;
                    }

                    self.stack.at_mut(ply).skip_null = true;
                    let verified = if depth - reduction < 1 {
                        self.qsearch(NodeType::NonPv, ply, alpha, beta, 0)
                    } else {
                        self.search(NodeType::NonPv, ply, alpha, beta, depth - reduction, false)
                    };
                    self.stack.at_mut(ply).skip_null = false;
                    if verified >= beta {
                        return null_score;
                    }
                } else {
                    // The null move failed low: remember the refutation, and
                    // blame a reduced previous move that allowed it.
                    threat_move = self.stack.at(ply + 1).current_move;
                    if depth < params.null_threat_depth
                        && self.stack.before(ply, 1).reduction != 0
                        && threat_move.is_some()
                        && self.pos.allows(prev_move, threat_move)
                    {
                        return beta - 1;
                    }
                }
            }

            // Step 9. ProbCut
            if !pv_node
                && depth >= params.probcut_depth
                && !skip_null
                && beta.abs() < SCORE_INFINITE - params.probcut_margin
            {
                let r_beta = (beta + params.probcut_margin).min(SCORE_INFINITE);
                let r_depth = depth - params.probcut_reduction;
                let threshold = prev_move.captured().map_or(0, |kind| self.pos.capture_value(kind));

                let mut picker = MovePicker::probcut(&self.pos, tt_move, threshold);
                while let Some(mv) = picker.next() {
                    self.stack.at_mut(ply).current_move = mv;
                    let undo = self.pos.make_move(mv);
                    let score = -self.search(NodeType::NonPv, ply + 1, -r_beta, -r_beta + 1, r_depth, !cut_node);
                    self.pos.unmake_move(mv, undo);
                    if score >= r_beta {
                        return score;
                    }
                }
            }
        }

        // Step 10. Internal iterative deepening
        let iid_depth = if pv_node { params.iid_pv_depth } else { params.iid_non_pv_depth };
        if depth >= iid_depth
            && tt_move.is_none()
            && (pv_node || (!in_check && static_eval + params.iid_margin >= beta))
        {
            let d = if pv_node { depth - 2 } else { depth / 2 };
            let iid_node = if pv_node { NodeType::Pv } else { NodeType::NonPv };
            self.stack.at_mut(ply).skip_null = true;
            self.search(iid_node, ply, alpha, beta, d, true);
            self.stack.at_mut(ply).skip_null = false;

            tte = shared.tt.probe(key, ply);
            tt_move = tte.map_or(Move::NONE, |e| e.mv);
        }

        // Step 11. Move loop
        let singular_node = !root
            && depth >= params.singular_depth
            && tt_move.is_some()
            && excluded.is_none()
            && tte.is_some_and(|e| {
                e.bound.includes(Bound::Lower) && e.depth >= depth - params.singular_tt_depth_margin
            });

        let killers = self.stack.at(ply).killers;
        let mut picker = MovePicker::main(&self.pos, tt_move, killers, &shared.history);
        let mut best_score = -SCORE_INFINITE;
        let mut best_move = Move::NONE;
        let mut move_count = 0;
        let mut quiets = [Move::NONE; MAX_QUIETS];
        let mut quiet_count = 0;

        while let Some(mv) = picker.next() {
            if mv == excluded {
                continue;
            }
            if ply == 0 && !self.allowed_at_root(mv, root) {
                continue;
            }
            move_count += 1;
            if root && self.is_main() {
                shared.control.set_first_root_move(move_count == 1);
            }

            let quiet = !mv.is_capture_or_pawn_promotion();
            let gives_check = self.pos.gives_check(mv);

            // Step 12. Extensions
            let mut extension = 0;
            if gives_check && self.pos.see_ge(mv, 0) {
                extension = 1;
            }

            if singular_node && extension == 0 && mv == tt_move && tt_score.abs() < SCORE_KNOWN_WIN {
                let r_beta = tt_score - params.singular_margin_per_ply * depth;
                let frame = self.stack.at_mut(ply);
                frame.excluded_move = mv;
                frame.skip_null = true;
                let score = self.search(NodeType::NonPv, ply, r_beta - 1, r_beta, depth / 2, cut_node);
                let frame = self.stack.at_mut(ply);
                frame.excluded_move = Move::NONE;
                frame.skip_null = false;
                if score < r_beta {
                    extension = 1;
                }
            }

            let new_depth = depth - 1 + extension;

            // Step 13. Pruning at shallow depth
            if !pv_node && quiet && !in_check && !gives_check && best_score > SCORE_MATED_IN_MAX_PLY {
                // Move count based pruning
                if depth < params.move_count_depth
                    && move_count >= shared.tables.futility_move_count(depth)
                    && (threat_move.is_none() || !self.pos.refutes(mv, threat_move))
                {
                    continue;
                }

                let predicted_depth = new_depth - shared.tables.reduction(false, depth, move_count);

                // Futility pruning: parent node
                if predicted_depth < params.futility_depth {
                    let futility_value = static_eval
                        + shared.tables.futility_margin(predicted_depth, move_count)
                        + params.gains_weight * shared.gains.get(mv);
                    if futility_value < beta {
                        best_score = best_score.max(futility_value);
                        continue;
                    }
                }

                // Prune moves with negative SEE at low depths
                if predicted_depth < 4 && self.pos.see(mv) < 0 {
                    continue;
                }
            }

            let is_pv_move = pv_node && move_count == 1;
            self.stack.at_mut(ply).current_move = mv;
            if quiet && quiet_count < MAX_QUIETS {
                quiets[quiet_count] = mv;
                quiet_count += 1;
            }

            // Step 14. Make the move
            let undo = self.pos.make_move(mv);
            let mut score = -SCORE_INFINITE;
            let full_depth_search;

            // Step 15. Reduced depth search (LMR)
            if depth >= params.lmr_min_depth
                && !is_pv_move
                && quiet
                && mv != tt_move
                && !self.stack.at(ply).is_killer(mv)
            {
                let mut reduction = shared.tables.reduction(pv_node, depth, move_count);
                if !pv_node && cut_node {
                    reduction += 1;
                }
                self.stack.at_mut(ply).reduction = reduction;
                let d = (new_depth - reduction).max(1);
                score = -self.search(NodeType::NonPv, ply + 1, -(alpha + 1), -alpha, d, true);
                full_depth_search = score > alpha && reduction != 0;
                self.stack.at_mut(ply).reduction = 0;
            } else {
                full_depth_search = !is_pv_move;
            }

            // Step 16. Full depth search when LMR is skipped or fails high
            if full_depth_search {
                score = if new_depth < 1 {
                    -self.qsearch(NodeType::NonPv, ply + 1, -(alpha + 1), -alpha, 0)
                } else {
                    -self.search(NodeType::NonPv, ply + 1, -(alpha + 1), -alpha, new_depth, !cut_node)
                };
            }

            // Full window search for the PV move and for moves that raised
            // alpha (at the root, also those that failed high).
            if pv_node && (is_pv_move || (score > alpha && (root || score < beta))) {
                score = if new_depth < 1 {
                    -self.qsearch(NodeType::Pv, ply + 1, -beta, -alpha, 0)
                } else {
                    -self.search(NodeType::Pv, ply + 1, -beta, -alpha, new_depth, false)
                };
            }

            // Step 17. Undo move
            self.pos.unmake_move(mv, undo);

            // Step 18. Check for new best move
            if self.stopped() {
                return score;
            }

            if root {
                let child_pv = self.stack.pv(ply + 1);
                let Some(rm) = self.root_moves.iter_mut().find(|rm| rm.mv() == mv) else {
                    continue;
                };
                if is_pv_move || score > alpha {
                    rm.score = score;
                    rm.pv.truncate(1);
                    rm.pv.extend_from_slice(child_pv);
                    if !is_pv_move {
                        self.best_move_changes += 1;
                    }
                } else {
                    // Failed-low moves sort behind every move that raised alpha
                    rm.score = -SCORE_INFINITE;
                }
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    best_move = mv;
                    if pv_node && score < beta {
                        alpha = score;
                        self.stack.update_pv(ply, mv);
                    } else {
                        break;
                    }
                }
            }
        }

        // Step 20. Mate, stalemate, or an exclusion search with nothing else to try
        if move_count == 0 {
            return if excluded.is_some() { alpha } else { mated_in(ply) };
        }

        // Every move was pruned without being searched
        if best_score == -SCORE_INFINITE {
            best_score = alpha;
        }

        if best_score >= beta {
            shared.tt.store(key, best_score, Bound::Lower, depth, best_move, static_eval, ply);

            if !best_move.is_capture_or_pawn_promotion() && !in_check {
                self.stack.at_mut(ply).set_killer(best_move);
                let bonus = depth * depth;
                shared.history.update(best_move, bonus);
                for &quiet in quiets[..quiet_count].iter().filter(|&&q| q != best_move) {
                    shared.history.update(quiet, -bonus);
                }
            }
        } else {
            let bound = if pv_node && best_move.is_some() { Bound::Exact } else { Bound::Upper };
            shared.tt.store(key, best_score, bound, depth, best_move, static_eval, ply);
        }

        best_score
    }
}
