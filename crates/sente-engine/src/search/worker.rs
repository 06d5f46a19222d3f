//! Per-thread search state and the iterative-deepening driver.
//!
//! Every thread runs the same driver over its own copy of the root position;
//! they share the transposition table, history and gains through
//! [`SearchShared`]. Thread 0 is the main thread: it owns the clock, emits
//! progress reports and assembles the final result once the helpers finish.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use sente_core::{
    Depth, MAX_PLY, Move, MoveList, Position, Repetition, SCORE_DRAW, SCORE_INFERIOR, SCORE_INFINITE,
    SCORE_KNOWN_WIN, SCORE_MAX_EVAL, SCORE_SUPERIOR, Score, mate_in, mated_in,
};
use tracing::{debug, error, info, warn};

use crate::config::SearchParams;
use crate::limits::Limits;
use crate::search::control::SearchControl;
use crate::search::history::{Gains, History};
use crate::search::root::{RootMove, sort_root_moves};
use crate::search::stack::SearchStack;
use crate::search::tables::SearchTables;
use crate::search::tt::TranspositionTable;
use crate::search::{BestMoveResult, Outcome, ScoreBound, SearchInfo};
use crate::time::{TimeManager, TimeOptions};

/// Receiver of progress reports.
pub type InfoCallback = Arc<dyn Fn(&SearchInfo) + Send + Sync>;

/// Node clock checks happen on multiples of this on the main thread.
const CHECK_INTERVAL: u64 = 2048;

/// Lazy-SMP depth skipping for helper `i`: it skips `depth` when
/// `((depth + game_ply + SKIP_PHASE[i]) / SKIP_SIZE[i])` is odd.
const SKIP_SIZE: [Depth; 20] = [1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];
const SKIP_PHASE: [Depth; 20] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7];

/// Return `true` if helper thread `id` (≥ 1) leaves `depth` to the others.
pub(crate) fn helper_skips_depth(id: usize, depth: Depth, game_ply: u32) -> bool {
    debug_assert!(id > 0, "the main thread searches every depth");
    let i = (id - 1) % SKIP_SIZE.len();
    ((depth + game_ply as Depth + SKIP_PHASE[i]) / SKIP_SIZE[i]) % 2 != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum NodeType {
    Root,
    Pv,
    NonPv,
}

impl NodeType {
    #[inline]
    pub(super) fn is_pv(self) -> bool {
        self != NodeType::NonPv
    }
}

/// One thread's node counter on its own cache line.
#[derive(Default)]
#[repr(align(64))]
struct NodeCounter(AtomicU64);

/// What one thread reached before the search ended.
#[derive(Debug, Clone)]
pub(crate) struct ThreadOutcome {
    pub depth: Depth,
    pub score: Score,
    pub pv: Vec<Move>,
}

/// Everything the threads of one search share.
pub(crate) struct SearchShared {
    pub tt: Arc<TranspositionTable>,
    pub history: Arc<History>,
    pub gains: Arc<Gains>,
    pub control: SearchControl,
    pub limits: Limits,
    pub params: SearchParams,
    pub tables: Arc<SearchTables>,
    pub time_options: TimeOptions,
    pub multi_pv: usize,
    pub info: Option<InfoCallback>,
    nodes: Box<[NodeCounter]>,
    outcomes: Mutex<Vec<Option<ThreadOutcome>>>,
    helpers_running: Mutex<usize>,
    helpers_done: Condvar,
    result: Mutex<Option<BestMoveResult>>,
    result_ready: Condvar,
}

/// Tables and options a [`SearchShared`] is assembled from.
pub(crate) struct SharedTables {
    pub tt: Arc<TranspositionTable>,
    pub history: Arc<History>,
    pub gains: Arc<Gains>,
    pub tables: Arc<SearchTables>,
    pub params: SearchParams,
    pub time_options: TimeOptions,
    pub multi_pv: usize,
    pub info: Option<InfoCallback>,
}

impl SearchShared {
    pub(crate) fn new(shared: SharedTables, limits: Limits, threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            tt: shared.tt,
            history: shared.history,
            gains: shared.gains,
            control: SearchControl::new(limits.ponder),
            limits,
            params: shared.params,
            tables: shared.tables,
            time_options: shared.time_options,
            multi_pv: shared.multi_pv.max(1),
            info: shared.info,
            nodes: (0..threads).map(|_| NodeCounter::default()).collect(),
            outcomes: Mutex::new(vec![None; threads]),
            helpers_running: Mutex::new(threads - 1),
            helpers_done: Condvar::new(),
            result: Mutex::new(None),
            result_ready: Condvar::new(),
        }
    }

    pub(crate) fn threads(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes searched so far over all threads.
    pub(crate) fn total_nodes(&self) -> u64 {
        self.nodes.iter().map(|c| c.0.load(Ordering::Relaxed)).sum()
    }

    fn record_outcome(&self, id: usize, outcome: ThreadOutcome) {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)[id] = Some(outcome);
    }

    fn helper_finished(&self) {
        let mut running = self.helpers_running.lock().unwrap_or_else(PoisonError::into_inner);
        *running = running.saturating_sub(1);
        self.helpers_done.notify_all();
    }

    fn wait_for_helpers(&self) {
        let mut running = self.helpers_running.lock().unwrap_or_else(PoisonError::into_inner);
        while *running > 0 {
            running = self.helpers_done.wait(running).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn publish(&self, result: BestMoveResult) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.result_ready.notify_all();
    }

    /// Block until the main thread has published the result.
    pub(crate) fn wait_for_result(&self) -> BestMoveResult {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.result_ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.result.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

#[cfg(test)]
impl SearchShared {
    /// A search over fresh tables with `threads` threads and no reports.
    pub(crate) fn for_tests(params: SearchParams, limits: Limits, threads: usize) -> Self {
        let tables = SharedTables {
            tt: Arc::new(TranspositionTable::new(1).unwrap()),
            history: Arc::new(History::new()),
            gains: Arc::new(Gains::new()),
            tables: Arc::new(SearchTables::new(&params)),
            params,
            time_options: TimeOptions::default(),
            multi_pv: 1,
            info: None,
        };
        Self::new(tables, limits, threads)
    }
}

/// Clamp an evaluation into the range the search reserves for non-mate scores.
pub(super) fn checked_eval(eval: Score) -> Score {
    debug_assert!(eval.abs() <= SCORE_MAX_EVAL, "evaluation out of range: {eval}");
    if eval.abs() > SCORE_MAX_EVAL {
        warn!(eval, "evaluation out of range, clamped");
        eval.clamp(-SCORE_MAX_EVAL, SCORE_MAX_EVAL)
    } else {
        eval
    }
}

/// Run thread `id` of the search rooted at `root` to completion.
///
/// A panicking thread still completes its part of the search: a helper is
/// counted as finished and the main thread publishes a fallback result, so
/// waiters never hang on it.
pub(crate) fn run<P: Position>(id: usize, root: &P, shared: &SearchShared) {
    let searched = panic::catch_unwind(AssertUnwindSafe(|| search_thread(id, root, shared)));
    let Err(payload) = searched else {
        return;
    };

    error!(thread = id, reason = panic_message(&*payload), "search thread panicked");
    shared.control.stop();
    if id == 0 {
        shared.wait_for_helpers();
        shared.publish(fallback_result(root, shared));
    } else {
        shared.helper_finished();
    }
}

fn search_thread<P: Position>(id: usize, root: &P, shared: &SearchShared) {
    let mut worker = Worker::new(id, root.clone(), shared);
    if worker.is_main() {
        let result = worker.think();
        shared.publish(result);
    } else {
        if !worker.root_moves.is_empty() && !shared.control.is_stopped() {
            worker.iterative_deepening();
        }
        shared.record_outcome(id, worker.outcome());
        shared.helper_finished();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown"
    }
}

/// Result of a search whose main thread died: the deepest helper line, else
/// the first allowed root move, else resignation.
fn fallback_result<P: Position>(root: &P, shared: &SearchShared) -> BestMoveResult {
    let nodes = shared.total_nodes();
    let outcomes = shared.outcomes.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let deepest = outcomes
        .into_iter()
        .flatten()
        .filter(|outcome| outcome.depth > 0 && !outcome.pv.is_empty())
        .max_by_key(|outcome| (outcome.depth, outcome.score));
    if let Some(best) = deepest {
        return BestMoveResult {
            outcome: Outcome::Move(best.pv[0]),
            ponder: best.pv.get(1).copied(),
            score: best.score,
            depth: best.depth,
            nodes,
            pv: best.pv,
        };
    }

    let mut legal = MoveList::new();
    root.legal_moves(&mut legal);
    let search_moves = &shared.limits.search_moves;
    let first = legal
        .iter()
        .copied()
        .find(|mv| search_moves.is_empty() || search_moves.contains(mv));
    BestMoveResult {
        outcome: first.map_or(Outcome::Resign, Outcome::Move),
        ponder: None,
        score: if first.is_some() { SCORE_DRAW } else { mated_in(0) },
        depth: 0,
        nodes,
        pv: first.into_iter().collect(),
    }
}

/// Per-thread search state.
pub(super) struct Worker<'a, P: Position> {
    pub(super) id: usize,
    pub(super) pos: P,
    pub(super) shared: &'a SearchShared,
    pub(super) stack: SearchStack,
    pub(super) root_moves: Vec<RootMove>,
    /// Index of the PV line being searched (MultiPV).
    pub(super) pv_idx: usize,
    pub(super) nodes: u64,
    pub(super) sel_depth: usize,
    pub(super) best_move_changes: u32,
    completed_depth: Depth,
    time: Option<TimeManager>,
}

impl<'a, P: Position> Worker<'a, P> {
    pub(super) fn new(id: usize, pos: P, shared: &'a SearchShared) -> Self {
        let limits = &shared.limits;

        let mut legal = MoveList::new();
        pos.legal_moves(&mut legal);
        let root_moves = legal
            .iter()
            .filter(|mv| limits.search_moves.is_empty() || limits.search_moves.contains(mv))
            .map(|&mv| RootMove::new(mv))
            .collect();

        let time = (id == 0 && limits.time_limited())
            .then(|| TimeManager::new(limits, pos.side_to_move(), pos.game_ply(), &shared.time_options));

        Self {
            id,
            pos,
            shared,
            stack: SearchStack::new(),
            root_moves,
            pv_idx: 0,
            nodes: 0,
            sel_depth: 0,
            best_move_changes: 0,
            completed_depth: 0,
            time,
        }
    }

    #[inline]
    pub(super) fn is_main(&self) -> bool {
        self.id == 0
    }

    #[inline]
    pub(super) fn stopped(&self) -> bool {
        self.shared.control.is_stopped()
    }

    /// Score of a repeated position at `ply`, or `None` to keep searching.
    /// Hand-material repetitions at ply 2 are searched so the root can tell
    /// them apart from a plain draw.
    pub(super) fn repetition_score(&self, ply: usize) -> Option<Score> {
        match self.pos.repetition(self.shared.params.repetition_window) {
            Repetition::None => None,
            Repetition::Draw => Some(SCORE_DRAW),
            Repetition::Win => Some(mate_in(ply)),
            Repetition::Lose => Some(mated_in(ply)),
            Repetition::Superior if ply != 2 => Some(SCORE_SUPERIOR),
            Repetition::Inferior if ply != 2 => Some(SCORE_INFERIOR),
            Repetition::Superior | Repetition::Inferior => None,
        }
    }

    /// Moves the root node may search: the remaining MultiPV candidates at a
    /// root node, every allowed root move when the root position is searched as
    /// an ordinary node.
    pub(super) fn allowed_at_root(&self, mv: Move, root: bool) -> bool {
        let first = if root { self.pv_idx } else { 0 };
        self.root_moves[first..].iter().any(|rm| rm.mv() == mv)
    }

    /// Count a node; the main thread checks the clock every [`CHECK_INTERVAL`].
    #[inline]
    pub(super) fn count_node(&mut self) {
        self.nodes += 1;
        self.shared.nodes[self.id].0.store(self.nodes, Ordering::Relaxed);
        if self.is_main() && self.nodes % CHECK_INTERVAL == 0 {
            self.check_time();
        }
    }

    /// Stop on the hard limit, on the optimum while the first root move is
    /// still unresolved, or on the node limit. Suspended while pondering.
    fn check_time(&self) {
        let control = &self.shared.control;
        if control.is_pondering() {
            return;
        }
        let limits = &self.shared.limits;
        let elapsed = control.elapsed();

        let out_of_time = self.time.as_ref().is_some_and(|tm| {
            (limits.time_limited() && elapsed > tm.hard_limit())
                || (limits.use_time_management()
                    && control.at_first_root_move()
                    && !control.failed_low_at_root()
                    && elapsed > tm.available())
        });
        let out_of_nodes = limits.nodes.is_some_and(|n| self.shared.total_nodes() >= n);

        if out_of_time || out_of_nodes {
            control.stop();
        }
    }

    /// Main thread: decide, search, wait for the helpers and pick the result.
    fn think(&mut self) -> BestMoveResult {
        let shared = self.shared;
        let control = &shared.control;
        info!(
            threads = shared.threads(),
            root_moves = self.root_moves.len(),
            ply = self.pos.game_ply(),
            "search started"
        );

        let early = if self.pos.declared_win() {
            Some(Outcome::Win)
        } else if self.root_moves.is_empty() {
            self.emit(SearchInfo {
                depth: 0,
                sel_depth: 0,
                multi_pv: 1,
                score: mated_in(0),
                bound: ScoreBound::Exact,
                nodes: 0,
                nps: 0,
                time: control.elapsed(),
                hashfull: shared.tt.hashfull(),
                pv: Vec::new(),
            });
            Some(Outcome::Resign)
        } else {
            self.iterative_deepening();
            None
        };

        // A finished ponder or infinite search holds its answer until told.
        while !control.is_stopped() && (control.is_pondering() || shared.limits.infinite) {
            std::thread::sleep(Duration::from_millis(1));
        }
        control.stop();
        shared.wait_for_helpers();

        let nodes = shared.total_nodes();
        let result = match early {
            Some(outcome) => BestMoveResult {
                outcome,
                ponder: None,
                score: if outcome == Outcome::Win { mate_in(0) } else { mated_in(0) },
                depth: 0,
                nodes,
                pv: Vec::new(),
            },
            None => self.best_result(nodes),
        };
        info!(
            nodes,
            elapsed_ms = control.elapsed().as_millis() as u64,
            depth = result.depth,
            score = result.score,
            "search finished"
        );
        result
    }

    /// Deepest completed search with the best score, main thread by default.
    fn best_result(&mut self, nodes: u64) -> BestMoveResult {
        let mut best = self.outcome();
        let outcomes = self.shared.outcomes.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if self.shared.multi_pv == 1 {
            for outcome in outcomes.into_iter().flatten() {
                if outcome.pv.is_empty() || outcome.depth == 0 {
                    continue;
                }
                if outcome.depth > best.depth || (outcome.depth == best.depth && outcome.score > best.score) {
                    best = outcome;
                }
            }
        }

        let mut ponder = best.pv.get(1).copied();
        if ponder.is_none() {
            let mut rm = RootMove::new(best.pv[0]);
            rm.extract_pv_from_tt(&mut self.pos, &self.shared.tt);
            ponder = rm.pv.get(1).copied();
        }

        BestMoveResult {
            outcome: Outcome::Move(best.pv[0]),
            ponder,
            score: best.score,
            depth: best.depth,
            nodes,
            pv: best.pv,
        }
    }

    fn outcome(&self) -> ThreadOutcome {
        match self.root_moves.first() {
            Some(rm) => ThreadOutcome {
                depth: self.completed_depth,
                score: rm.score,
                pv: rm.pv.clone(),
            },
            None => ThreadOutcome {
                depth: 0,
                score: -SCORE_INFINITE,
                pv: Vec::new(),
            },
        }
    }

    /// Iterative deepening with aspiration windows and MultiPV.
    fn iterative_deepening(&mut self) {
        let shared = self.shared;
        let control = &shared.control;
        let params = shared.params;
        let limits = &shared.limits;

        self.stack.reset();
        let multi_pv = shared.multi_pv.min(self.root_moves.len());
        let max_depth = limits.depth.map_or(MAX_PLY as Depth, |d| d.clamp(1, MAX_PLY as Depth));
        let game_ply = self.pos.game_ply();

        let mut best_score = -SCORE_INFINITE;
        let (mut alpha, mut beta) = (-SCORE_INFINITE, SCORE_INFINITE);
        let mut delta = -SCORE_INFINITE;
        let mut best_move_never_changed = true;
        let mut last_report: Option<Duration> = None;
        let mut depth: Depth = 0;

        while depth < max_depth && !self.stopped() {
            depth += 1;
            if !self.is_main() && helper_skips_depth(self.id, depth, game_ply) {
                continue;
            }

            for rm in &mut self.root_moves {
                rm.prev_score = rm.score;
            }
            let prev_best_move_changes = self.best_move_changes;
            self.best_move_changes = 0;

            self.pv_idx = 0;
            while self.pv_idx < multi_pv && !self.stopped() {
                let pv_idx = self.pv_idx;
                let prev = self.root_moves[pv_idx].prev_score;
                if depth >= params.aspiration_min_depth && prev.abs() < SCORE_KNOWN_WIN {
                    delta = params.aspiration_delta;
                    alpha = (prev - delta).max(-SCORE_INFINITE);
                    beta = (prev + delta).min(SCORE_INFINITE);
                } else {
                    alpha = -SCORE_INFINITE;
                    beta = SCORE_INFINITE;
                }

                loop {
                    self.sel_depth = 0;
                    best_score = self.search(NodeType::Root, 0, alpha, beta, depth, false);

                    sort_root_moves(&mut self.root_moves[pv_idx..]);
                    for i in 0..=pv_idx {
                        self.root_moves[i].insert_pv_in_tt(&mut self.pos, &shared.tt);
                    }

                    if self.stopped() || (alpha < best_score && best_score < beta) {
                        break;
                    }

                    if self.is_main() {
                        let elapsed = control.elapsed();
                        let interval = Duration::from_millis(params.info_interval_ms);
                        if last_report.is_none_or(|at| elapsed >= at + interval) {
                            self.report(depth, alpha, beta);
                            last_report = Some(elapsed);
                        }
                    }

                    if delta == params.aspiration_delta {
                        delta = params.aspiration_second_delta;
                    }

                    if best_score.abs() >= SCORE_KNOWN_WIN {
                        alpha = -SCORE_INFINITE;
                        beta = SCORE_INFINITE;
                    } else if best_score >= beta {
                        beta = (best_score + delta).min(SCORE_INFINITE);
                        delta += delta / 2;
                    } else {
                        if self.is_main() {
                            control.set_failed_low_at_root(true);
                            control.cancel_stop_on_ponder_hit();
                        }
                        alpha = (best_score - delta).max(-SCORE_INFINITE);
                        delta += delta / 2;
                    }
                }

                sort_root_moves(&mut self.root_moves[..=pv_idx]);
                self.pv_idx += 1;
            }

            if self.stopped() {
                break;
            }
            self.completed_depth = depth;

            if !self.is_main() {
                continue;
            }

            self.report(depth, alpha, beta);
            last_report = Some(control.elapsed());
            debug!(
                depth,
                score = self.root_moves[0].score,
                best = %self.root_moves[0].mv(),
                nodes = shared.total_nodes(),
                changes = self.best_move_changes,
                "iteration complete"
            );

            if let Some(n) = limits.mate
                && self.root_moves[0].score >= mate_in(2 * n as usize)
            {
                control.stop();
                break;
            }

            if limits.use_time_management() && !control.stop_on_ponder_hit() {
                let mut stop = false;
                if let Some(tm) = self.time.as_mut() {
                    if depth > 4 && depth < 50 && multi_pv == 1 {
                        tm.set_pv_instability(self.best_move_changes, prev_best_move_changes);
                    }
                    let elapsed = control.elapsed();
                    let available = tm.available();
                    if elapsed > available * params.iteration_time_percent / 100 {
                        stop = true;
                    }
                    if depth > 2 && self.best_move_changes != 0 {
                        best_move_never_changed = false;
                    }

                    if depth >= params.easy_move_depth
                        && !stop
                        && best_move_never_changed
                        && multi_pv == 1
                        && best_score >= -SCORE_INFINITE + params.easy_move_margin
                        && (self.root_moves.len() == 1 || elapsed > available * params.easy_move_time_percent / 100)
                    {
                        stop = self.best_move_stands_out(best_score, depth);
                    }
                }
                if stop {
                    control.stop_or_defer();
                }
            }
        }
    }

    /// Search every other allowed root move at `best_score - easy_move_margin`;
    /// `true` when all of them fail low.
    fn best_move_stands_out(&mut self, best_score: Score, depth: Depth) -> bool {
        let params = self.shared.params;
        let r_beta = best_score - params.easy_move_margin;
        let best = self.root_moves[0].mv();

        let frame = self.stack.at_mut(0);
        frame.excluded_move = best;
        frame.skip_null = true;
        let score = self.search(
            NodeType::NonPv,
            0,
            r_beta - 1,
            r_beta,
            (depth - params.easy_move_reduction).max(1),
            true,
        );
        let frame = self.stack.at_mut(0);
        frame.excluded_move = Move::NONE;
        frame.skip_null = false;

        score < r_beta
    }

    /// Emit one report per PV line.
    fn report(&self, depth: Depth, alpha: Score, beta: Score) {
        if self.shared.info.is_none() {
            return;
        }
        let elapsed = self.shared.control.elapsed();
        let nodes = self.shared.total_nodes();
        let nps = nodes * 1000 / (elapsed.as_millis() as u64).max(1);
        let hashfull = self.shared.tt.hashfull();
        let lines = self.shared.multi_pv.min(self.root_moves.len());

        for (i, rm) in self.root_moves.iter().take(lines).enumerate() {
            let updated = i <= self.pv_idx;
            if depth == 1 && !updated {
                continue;
            }
            let (depth, score) = if updated { (depth, rm.score) } else { (depth - 1, rm.prev_score) };
            let bound = if i != self.pv_idx {
                ScoreBound::Exact
            } else if score >= beta {
                ScoreBound::Lower
            } else if score <= alpha {
                ScoreBound::Upper
            } else {
                ScoreBound::Exact
            };
            self.emit(SearchInfo {
                depth,
                sel_depth: self.sel_depth,
                multi_pv: i + 1,
                score,
                bound,
                nodes,
                nps,
                time: elapsed,
                hashfull,
                pv: rm.pv.clone(),
            });
        }
    }

    fn emit(&self, info: SearchInfo) {
        if let Some(callback) = &self.shared.info {
            callback(&info);
        }
    }
}
