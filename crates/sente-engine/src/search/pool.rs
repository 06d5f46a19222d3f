//! Lazy SMP thread pool.
//!
//! Search threads are spawned once and parked on a condition variable
//! between searches. Starting a search publishes a job (root position plus
//! the shared state of that search) and wakes every thread; thread 0 is the
//! main thread and publishes the result once all helpers have returned.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use sente_core::{Position, mated_in};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MAX_HASH_MB, MAX_MULTI_PV, MAX_THREADS, check_range};
use crate::error::EngineError;
use crate::limits::Limits;
use crate::search::history::{Gains, History};
use crate::search::tables::SearchTables;
use crate::search::tt::TranspositionTable;
use crate::search::worker::{self, InfoCallback, SearchShared, SharedTables};
use crate::search::{BestMoveResult, Outcome, SearchInfo};

/// Stack size of each search thread; the recursion keeps move lists on the stack.
const STACK_SIZE: usize = 64 * 1024 * 1024;

/// A published search; every thread takes its own copy of the root.
struct Job<P> {
    root: P,
    shared: Arc<SearchShared>,
}

struct PoolState<P> {
    job: Option<Job<P>>,
    /// Bumped for every published job.
    epoch: u64,
    /// Threads still holding a copy of a job.
    busy: usize,
    quit: bool,
}

/// Where idle threads wait for work.
struct Parking<P> {
    state: Mutex<PoolState<P>>,
    wake: Condvar,
    /// Signalled when `busy` drops to zero.
    idle: Condvar,
}

impl<P> Parking<P> {
    fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                job: None,
                epoch: 0,
                busy: 0,
                quit: false,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.busy -= 1;
        if state.busy == 0 {
            self.idle.notify_all();
        }
    }

    /// Withdraw the current job and wait until no thread holds a copy of it.
    fn withdraw(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.job = None;
        while state.busy > 0 {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn idle_loop<P: Position>(id: usize, parking: &Parking<P>) {
    let mut seen = 0;
    loop {
        let job = {
            let mut state = parking.state.lock().unwrap_or_else(PoisonError::into_inner);
            while !state.quit && state.epoch == seen {
                state = parking.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            if state.quit {
                return;
            }
            seen = state.epoch;
            let job = match &state.job {
                Some(job) if id < job.shared.threads() => Some((job.root.clone(), Arc::clone(&job.shared))),
                _ => None,
            };
            if job.is_some() {
                state.busy += 1;
            }
            job
        };

        if let Some((root, shared)) = job {
            worker::run(id, &root, &shared);
            drop((root, shared));
            parking.release();
        }
    }
}

/// Lazy SMP thread pool: owns the shared transposition table and the
/// move-ordering tables.
pub struct ThreadPool<P: Position> {
    config: EngineConfig,
    tt: Arc<TranspositionTable>,
    history: Arc<History>,
    gains: Arc<Gains>,
    tables: Arc<SearchTables>,
    limits: Limits,
    info: Option<InfoCallback>,
    parking: Arc<Parking<P>>,
    handles: Vec<JoinHandle<()>>,
    current: Mutex<Option<Arc<SearchShared>>>,
}

impl<P: Position> ThreadPool<P> {
    /// Allocate the tables and spawn `config.threads` parked threads.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let tt = TranspositionTable::new(config.hash_mb)?;
        let mut pool = Self {
            tt: Arc::new(tt),
            history: Arc::new(History::new()),
            gains: Arc::new(Gains::new()),
            tables: Arc::new(SearchTables::new(&config.search)),
            limits: Limits::default(),
            info: None,
            parking: Arc::new(Parking::new()),
            handles: Vec::new(),
            current: Mutex::new(None),
            config,
        };
        pool.spawn_threads()?;
        info!(
            threads = pool.config.threads,
            hash_mb = pool.config.hash_mb,
            "thread pool ready"
        );
        Ok(pool)
    }

    fn spawn_threads(&mut self) -> Result<(), EngineError> {
        for index in 0..self.config.threads {
            let parking = Arc::clone(&self.parking);
            let handle = std::thread::Builder::new()
                .name(format!("search-{index}"))
                .stack_size(STACK_SIZE)
                .spawn(move || idle_loop(index, &parking))
                .map_err(|source| EngineError::ThreadSpawn { index, source })?;
            self.handles.push(handle);
        }
        Ok(())
    }

    fn join_threads(&mut self) {
        {
            let mut state = self.parking.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.quit = true;
            state.job = None;
        }
        self.parking.wake.notify_all();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("search thread panicked");
            }
        }
        self.parking = Arc::new(Parking::new());
    }

    fn current(&self) -> Option<Arc<SearchShared>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop a running search, wait for it, and drop every reference to its
    /// shared state, including those the threads hold.
    fn finish_search(&mut self) {
        if let Some(shared) = self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
            shared.control.stop();
            shared.wait_for_result();
        }
        self.parking.withdraw();
    }

    /// Receive a [`SearchInfo`] for every progress report of later searches.
    pub fn set_info_callback(&mut self, callback: impl Fn(&SearchInfo) + Send + Sync + 'static) {
        self.info = Some(Arc::new(callback));
    }

    /// Limits used by the next [`go`](Self::go).
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Start searching `pos` under `limits` and return immediately.
    ///
    /// A search still running is stopped first.
    pub fn start_search(&mut self, pos: &P, limits: Limits) {
        self.set_limits(limits);
        self.go(pos);
    }

    /// Start searching `pos` under the limits from [`set_limits`](Self::set_limits).
    pub fn go(&mut self, pos: &P) {
        self.finish_search();

        self.tt.new_search();
        self.history.clear();
        self.gains.clear();

        let shared = Arc::new(SearchShared::new(
            SharedTables {
                tt: Arc::clone(&self.tt),
                history: Arc::clone(&self.history),
                gains: Arc::clone(&self.gains),
                tables: Arc::clone(&self.tables),
                params: self.config.search,
                time_options: self.config.time,
                multi_pv: self.config.multi_pv,
                info: self.info.clone(),
            },
            self.limits.clone(),
            self.handles.len(),
        ));
        debug!(limits = ?self.limits, "dispatching search");

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&shared));
        {
            let mut state = self.parking.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.job = Some(Job {
                root: pos.clone(),
                shared,
            });
            state.epoch += 1;
        }
        self.parking.wake.notify_all();
    }

    /// Block until the running search reports its result.
    ///
    /// Without a search to wait for, reports a resignation.
    pub fn wait_for_completion(&self) -> BestMoveResult {
        match self.current() {
            Some(shared) => shared.wait_for_result(),
            None => {
                warn!("wait_for_completion called with no search started");
                BestMoveResult {
                    outcome: Outcome::Resign,
                    ponder: None,
                    score: mated_in(0),
                    depth: 0,
                    nodes: 0,
                    pv: Vec::new(),
                }
            }
        }
    }

    /// Search `pos` under `limits` and wait for the result.
    pub fn search(&mut self, pos: &P, limits: Limits) -> BestMoveResult {
        self.start_search(pos, limits);
        self.wait_for_completion()
    }

    /// Ask the running search to stop; the result is still delivered.
    pub fn stop(&self) {
        if let Some(shared) = self.current() {
            shared.control.stop();
        }
    }

    /// The opponent played the expected move: switch a ponder search to
    /// normal timing.
    pub fn ponder_hit(&self) {
        if let Some(shared) = self.current() {
            shared.control.ponder_hit();
        }
    }

    /// Whether a started search has not yet published its result.
    pub fn is_searching(&self) -> bool {
        self.current().is_some_and(|shared| !shared.is_finished())
    }

    /// Replace the transposition table with a `megabytes` MB one (cleared).
    pub fn resize_hash(&mut self, megabytes: usize) -> Result<(), EngineError> {
        check_range("hash_mb", megabytes, 1, MAX_HASH_MB)?;
        self.finish_search();
        match Arc::get_mut(&mut self.tt) {
            Some(tt) => tt.resize(megabytes)?,
            None => {
                warn!("transposition table still shared, allocating a separate one");
                self.tt = Arc::new(TranspositionTable::new(megabytes)?);
            }
        }
        self.config.hash_mb = megabytes;
        Ok(())
    }

    pub fn clear_hash(&self) {
        self.tt.clear();
    }

    /// Forget everything learned in the previous game.
    pub fn new_game(&self) {
        self.tt.clear();
        self.history.clear();
        self.gains.clear();
    }

    /// Respawn the pool with `threads` search threads.
    pub fn set_threads(&mut self, threads: usize) -> Result<(), EngineError> {
        check_range("threads", threads, 1, MAX_THREADS)?;
        if threads == self.handles.len() {
            return Ok(());
        }
        self.finish_search();
        self.join_threads();
        self.config.threads = threads;
        self.spawn_threads()
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    pub fn set_multi_pv(&mut self, multi_pv: usize) -> Result<(), EngineError> {
        check_range("multi_pv", multi_pv, 1, MAX_MULTI_PV)?;
        self.config.multi_pv = multi_pv;
        Ok(())
    }

    /// Per-mille of the transposition table written by the latest search.
    pub fn hashfull(&self) -> usize {
        self.tt.hashfull()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<P: Position> Drop for ThreadPool<P> {
    fn drop(&mut self) {
        self.finish_search();
        self.join_threads();
    }
}

impl<P: Position> std::fmt::Debug for ThreadPool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("tt", &self.tt)
            .field("threads", &self.handles.len())
            .field("multi_pv", &self.config.multi_pv)
            .finish()
    }
}
