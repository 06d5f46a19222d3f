//! Search control: stop and ponder signals, and the search clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Signals shared by every thread of one search.
///
/// The stop flag is polled at every node and after every move; the clock is
/// only read by the main thread, every 2048 nodes and between iterations.
/// Supports three modes:
/// - **Timed**: clock starts immediately
/// - **Infinite**: no time pressure, only responds to [`stop()`](Self::stop)
/// - **Ponder**: time checks are suspended until [`ponder_hit()`](Self::ponder_hit),
///   which restarts the clock
pub struct SearchControl {
    stopped: AtomicBool,
    pondering: AtomicBool,
    stop_on_ponder_hit: AtomicBool,
    first_root_move: AtomicBool,
    failed_low_at_root: AtomicBool,
    start: Mutex<Instant>,
}

impl SearchControl {
    pub fn new(ponder: bool) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            pondering: AtomicBool::new(ponder),
            stop_on_ponder_hit: AtomicBool::new(false),
            first_root_move: AtomicBool::new(false),
            failed_low_at_root: AtomicBool::new(false),
            start: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Ask every thread to unwind.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_pondering(&self) -> bool {
        self.pondering.load(Ordering::Acquire)
    }

    /// Leave ponder mode and restart the clock.
    ///
    /// A stop deferred while pondering is delivered now.
    pub fn ponder_hit(&self) {
        *self.start.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.pondering.store(false, Ordering::Release);
        if self.stop_on_ponder_hit.load(Ordering::Acquire) {
            self.stop();
        }
    }

    /// Stop now, or at the ponder hit when pondering.
    pub fn stop_or_defer(&self) {
        if self.is_pondering() {
            self.stop_on_ponder_hit.store(true, Ordering::Release);
        } else {
            self.stop();
        }
    }

    pub fn stop_on_ponder_hit(&self) -> bool {
        self.stop_on_ponder_hit.load(Ordering::Acquire)
    }

    pub fn cancel_stop_on_ponder_hit(&self) {
        self.stop_on_ponder_hit.store(false, Ordering::Release);
    }

    /// Whether the root is still searching its first move of the iteration.
    pub fn at_first_root_move(&self) -> bool {
        self.first_root_move.load(Ordering::Relaxed)
    }

    pub fn set_first_root_move(&self, first: bool) {
        self.first_root_move.store(first, Ordering::Relaxed);
    }

    pub fn failed_low_at_root(&self) -> bool {
        self.failed_low_at_root.load(Ordering::Relaxed)
    }

    pub fn set_failed_low_at_root(&self, failed: bool) {
        self.failed_low_at_root.store(failed, Ordering::Relaxed);
    }

    /// Time since the search started, or since the ponder hit.
    pub fn elapsed(&self) -> Duration {
        self.start.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }
}

impl std::fmt::Debug for SearchControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchControl")
            .field("stopped", &self.is_stopped())
            .field("pondering", &self.is_pondering())
            .field("stop_on_ponder_hit", &self.stop_on_ponder_hit())
            .finish()
    }
}
