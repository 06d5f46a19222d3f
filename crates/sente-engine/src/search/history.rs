//! History and gains heuristics for quiet move ordering and futility.
//!
//! Both tables are indexed by `[is_drop][piece_kind][to_square]` and shared
//! by every search thread. Updates are a relaxed load followed by a relaxed
//! store: a lost update only costs ordering quality.

use std::sync::atomic::{AtomicI32, Ordering};

use sente_core::{Move, PieceKind, Score, Square};

/// History values stay strictly inside `±HISTORY_MAX`.
pub const HISTORY_MAX: Score = 2000;

const CELLS: usize = 2 * PieceKind::COUNT * Square::COUNT;

#[inline]
fn index(mv: Move) -> usize {
    ((mv.is_drop() as usize * PieceKind::COUNT) + mv.piece_kind().index()) * Square::COUNT
        + mv.to().index()
}

fn zeroed() -> Box<[AtomicI32]> {
    (0..CELLS).map(|_| AtomicI32::new(0)).collect()
}

/// Signed reward for quiet moves that caused (or failed to cause) cutoffs.
pub struct History {
    cells: Box<[AtomicI32]>,
}

impl History {
    pub fn new() -> Self {
        Self { cells: zeroed() }
    }

    pub fn clear(&self) {
        for cell in self.cells.iter() {
            cell.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn get(&self, mv: Move) -> Score {
        self.cells[index(mv)].load(Ordering::Relaxed)
    }

    /// Add `bonus` (negative for a penalty) unless that would leave the
    /// bounded range, in which case the cell is left as is.
    pub fn update(&self, mv: Move, bonus: Score) {
        let cell = &self.cells[index(mv)];
        let value = cell.load(Ordering::Relaxed);
        if (value + bonus).abs() < HISTORY_MAX {
            cell.store(value + bonus, Ordering::Relaxed);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest static-evaluation swing recently observed after a quiet move.
///
/// Each update takes the new swing or decays the stored one by one,
/// whichever is larger.
pub struct Gains {
    cells: Box<[AtomicI32]>,
}

impl Gains {
    pub fn new() -> Self {
        Self { cells: zeroed() }
    }

    pub fn clear(&self) {
        for cell in self.cells.iter() {
            cell.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn get(&self, mv: Move) -> Score {
        self.cells[index(mv)].load(Ordering::Relaxed)
    }

    pub fn update(&self, mv: Move, gain: Score) {
        let cell = &self.cells[index(mv)];
        let value = cell.load(Ordering::Relaxed);
        cell.store(gain.max(value - 1), Ordering::Relaxed);
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History").field("cells", &self.cells.len()).finish()
    }
}

impl std::fmt::Debug for Gains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gains").field("cells", &self.cells.len()).finish()
    }
}
