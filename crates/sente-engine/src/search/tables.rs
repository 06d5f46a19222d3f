//! Reduction, futility and move-count tables precomputed from [`SearchParams`].

use sente_core::{Depth, SCORE_INFINITE, Score};

use crate::config::SearchParams;

/// Table width for depth and move-count indices.
const WIDTH: usize = 64;

/// Lookup tables derived once per search from the tunable parameters.
pub struct SearchTables {
    /// `[is_pv][depth][move_count]`
    reductions: Box<[[[Depth; WIDTH]; WIDTH]; 2]>,
    /// `[depth][move_count]` for depths below `futility_depth`.
    futility: Vec<[Score; WIDTH]>,
    /// Move count beyond which quiet moves are pruned, for depths below `move_count_depth`.
    move_counts: Vec<usize>,
}

fn clamp_index(value: i64) -> usize {
    value.clamp(0, WIDTH as i64 - 1) as usize
}

impl SearchTables {
    pub fn new(params: &SearchParams) -> Self {
        let mut reductions = Box::new([[[0; WIDTH]; WIDTH]; 2]);
        for depth in 1..WIDTH {
            for move_count in 1..WIDTH {
                let lnln = (depth as f64).ln() * (move_count as f64).ln();
                let non_pv = params.lmr_non_pv_base + lnln / params.lmr_non_pv_divisor;
                let pv = lnln / params.lmr_pv_divisor;
                reductions[0][depth][move_count] = if non_pv >= 1.0 { non_pv.floor() as Depth } else { 0 };
                reductions[1][depth][move_count] = if pv >= 1.0 { pv.floor() as Depth } else { 0 };
            }
        }

        let futility = (0..params.futility_depth.max(0))
            .map(|depth| {
                let d = f64::from(depth.max(1));
                let depth_term = ((2.0 * d * d).log2() + 1.001) as Score;
                let mut row = [0; WIDTH];
                for (move_count, margin) in row.iter_mut().enumerate() {
                    *margin = params.futility_scale * depth_term
                        - params.futility_move_penalty * move_count as Score
                        + params.futility_base;
                }
                row
            })
            .collect();

        let move_counts = (0..params.move_count_depth.max(0))
            .map(|depth| {
                (params.move_count_base + params.move_count_factor * f64::from(depth).powf(params.move_count_exponent))
                    as usize
            })
            .collect();

        Self {
            reductions,
            futility,
            move_counts,
        }
    }

    /// Late-move reduction in plies.
    #[inline]
    pub fn reduction(&self, pv: bool, depth: Depth, move_count: usize) -> Depth {
        self.reductions[pv as usize][clamp_index(depth.into())][clamp_index(move_count as i64)]
    }

    /// Futility margin for a node `depth` plies from the horizon whose
    /// `move_count`-th move is being considered. Beyond the table it is too
    /// large for any eval to clear.
    #[inline]
    pub fn futility_margin(&self, depth: Depth, move_count: usize) -> Score {
        match self.futility.get(depth.max(0) as usize) {
            Some(row) => row[clamp_index(move_count as i64)],
            None => 2 * SCORE_INFINITE,
        }
    }

    /// Quiet moves after this many are pruned at `depth`; `usize::MAX` when
    /// move-count pruning does not apply.
    #[inline]
    pub fn futility_move_count(&self, depth: Depth) -> usize {
        self.move_counts
            .get(depth.max(0) as usize)
            .copied()
            .unwrap_or(usize::MAX)
    }
}

impl std::fmt::Debug for SearchTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchTables")
            .field("futility_depths", &self.futility.len())
            .field("move_counts", &self.move_counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> SearchTables {
        SearchTables::new(&SearchParams::default())
    }

    #[test]
    fn no_reduction_for_early_moves() {
        let t = tables();
        assert_eq!(t.reduction(false, 1, 10), 0);
        assert_eq!(t.reduction(true, 10, 1), 0);
        assert_eq!(t.reduction(false, 3, 2), 0);
    }

    #[test]
    fn lmr_reduction_increases_with_depth_and_moves() {
        let t = tables();
        // More moves = more reduction
        assert!(t.reduction(false, 10, 40) > t.reduction(false, 10, 4));
        // More depth = more reduction
        assert!(t.reduction(false, 30, 10) > t.reduction(false, 4, 10));
        // PV nodes are reduced less
        assert!(t.reduction(true, 20, 20) < t.reduction(false, 20, 20));
        // Out-of-range indices clamp instead of panicking
        assert_eq!(t.reduction(false, 500, 500), t.reduction(false, 63, 63));
    }

    #[test]
    fn futility_margin_values() {
        let t = tables();
        assert_eq!(t.futility_margin(1, 0), 269);
        assert_eq!(t.futility_margin(2, 0), 493);
        assert_eq!(t.futility_margin(0, 0), t.futility_margin(1, 0));
        assert!(t.futility_margin(1, 10) < t.futility_margin(1, 0));
        assert_eq!(t.futility_margin(7, 0), 2 * SCORE_INFINITE);
    }

    #[test]
    fn move_count_thresholds_grow() {
        let t = tables();
        assert_eq!(t.futility_move_count(1), 4);
        assert_eq!(t.futility_move_count(2), 6);
        assert!(t.futility_move_count(7) > t.futility_move_count(3));
        assert_eq!(t.futility_move_count(8), usize::MAX);
    }
}
