//! Engine configuration and tunable search parameters.
//!
//! Everything here deserializes from TOML with `#[serde(default)]`, so a
//! config file only has to name the values it changes:
//!
//! ```toml
//! hash_mb = 256
//! threads = 4
//!
//! [search]
//! razor_margin_base = 480
//!
//! [time]
//! move_overhead_ms = 50
//! ```

use std::path::Path;

use sente_core::{Depth, MAX_PLY, SCORE_MAX_EVAL, Score};

use crate::error::EngineError;
use crate::time::TimeOptions;

/// Largest accepted transposition table size.
pub const MAX_HASH_MB: usize = 1 << 20;
/// Largest accepted thread count.
pub const MAX_THREADS: usize = 512;
/// Largest accepted MultiPV count.
pub const MAX_MULTI_PV: usize = 600;

/// Engine-wide options.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transposition table size in megabytes.
    pub hash_mb: usize,
    /// Number of search threads (including the main thread).
    pub threads: usize,
    /// Number of principal variations to search and report.
    pub multi_pv: usize,
    pub time: TimeOptions,
    pub search: SearchParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_mb: 16,
            threads: 1,
            multi_pv: 1,
            time: TimeOptions::default(),
            search: SearchParams::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_range("hash_mb", self.hash_mb, 1, MAX_HASH_MB)?;
        check_range("threads", self.threads, 1, MAX_THREADS)?;
        check_range("multi_pv", self.multi_pv, 1, MAX_MULTI_PV)?;
        self.time.validate()?;
        self.search.validate()
    }
}

/// `Ok` when `value` lies in `min..=max`. NaN is never in range.
pub(crate) fn check_range<T>(name: &'static str, value: T, min: T, max: T) -> Result<(), EngineError>
where
    T: PartialOrd + ToString,
{
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidOption {
            name,
            value: value.to_string(),
        })
    }
}

/// Pruning margins, reductions and thresholds.
///
/// Depths are in whole plies, scores in evaluation units (a pawn is 90).
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct SearchParams {
    // Razoring
    pub razor_depth: Depth,
    pub razor_margin_base: Score,
    pub razor_margin_per_ply: Score,

    // Static null move
    pub static_null_depth: Depth,

    // Null move
    pub null_min_depth: Depth,
    pub null_base_reduction: Depth,
    pub null_depth_divisor: Depth,
    /// Eval surplus over beta that earns one extra ply of null-move reduction.
    pub null_eval_margin: Score,
    /// From this depth a null-move cutoff is verified by a reduced search.
    pub null_verify_depth: Depth,
    /// Below this depth a fail-low caused by the previous move returns early.
    pub null_threat_depth: Depth,

    // ProbCut
    pub probcut_depth: Depth,
    pub probcut_margin: Score,
    pub probcut_reduction: Depth,

    // Internal iterative deepening
    pub iid_pv_depth: Depth,
    pub iid_non_pv_depth: Depth,
    pub iid_margin: Score,

    // Singular extension
    pub singular_depth: Depth,
    pub singular_tt_depth_margin: Depth,
    pub singular_margin_per_ply: Score,

    // Futility and move-count pruning
    pub move_count_depth: Depth,
    pub move_count_base: f64,
    pub move_count_factor: f64,
    pub move_count_exponent: f64,
    pub futility_depth: Depth,
    pub futility_scale: Score,
    pub futility_move_penalty: Score,
    pub futility_base: Score,
    pub gains_weight: Score,

    // Late move reductions
    pub lmr_min_depth: Depth,
    pub lmr_pv_divisor: f64,
    pub lmr_non_pv_base: f64,
    pub lmr_non_pv_divisor: f64,

    // Quiescence
    pub qsearch_futility_margin: Score,
    /// From this quiescence depth on, only recaptures are searched.
    pub qsearch_recapture_depth: Depth,

    // Iterative deepening
    pub aspiration_min_depth: Depth,
    pub aspiration_delta: Score,
    pub aspiration_second_delta: Score,
    pub easy_move_depth: Depth,
    pub easy_move_margin: Score,
    pub easy_move_reduction: Depth,
    /// Percentage of the optimum time after which a lone best move may stop early.
    pub easy_move_time_percent: u32,
    /// Percentage of the available time after which no new iteration starts.
    pub iteration_time_percent: u32,
    /// Plies of history inspected for repetitions.
    pub repetition_window: usize,
    /// Minimum interval between progress reports during re-searches.
    pub info_interval_ms: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            razor_depth: 4,
            razor_margin_base: 512,
            razor_margin_per_ply: 32,

            static_null_depth: 4,

            null_min_depth: 2,
            null_base_reduction: 3,
            null_depth_divisor: 4,
            null_eval_margin: 90,
            null_verify_depth: 6,
            null_threat_depth: 5,

            probcut_depth: 5,
            probcut_margin: 200,
            probcut_reduction: 4,

            iid_pv_depth: 5,
            iid_non_pv_depth: 8,
            iid_margin: 256,

            singular_depth: 8,
            singular_tt_depth_margin: 3,
            singular_margin_per_ply: 2,

            move_count_depth: 8,
            move_count_base: 3.001,
            move_count_factor: 1.045,
            move_count_exponent: 1.8,
            futility_depth: 7,
            futility_scale: 112,
            futility_move_penalty: 8,
            futility_base: 45,
            gains_weight: 2,

            lmr_min_depth: 3,
            lmr_pv_divisor: 3.0,
            lmr_non_pv_base: 0.33,
            lmr_non_pv_divisor: 2.25,

            qsearch_futility_margin: 128,
            qsearch_recapture_depth: -5,

            aspiration_min_depth: 5,
            aspiration_delta: 16,
            aspiration_second_delta: 64,
            easy_move_depth: 12,
            easy_move_margin: 360,
            easy_move_reduction: 3,
            easy_move_time_percent: 40,
            iteration_time_percent: 62,
            repetition_window: 16,
            info_interval_ms: 200,
        }
    }
}

/// Deepest value accepted for a depth threshold or reduction.
const MAX_PARAM_DEPTH: Depth = MAX_PLY as Depth;

impl SearchParams {
    /// Reject parameters that would divide by zero, open an empty aspiration
    /// window or reduce a search to no plies at all.
    pub fn validate(&self) -> Result<(), EngineError> {
        let depths = [
            ("search.razor_depth", self.razor_depth),
            ("search.static_null_depth", self.static_null_depth),
            ("search.null_verify_depth", self.null_verify_depth),
            ("search.null_threat_depth", self.null_threat_depth),
            ("search.singular_tt_depth_margin", self.singular_tt_depth_margin),
            ("search.move_count_depth", self.move_count_depth),
            ("search.futility_depth", self.futility_depth),
            ("search.easy_move_depth", self.easy_move_depth),
            ("search.easy_move_reduction", self.easy_move_reduction),
        ];
        for (name, value) in depths {
            check_range(name, value, 0, MAX_PARAM_DEPTH)?;
        }

        let margins = [
            ("search.razor_margin_base", self.razor_margin_base),
            ("search.razor_margin_per_ply", self.razor_margin_per_ply),
            ("search.null_eval_margin", self.null_eval_margin),
            ("search.probcut_margin", self.probcut_margin),
            ("search.iid_margin", self.iid_margin),
            ("search.singular_margin_per_ply", self.singular_margin_per_ply),
            ("search.futility_scale", self.futility_scale),
            ("search.futility_move_penalty", self.futility_move_penalty),
            ("search.futility_base", self.futility_base),
            ("search.qsearch_futility_margin", self.qsearch_futility_margin),
            ("search.easy_move_margin", self.easy_move_margin),
        ];
        for (name, value) in margins {
            check_range(name, value, 0, SCORE_MAX_EVAL)?;
        }
        check_range("search.gains_weight", self.gains_weight, 0, 16)?;

        check_range("search.null_min_depth", self.null_min_depth, 1, MAX_PARAM_DEPTH)?;
        check_range("search.null_base_reduction", self.null_base_reduction, 1, MAX_PARAM_DEPTH)?;
        check_range("search.null_depth_divisor", self.null_depth_divisor, 1, MAX_PARAM_DEPTH)?;
        check_range("search.probcut_depth", self.probcut_depth, 2, MAX_PARAM_DEPTH)?;
        check_range("search.probcut_reduction", self.probcut_reduction, 1, self.probcut_depth - 1)?;
        check_range("search.iid_pv_depth", self.iid_pv_depth, 3, MAX_PARAM_DEPTH)?;
        check_range("search.iid_non_pv_depth", self.iid_non_pv_depth, 2, MAX_PARAM_DEPTH)?;
        check_range("search.singular_depth", self.singular_depth, 2, MAX_PARAM_DEPTH)?;
        check_range("search.lmr_min_depth", self.lmr_min_depth, 1, MAX_PARAM_DEPTH)?;
        check_range("search.aspiration_min_depth", self.aspiration_min_depth, 1, MAX_PARAM_DEPTH)?;
        check_range("search.aspiration_delta", self.aspiration_delta, 1, SCORE_MAX_EVAL)?;
        check_range("search.aspiration_second_delta", self.aspiration_second_delta, 1, SCORE_MAX_EVAL)?;
        check_range("search.qsearch_recapture_depth", self.qsearch_recapture_depth, -MAX_PARAM_DEPTH, -1)?;

        check_range("search.move_count_base", self.move_count_base, 0.0, 1000.0)?;
        check_range("search.move_count_factor", self.move_count_factor, 0.0, 1000.0)?;
        check_range("search.move_count_exponent", self.move_count_exponent, 0.0, 10.0)?;
        check_range("search.lmr_pv_divisor", self.lmr_pv_divisor, 0.01, 1000.0)?;
        check_range("search.lmr_non_pv_base", self.lmr_non_pv_base, -100.0, 100.0)?;
        check_range("search.lmr_non_pv_divisor", self.lmr_non_pv_divisor, 0.01, 1000.0)?;

        check_range("search.easy_move_time_percent", self.easy_move_time_percent, 0, 100)?;
        check_range("search.iteration_time_percent", self.iteration_time_percent, 0, 100)?;
        check_range("search.repetition_window", self.repetition_window, 0, 4 * MAX_PLY)?;
        Ok(())
    }

    /// Razoring margin at `depth`.
    #[inline]
    pub fn razor_margin(&self, depth: Depth) -> Score {
        self.razor_margin_base + self.razor_margin_per_ply * depth
    }
}
