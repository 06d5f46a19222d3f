//! Clustered lockless transposition table with XOR torn-write detection.
//!
//! Four 16-byte slots share one 64-byte cluster (one cache line). Each slot is
//! two `AtomicU64` words written and read with `Relaxed` ordering; a lookup
//! that sees half of one store and half of another fails the check word and is
//! treated as a miss.
//!
//! ## Bit layout
//!
//! ```text
//! data (AtomicU64):
//!   bits  0-23: move          (24 bits)
//!   bits 24-31: depth         (depth - DEPTH_NONE, u8)
//!   bits 32-47: score         (i16, ply-adjusted for mates)
//!   bits 48-63: static eval   (i16)
//!
//! check (AtomicU64):
//!   bits  0-1:  bound
//!   bit   2:    occupied
//!   bits  8-15: generation
//!   bits 32-63: key32 ^ fold(data) ^ meta
//! ```
//!
//! `key32` is the upper half of the position key; the lower bits select the
//! cluster. `fold(data)` XORs the two halves of the data word, so any
//! mismatch between the words of one slot changes the expected check.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use sente_core::{
    DEPTH_NONE, Depth, Move, SCORE_MATE_IN_MAX_PLY, SCORE_MATED_IN_MAX_PLY, SCORE_NONE, Score,
};

use crate::error::EngineError;

// ── Compile-time assertion: TT must be Send + Sync for Lazy SMP ─────────────
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<TranspositionTable>();
    }
    let _ = check;
};

/// Slots per cluster.
pub const CLUSTER_SIZE: usize = 4;

/// Smallest table, in clusters.
const MIN_CLUSTERS: usize = 1024;

/// Clusters sampled by [`TranspositionTable::hashfull`].
const HASHFULL_SAMPLE: usize = 1000;

const BOUND_MASK: u64 = 0x03;
const OCCUPIED: u64 = 0x04;
const GENERATION_SHIFT: u32 = 8;
const META_MASK: u64 = 0xFFFF;

/// Kind of score stored in an entry. `Exact` includes both bound bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    /// No score information (eval-only entry).
    None = 0,
    /// The true score is at most the stored one (fail-low).
    Upper = 1,
    /// The true score is at least the stored one (fail-high).
    Lower = 2,
    Exact = 3,
}

impl Bound {
    const fn from_bits(bits: u64) -> Bound {
        match bits & BOUND_MASK {
            1 => Bound::Upper,
            2 => Bound::Lower,
            3 => Bound::Exact,
            _ => Bound::None,
        }
    }

    /// Return `true` if the two bounds share a bit (`Exact` includes both).
    #[inline]
    pub const fn includes(self, other: Bound) -> bool {
        (self as u8) & (other as u8) != 0
    }
}

/// Convert a search score (plies from root) into table form (plies from this node).
#[inline]
pub fn score_to_tt(score: Score, ply: usize) -> Score {
    if score == SCORE_NONE {
        score
    } else if score >= SCORE_MATE_IN_MAX_PLY {
        score + ply as Score
    } else if score <= SCORE_MATED_IN_MAX_PLY {
        score - ply as Score
    } else {
        score
    }
}

/// Inverse of [`score_to_tt`].
#[inline]
pub fn score_from_tt(score: Score, ply: usize) -> Score {
    if score == SCORE_NONE {
        score
    } else if score >= SCORE_MATE_IN_MAX_PLY {
        score - ply as Score
    } else if score <= SCORE_MATED_IN_MAX_PLY {
        score + ply as Score
    } else {
        score
    }
}

/// A decoded, verified entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtEntry {
    pub mv: Move,
    /// Search score, already converted back to plies from the root.
    pub score: Score,
    pub eval: Score,
    pub depth: Depth,
    pub bound: Bound,
    pub generation: u8,
}

// ── Internal slot type ───────────────────────────────────────────────────────

#[inline]
const fn fold(data: u64) -> u32 {
    (data ^ (data >> 32)) as u32
}

#[inline]
const fn key32(key: u64) -> u32 {
    (key >> 32) as u32
}

fn pack_data(mv: Move, depth: Depth, score: Score, eval: Score) -> u64 {
    const SCORE_RANGE: std::ops::RangeInclusive<Score> = i16::MIN as Score..=i16::MAX as Score;
    let stored_depth = depth - DEPTH_NONE;
    if !(0..=u8::MAX as Depth).contains(&stored_depth) || !SCORE_RANGE.contains(&score) || !SCORE_RANGE.contains(&eval) {
        tracing::warn!(depth, score, eval, "transposition entry out of range, clamped");
    }
    let depth = stored_depth.clamp(0, u8::MAX as Depth) as u64;
    let score = score.clamp(i16::MIN as Score, i16::MAX as Score) as i16 as u16 as u64;
    let eval = eval.clamp(i16::MIN as Score, i16::MAX as Score) as i16 as u16 as u64;
    mv.raw() as u64 | (depth << 24) | (score << 32) | (eval << 48)
}

const fn pack_meta(bound: Bound, generation: u8) -> u64 {
    bound as u64 | OCCUPIED | ((generation as u64) << GENERATION_SHIFT)
}

fn pack_check(key: u64, data: u64, meta: u64) -> u64 {
    let check = key32(key) ^ fold(data) ^ meta as u32;
    ((check as u64) << 32) | meta
}

fn decode(data: u64, meta: u64) -> TtEntry {
    TtEntry {
        mv: Move::from_raw(data as u32),
        score: ((data >> 32) as u16 as i16) as Score,
        eval: ((data >> 48) as u16 as i16) as Score,
        depth: ((data >> 24) & 0xFF) as Depth + DEPTH_NONE,
        bound: Bound::from_bits(meta),
        generation: ((meta >> GENERATION_SHIFT) & 0xFF) as u8,
    }
}

/// Two 64-bit atomic words: one logical slot.
#[derive(Default)]
struct Slot {
    check: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    /// Load both words. `None` when the slot has never been written.
    fn load_raw(&self) -> Option<(u64, u64)> {
        let check = self.check.load(Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        (check & OCCUPIED != 0).then_some((check, data))
    }

    /// Return the entry if it is intact and belongs to `key`.
    fn load(&self, key: u64) -> Option<TtEntry> {
        let (check, data) = self.load_raw()?;
        let meta = check & META_MASK;
        if (check >> 32) as u32 != key32(key) ^ fold(data) ^ meta as u32 {
            return None;
        }
        Some(decode(data, meta))
    }

    fn store(&self, key: u64, data: u64, meta: u64) {
        self.data.store(data, Ordering::Relaxed);
        self.check.store(pack_check(key, data, meta), Ordering::Relaxed);
    }

    fn clear(&self) {
        self.check.store(0, Ordering::Relaxed);
        self.data.store(0, Ordering::Relaxed);
    }
}

#[derive(Default)]
#[repr(align(64))]
struct Cluster {
    slots: [Slot; CLUSTER_SIZE],
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Lockless transposition table shared by all search threads.
///
/// Everything but [`resize`](Self::resize) takes `&self`.
pub struct TranspositionTable {
    clusters: Box<[Cluster]>,
    /// `clusters.len() - 1` (power-of-two allocation).
    mask: u64,
    generation: AtomicU8,
}

fn cluster_count(megabytes: usize) -> usize {
    let bytes = megabytes.saturating_mul(1 << 20);
    let count = (bytes / std::mem::size_of::<Cluster>()).max(MIN_CLUSTERS);
    1 << count.ilog2()
}

fn allocate(megabytes: usize) -> Result<Box<[Cluster]>, EngineError> {
    let count = cluster_count(megabytes);
    let mut clusters: Vec<Cluster> = Vec::new();
    clusters
        .try_reserve_exact(count)
        .map_err(|_| EngineError::HashAllocation { megabytes })?;
    clusters.resize_with(count, Cluster::default);
    Ok(clusters.into_boxed_slice())
}

impl TranspositionTable {
    /// Allocate a table of at most `megabytes` MB (rounded down to a power of
    /// two clusters, never below 64 KB).
    pub fn new(megabytes: usize) -> Result<Self, EngineError> {
        let clusters = allocate(megabytes)?;
        tracing::debug!(megabytes, clusters = clusters.len(), "allocated transposition table");
        Ok(Self {
            mask: (clusters.len() - 1) as u64,
            clusters,
            generation: AtomicU8::new(0),
        })
    }

    /// Reallocate to `megabytes` MB. The table is empty afterwards.
    ///
    /// On allocation failure the table shrinks to its minimum size and the
    /// error is returned.
    pub fn resize(&mut self, megabytes: usize) -> Result<(), EngineError> {
        // Release the old allocation first so peak memory stays at one table.
        self.clusters = Vec::new().into_boxed_slice();
        self.generation.store(0, Ordering::Relaxed);
        match allocate(megabytes) {
            Ok(clusters) => {
                self.install(clusters);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(megabytes, "hash allocation failed, falling back to minimum size");
                self.install(allocate(0)?);
                Err(err)
            }
        }
    }

    fn install(&mut self, clusters: Box<[Cluster]>) {
        self.mask = (clusters.len() - 1) as u64;
        self.clusters = clusters;
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.clusters.len() * CLUSTER_SIZE
    }

    /// Zero every slot and reset the generation.
    pub fn clear(&self) {
        for slot in self.clusters.iter().flat_map(|c| c.slots.iter()) {
            slot.clear();
        }
        self.generation.store(0, Ordering::Relaxed);
    }

    /// Advance the generation. Called once per search.
    pub fn new_search(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    #[inline]
    fn cluster(&self, key: u64) -> &Cluster {
        &self.clusters[(key & self.mask) as usize]
    }

    /// Look up `key`; scores come back relative to the root at `ply`.
    ///
    /// Torn or colliding slots are misses.
    pub fn probe(&self, key: u64, ply: usize) -> Option<TtEntry> {
        self.cluster(key)
            .slots
            .iter()
            .find_map(|slot| slot.load(key))
            .map(|mut entry| {
                entry.score = score_from_tt(entry.score, ply);
                entry
            })
    }

    /// Store a search result for `key`.
    ///
    /// An empty slot or the slot already holding `key` is overwritten (keeping
    /// its move when `mv` is `NONE`). Otherwise the victim is chosen by
    /// preferring stale generations, then shallower depths; current or exact
    /// entries are protected.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        key: u64,
        score: Score,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Score,
        ply: usize,
    ) {
        let generation = self.generation();
        let cluster = self.cluster(key);
        let score = score_to_tt(score, ply);

        let mut victim = 0;
        let mut victim_entry: Option<TtEntry> = None;

        for (i, slot) in cluster.slots.iter().enumerate() {
            let Some((check, data)) = slot.load_raw() else {
                slot.store(key, pack_data(mv, depth, score, eval), pack_meta(bound, generation));
                return;
            };

            if let Some(existing) = slot.load(key) {
                let mv = if mv.is_none() { existing.mv } else { mv };
                slot.store(key, pack_data(mv, depth, score, eval), pack_meta(bound, generation));
                return;
            }

            let entry = decode(data, check & META_MASK);
            match victim_entry {
                None => victim_entry = Some(entry),
                Some(current) => {
                    let mut c = 0;
                    if current.generation == generation {
                        c += 2;
                    }
                    if entry.generation == generation || entry.bound == Bound::Exact {
                        c -= 2;
                    }
                    if entry.depth < current.depth {
                        c += 1;
                    }
                    if c > 0 {
                        victim = i;
                        victim_entry = Some(entry);
                    }
                }
            }
        }

        cluster.slots[victim].store(key, pack_data(mv, depth, score, eval), pack_meta(bound, generation));
    }

    /// Per-mille of sampled slots written during the current search.
    pub fn hashfull(&self) -> usize {
        let generation = self.generation();
        let sample = HASHFULL_SAMPLE.min(self.clusters.len());
        let used = self.clusters[..sample]
            .iter()
            .flat_map(|c| c.slots.iter())
            .filter_map(Slot::load_raw)
            .filter(|(check, _)| ((check >> GENERATION_SHIFT) & 0xFF) as u8 == generation)
            .count();
        used * 1000 / (sample * CLUSTER_SIZE)
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("clusters", &self.clusters.len())
            .field("generation", &self.generation())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sente_core::{PieceKind, SCORE_MATE, Square, mate_in, mated_in};

    fn mv(from: &str, to: &str) -> Move {
        Move::new(
            Square::from_usi(from).unwrap(),
            Square::from_usi(to).unwrap(),
            PieceKind::Silver,
            None,
            false,
        )
    }

    /// Keys that all map to cluster `index`.
    fn colliding_key(high: u32, index: u64) -> u64 {
        ((high as u64) << 32) | index
    }

    #[test]
    fn cluster_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<Cluster>(), 64);
        assert_eq!(std::mem::align_of::<Cluster>(), 64);
    }

    #[test]
    fn size_rounds_down_to_power_of_two() {
        assert_eq!(cluster_count(1), 16_384);
        assert_eq!(cluster_count(3), 32_768);
        assert_eq!(cluster_count(0), MIN_CLUSTERS);
        let tt = TranspositionTable::new(1).unwrap();
        assert_eq!(tt.capacity(), 16_384 * CLUSTER_SIZE);
    }

    #[test]
    fn stored_entry_is_found() {
        let tt = TranspositionTable::new(1).unwrap();
        let key: u64 = 0xDEAD_BEEF_1234_5678;
        let m = mv("7g", "7f");

        tt.store(key, 100, Bound::Exact, 5, m, 50, 0);

        let entry = tt.probe(key, 0).expect("should find stored entry");
        assert_eq!(entry.mv, m);
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.bound, Bound::Exact);
        assert_eq!(entry.score, 100);
        assert_eq!(entry.eval, 50);
    }

    #[test]
    fn eval_only_entry_keeps_sentinels() {
        let tt = TranspositionTable::new(1).unwrap();
        let key = 0x0123_4567_89AB_CDEF;
        tt.store(key, SCORE_NONE, Bound::None, DEPTH_NONE, Move::NONE, -42, 3);
        let entry = tt.probe(key, 3).unwrap();
        assert_eq!(entry.score, SCORE_NONE);
        assert_eq!(entry.bound, Bound::None);
        assert_eq!(entry.depth, DEPTH_NONE);
        assert_eq!(entry.eval, -42);
        assert!(entry.mv.is_none());
    }

    #[test]
    fn negative_depths_survive() {
        let tt = TranspositionTable::new(1).unwrap();
        let key = 0x7777_0000_0000_0042;
        tt.store(key, -30, Bound::Upper, -1, Move::NONE, -30, 0);
        assert_eq!(tt.probe(key, 0).unwrap().depth, -1);
    }

    #[test]
    fn probe_miss_returns_none() {
        let tt = TranspositionTable::new(1).unwrap();
        assert!(tt.probe(0x1234_5678_9ABC_DEF0, 0).is_none());
    }

    #[test]
    fn key_collision_in_cluster_is_a_miss() {
        let tt = TranspositionTable::new(1).unwrap();
        tt.store(colliding_key(1, 9), 10, Bound::Exact, 4, mv("2g", "2f"), 0, 0);
        assert!(tt.probe(colliding_key(2, 9), 0).is_none());
        assert!(tt.probe(colliding_key(1, 9), 0).is_some());
    }

    #[test]
    fn mate_scores_translate_by_ply() {
        let ply = 5;
        for score in [mate_in(7), mated_in(9), mate_in(ply)] {
            assert_eq!(score_from_tt(score_to_tt(score, ply), ply), score);
        }
        // Mate distance is stored relative to the node.
        assert_eq!(score_to_tt(mate_in(7), 5), mate_in(2));
        assert!(score_to_tt(mate_in(ply), ply) <= SCORE_MATE);
        assert_eq!(score_to_tt(150, 10), 150);
        assert_eq!(score_to_tt(SCORE_NONE, 10), SCORE_NONE);
    }

    #[test]
    fn mate_entry_read_at_another_ply() {
        let tt = TranspositionTable::new(1).unwrap();
        let key = 0xABCD_0000_1111_2222;
        // Mate in 3 from a node at ply 4 is mate_in(7) from the root.
        tt.store(key, mate_in(7), Bound::Exact, 6, mv("5e", "5d"), 0, 4);
        // Reached again at ply 2, the same mate is mate_in(5).
        assert_eq!(tt.probe(key, 2).unwrap().score, mate_in(5));
    }

    #[test]
    fn same_key_overwrites_and_keeps_move() {
        let tt = TranspositionTable::new(1).unwrap();
        let key = 0x1111_2222_3333_4444;
        let m = mv("3c", "3d");
        tt.store(key, 20, Bound::Lower, 6, m, 5, 0);
        tt.store(key, -15, Bound::Upper, 2, Move::NONE, 5, 0);

        let entry = tt.probe(key, 0).unwrap();
        assert_eq!(entry.mv, m, "move must survive a move-less update");
        assert_eq!(entry.depth, 2);
        assert_eq!(entry.bound, Bound::Upper);
        assert_eq!(entry.score, -15);
    }

    #[test]
    fn full_cluster_replaces_shallowest_current_entry() {
        let tt = TranspositionTable::new(1).unwrap();
        let depths = [8, 3, 6, 9];
        for (i, depth) in depths.iter().enumerate() {
            tt.store(colliding_key(i as u32 + 1, 5), 0, Bound::Lower, *depth, mv("1g", "1f"), 0, 0);
        }
        tt.store(colliding_key(99, 5), 0, Bound::Lower, 1, mv("9g", "9f"), 0, 0);

        assert!(tt.probe(colliding_key(99, 5), 0).is_some());
        assert!(tt.probe(colliding_key(2, 5), 0).is_none(), "depth-3 entry should be evicted");
        for high in [1, 3, 4] {
            assert!(tt.probe(colliding_key(high, 5), 0).is_some());
        }
    }

    #[test]
    fn stale_generation_replaced_before_shallow_current() {
        let tt = TranspositionTable::new(1).unwrap();
        tt.store(colliding_key(3, 7), 0, Bound::Lower, 20, mv("1g", "1f"), 0, 0);
        tt.new_search();
        tt.store(colliding_key(1, 7), 0, Bound::Lower, 10, mv("1g", "1f"), 0, 0);
        tt.store(colliding_key(2, 7), 0, Bound::Lower, 12, mv("1g", "1f"), 0, 0);
        tt.store(colliding_key(4, 7), 0, Bound::Lower, 1, mv("1g", "1f"), 0, 0);
        // Slot order: 3 (stale, deep), 1, 2, 4 (current, shallow).
        tt.store(colliding_key(5, 7), 0, Bound::Lower, 4, mv("2g", "2f"), 0, 0);

        assert!(tt.probe(colliding_key(5, 7), 0).is_some());
        assert!(tt.probe(colliding_key(3, 7), 0).is_none(), "stale entry should go first");
        assert!(tt.probe(colliding_key(4, 7), 0).is_some());
    }

    #[test]
    fn clear_removes_all_entries() {
        let tt = TranspositionTable::new(1).unwrap();
        let keys: Vec<u64> = (0..500u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15)).collect();
        for &key in &keys {
            tt.store(key, 1, Bound::Exact, 3, mv("7g", "7f"), 1, 0);
        }
        tt.new_search();
        tt.clear();
        assert_eq!(tt.generation(), 0);
        assert!(keys.iter().all(|&key| tt.probe(key, 0).is_none()));
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn resize_empties_table() {
        let mut tt = TranspositionTable::new(1).unwrap();
        let key = 0x5555_6666_7777_8888;
        tt.store(key, 1, Bound::Exact, 3, mv("7g", "7f"), 1, 0);
        tt.resize(2).unwrap();
        assert_eq!(tt.capacity(), 32_768 * CLUSTER_SIZE);
        assert!(tt.probe(key, 0).is_none());
    }

    #[test]
    fn xor_integrity_detects_torn_write() {
        let tt = TranspositionTable::new(1).unwrap();
        let key: u64 = 0xDEAD_BEEF_1234_5678;
        tt.store(key, 100, Bound::Exact, 5, mv("7g", "7f"), 50, 0);
        assert!(tt.probe(key, 0).is_some(), "entry should be found before corruption");

        // Replace the data word as if another thread's store landed half-way.
        let slot = &tt.cluster(key).slots[0];
        let data = slot.data.load(Ordering::Relaxed);
        slot.data.store(data ^ 0x0000_0001_0000_0000, Ordering::Relaxed);

        assert!(tt.probe(key, 0).is_none(), "probe should miss after a torn write");
    }

    #[test]
    fn hashfull_counts_current_generation() {
        let tt = TranspositionTable::new(1).unwrap();
        assert_eq!(tt.hashfull(), 0);
        // Fill every slot of the sampled clusters.
        for index in 0..HASHFULL_SAMPLE as u64 {
            for high in 0..CLUSTER_SIZE as u32 {
                tt.store(colliding_key(high + 1, index), 0, Bound::Exact, 1, Move::NONE, 0, 0);
            }
        }
        assert_eq!(tt.hashfull(), 1000);
        tt.new_search();
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn bound_inclusion() {
        assert!(Bound::Exact.includes(Bound::Lower));
        assert!(Bound::Exact.includes(Bound::Upper));
        assert!(!Bound::Lower.includes(Bound::Upper));
        assert!(!Bound::None.includes(Bound::Exact));
    }

    #[test]
    fn concurrent_stress_no_panics() {
        use std::thread;

        let tt = TranspositionTable::new(4).unwrap();
        let m = mv("7g", "7f");

        thread::scope(|s| {
            for t in 0..8u64 {
                let tt = &tt;
                s.spawn(move || {
                    for i in 0u64..10_000 {
                        // Mix of different keys so threads collide on some clusters
                        let key = (t.wrapping_mul(6364136223846793005))
                            .wrapping_add(i.wrapping_mul(2862933555777941757))
                            ^ 0xDEAD_BEEF_CAFE_F00D;
                        tt.store(key, 100, Bound::Exact, 5, m, 50, 0);
                        if let Some(entry) = tt.probe(key, 0) {
                            assert!(entry.mv == m || entry.mv.is_none());
                        }
                    }
                });
            }
        });
    }
}
