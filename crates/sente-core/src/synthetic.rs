//! A deterministic, hash-driven game tree implementing [`Position`].
//!
//! Every node is a pure function of its 64-bit key: the key seeds the move
//! list, the check flag, evaluation noise and exchange outcomes. Material is
//! tracked across captures and promotions so evaluations stay coherent along
//! a line. The tree is irregular enough to exercise pruning and move
//! ordering, and it can repeat positions: when the last move was quiet, the
//! first generated move "retreats" to the position two plies back.
//!
//! Used by benchmarks and tests of the search; it knows nothing about real
//! shogi rules.

use crate::color::Color;
use crate::move_list::MoveList;
use crate::moves::Move;
use crate::piece_kind::PieceKind;
use crate::position::{Position, Repetition};
use crate::score::Score;
use crate::square::Square;

const MOVE_SALT: u64 = 0xA076_1D64_78BD_642F;
const CHECK_SALT: u64 = 0xE703_7ED1_A0B4_28DB;
const EVAL_SALT: u64 = 0x8EBC_6AF0_9C88_C6E3;
const SEE_SALT: u64 = 0x5899_65CC_7537_4CC3;
const NULL_SALT: u64 = 0x1D8E_4E27_C47D_124F;

/// Largest magnitude of the per-node evaluation noise.
const EVAL_NOISE: u64 = 64;

/// SplitMix64 finalizer.
const fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Xorshift64 stream seeded from a node key.
struct Rng(u64);

impl Rng {
    const fn new(seed: u64) -> Rng {
        Rng(mix(seed) | 1)
    }

    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

/// State restored by [`SyntheticPosition::unmake_move`].
#[derive(Debug, Clone, Copy)]
pub struct SyntheticUndo {
    key: u64,
    material: Score,
}

/// A synthetic position. See the module docs.
#[derive(Debug, Clone)]
pub struct SyntheticPosition {
    key: u64,
    side: Color,
    ply: u32,
    /// Material balance from Black's point of view.
    material: Score,
    /// `(key, material)` of every position before the current one.
    history: Vec<(u64, Score)>,
}

impl SyntheticPosition {
    /// Create the root of the tree identified by `seed`.
    pub fn new(seed: u64) -> SyntheticPosition {
        SyntheticPosition {
            key: mix(seed),
            side: Color::Black,
            ply: 0,
            material: 0,
            history: Vec::with_capacity(256),
        }
    }

    /// Pretend `ply` moves were played before this position.
    pub fn with_game_ply(mut self, ply: u32) -> SyntheticPosition {
        self.ply = ply;
        if ply % 2 == 1 {
            self.side = Color::White;
        }
        self
    }

    /// Material balance from the side to move's point of view.
    pub fn material(&self) -> Score {
        match self.side {
            Color::Black => self.material,
            Color::White => -self.material,
        }
    }

    fn random_move(r: u64) -> Move {
        let to = Square::from_index_unchecked((r % Square::COUNT as u64) as u8);
        if (r >> 16) % 10 == 0 {
            let kind = PieceKind::HAND[((r >> 20) % PieceKind::HAND.len() as u64) as usize];
            return Move::new_drop(kind, to);
        }

        let mut from = ((r >> 24) % Square::COUNT as u64) as u8;
        if from as usize == to.index() {
            from = (from + 1) % Square::COUNT as u8;
        }
        let kind = PieceKind::ALL[((r >> 8) % PieceKind::COUNT as u64) as usize];
        let captured = if (r >> 32) % 4 == 0 {
            match PieceKind::ALL[((r >> 36) % PieceKind::COUNT as u64) as usize] {
                PieceKind::King => Some(PieceKind::Pawn),
                other => Some(other),
            }
        } else {
            None
        };
        let promote = kind.can_promote() && (r >> 44) % 8 == 0;
        Move::new(Square::from_index_unchecked(from), to, kind, captured, promote)
    }

    fn generate(&self, moves: &mut MoveList) {
        let mut rng = Rng::new(self.key ^ MOVE_SALT);
        let shape = rng.next();
        let count: u64 = if self.in_check() {
            if shape % 4 == 0 { 0 } else { 1 + (shape >> 8) % 6 }
        } else if shape % 97 == 0 {
            0
        } else {
            8 + (shape >> 8) % 24
        };
        let count = count as usize;

        let mut attempts = 0;
        while moves.len() < count && attempts < count * 4 {
            attempts += 1;
            let mv = Self::random_move(rng.next());
            if !moves.contains(mv) {
                moves.push(mv);
            }
        }
    }

    /// The move that returns to the position two plies back, if any.
    fn retreat_move(&self) -> Option<Move> {
        let &(_, material) = self.history.last()?;
        if material != self.material {
            return None;
        }
        let mut moves = MoveList::new();
        self.generate(&mut moves);
        let first = *moves.iter().next()?;
        let quiet = !first.is_capture() && !first.is_drop() && !first.is_promotion();
        quiet.then_some(first)
    }

    fn child_key(&self, mv: Move) -> u64 {
        if let Some(&(key, _)) = self.history.last()
            && self.retreat_move() == Some(mv)
        {
            return key;
        }
        mix(self.key ^ (mv.raw() as u64).wrapping_mul(MOVE_SALT))
    }

    fn key_in_check(key: u64) -> bool {
        mix(key ^ CHECK_SALT) % 10 == 0
    }
}

impl Position for SyntheticPosition {
    type Undo = SyntheticUndo;

    fn side_to_move(&self) -> Color {
        self.side
    }

    fn key(&self) -> u64 {
        self.key
    }

    fn game_ply(&self) -> u32 {
        self.ply
    }

    fn legal_moves(&self, moves: &mut MoveList) {
        self.generate(moves);
    }

    fn make_move(&mut self, mv: Move) -> SyntheticUndo {
        let undo = SyntheticUndo {
            key: self.key,
            material: self.material,
        };
        let child = self.child_key(mv);

        let mut gain = mv.captured().map_or(0, PieceKind::capture_value);
        if mv.is_promotion() {
            gain += mv.piece_kind().promotion_value();
        }

        self.history.push((self.key, self.material));
        self.material += match self.side {
            Color::Black => gain,
            Color::White => -gain,
        };
        self.key = child;
        self.side = !self.side;
        self.ply += 1;
        undo
    }

    fn unmake_move(&mut self, _mv: Move, undo: SyntheticUndo) {
        self.history.pop();
        self.key = undo.key;
        self.material = undo.material;
        self.side = !self.side;
        self.ply -= 1;
    }

    fn make_null_move(&mut self) -> SyntheticUndo {
        let undo = SyntheticUndo {
            key: self.key,
            material: self.material,
        };
        self.history.push((self.key, self.material));
        self.key = mix(self.key ^ NULL_SALT);
        self.side = !self.side;
        self.ply += 1;
        undo
    }

    fn unmake_null_move(&mut self, undo: SyntheticUndo) {
        self.unmake_move(Move::NULL, undo);
    }

    fn in_check(&self) -> bool {
        Self::key_in_check(self.key)
    }

    fn gives_check(&self, mv: Move) -> bool {
        Self::key_in_check(self.child_key(mv))
    }

    fn evaluate(&mut self) -> Score {
        let noise = (mix(self.key ^ EVAL_SALT) % (2 * EVAL_NOISE + 1)) as Score - EVAL_NOISE as Score;
        self.material() + noise
    }

    fn repetition(&self, max_back: usize) -> Repetition {
        let n = self.history.len();
        let mut back = 2;
        while back <= max_back.min(n) {
            if self.history[n - back].0 == self.key {
                return Repetition::Draw;
            }
            back += 2;
        }
        Repetition::None
    }

    fn see(&self, mv: Move) -> Score {
        let gain = mv.captured().map_or(0, PieceKind::capture_value);
        let defended = mix(self.key ^ SEE_SALT ^ mv.raw() as u64) % 3 == 0;
        if defended {
            gain - mv.piece_kind().capture_value()
        } else {
            gain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyntheticPosition;
    use crate::move_list::MoveList;
    use crate::position::{Position, Repetition};

    fn moves_of(pos: &SyntheticPosition) -> MoveList {
        let mut moves = MoveList::new();
        pos.legal_moves(&mut moves);
        moves
    }

    #[test]
    fn same_seed_same_tree() {
        let a = SyntheticPosition::new(7);
        let b = SyntheticPosition::new(7);
        assert_eq!(a.key(), b.key());
        assert_eq!(moves_of(&a).as_slice(), moves_of(&b).as_slice());
        assert_ne!(a.key(), SyntheticPosition::new(8).key());
    }

    #[test]
    fn generated_moves_are_distinct() {
        for seed in 0..32 {
            let pos = SyntheticPosition::new(seed);
            let moves = moves_of(&pos);
            for (i, a) in moves.iter().enumerate() {
                assert!(a.is_some());
                assert!(moves.iter().skip(i + 1).all(|b| b != a));
            }
        }
    }

    #[test]
    fn make_unmake_restores_state() {
        for seed in 0..16 {
            let mut pos = SyntheticPosition::new(seed);
            let key = pos.key();
            let material = pos.material();
            for &mv in moves_of(&pos.clone()).iter() {
                let undo = pos.make_move(mv);
                assert_eq!(pos.game_ply(), 1);
                pos.unmake_move(mv, undo);
                assert_eq!(pos.key(), key);
                assert_eq!(pos.material(), material);
                assert_eq!(pos.game_ply(), 0);
            }
        }
    }

    #[test]
    fn null_move_flips_side_and_restores() {
        let mut pos = SyntheticPosition::new(3);
        let key = pos.key();
        let side = pos.side_to_move();
        let undo = pos.make_null_move();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), !side);
        pos.unmake_null_move(undo);
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), side);
    }

    #[test]
    fn captures_change_material() {
        let (mut pos, capture) = (0..64)
            .find_map(|seed| {
                let p = SyntheticPosition::new(seed);
                let found = moves_of(&p).iter().find(|m| m.is_capture()).copied();
                found.map(|m| (p, m))
            })
            .expect("some root has a capture");
        let before = pos.material();
        pos.make_move(capture);
        // Material is side-relative; the mover's gain is the opponent's loss.
        assert!(pos.material() < before);
    }

    #[test]
    fn retreat_repeats_position() {
        let found = (0..256).any(|seed| {
            let mut pos = SyntheticPosition::new(seed);
            let root_moves = moves_of(&pos);
            root_moves.iter().any(|&first| {
                if first.is_capture() || first.is_promotion() {
                    return false;
                }
                let undo = pos.make_move(first);
                let mut repeated = false;
                if let Some(retreat) = pos.retreat_move() {
                    let undo2 = pos.make_move(retreat);
                    repeated = pos.repetition(16) == Repetition::Draw;
                    pos.unmake_move(retreat, undo2);
                }
                pos.unmake_move(first, undo);
                repeated
            })
        });
        assert!(found);
    }

    #[test]
    fn evaluation_is_bounded_by_noise_at_root() {
        for seed in 0..64 {
            let mut pos = SyntheticPosition::new(seed);
            assert!(pos.evaluate().abs() <= 64);
        }
    }
}
