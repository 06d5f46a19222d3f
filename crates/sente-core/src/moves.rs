//! Move representation, bit-packed into the low 24 bits of a `u32`.

use std::fmt;

use crate::piece_kind::PieceKind;
use crate::square::Square;

const TO_MASK: u32 = 0x0000_007F;
const FROM_MASK: u32 = 0x0000_3F80;
const PIECE_MASK: u32 = 0x0003_C000;
const CAPTURE_MASK: u32 = 0x003C_0000;
const PROMOTE_FLAG: u32 = 0x0040_0000;
const DROP_FLAG: u32 = 0x0080_0000;
const FROM_SHIFT: u32 = 7;
const PIECE_SHIFT: u32 = 14;
const CAPTURE_SHIFT: u32 = 18;

/// A move encoded in 24 bits.
///
/// ```text
/// bits  0-6:  destination square  (0-80)
/// bits  7-13: source square       (0-80, zero for drops)
/// bits 14-17: moving/dropped kind (PieceKind index)
/// bits 18-21: captured kind + 1   (0 = no capture)
/// bit  22:    promotion
/// bit  23:    drop
/// ```
///
/// Two sentinels are never legal: [`Move::NONE`] (no move, all bits clear)
/// and [`Move::NULL`] (a pass, source and destination both 127).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move(u32);

impl Move {
    /// Number of significant bits.
    pub const BITS: u32 = 24;

    /// Absence of a move.
    pub const NONE: Move = Move(0);

    /// The pass used by null-move pruning.
    pub const NULL: Move = Move(TO_MASK | FROM_MASK);

    /// Create a board move.
    pub const fn new(
        from: Square,
        to: Square,
        piece: PieceKind,
        captured: Option<PieceKind>,
        promote: bool,
    ) -> Move {
        let captured_bits = match captured {
            Some(kind) => (kind.index() as u32 + 1) << CAPTURE_SHIFT,
            None => 0,
        };
        let promote_bits = if promote { PROMOTE_FLAG } else { 0 };
        Move(
            to.index() as u32
                | ((from.index() as u32) << FROM_SHIFT)
                | ((piece.index() as u32) << PIECE_SHIFT)
                | captured_bits
                | promote_bits,
        )
    }

    /// Create a drop of `piece` from hand onto `to`.
    pub const fn new_drop(piece: PieceKind, to: Square) -> Move {
        Move(to.index() as u32 | ((piece.index() as u32) << PIECE_SHIFT) | DROP_FLAG)
    }

    /// Raw 24-bit encoding.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a move from [`raw`](Self::raw); bits above 24 are discarded.
    #[inline]
    pub const fn from_raw(raw: u32) -> Move {
        Move(raw & ((1 << Self::BITS) - 1))
    }

    /// Destination square. Meaningless for the sentinels.
    #[inline]
    pub const fn to(self) -> Square {
        Square::from_index_unchecked((self.0 & TO_MASK) as u8)
    }

    /// Source square, or `None` for drops.
    #[inline]
    pub const fn from(self) -> Option<Square> {
        if self.is_drop() {
            None
        } else {
            Some(Square::from_index_unchecked(((self.0 & FROM_MASK) >> FROM_SHIFT) as u8))
        }
    }

    /// Kind of the moving (or dropped) piece, before promotion.
    #[inline]
    pub const fn piece_kind(self) -> PieceKind {
        PieceKind::ALL[((self.0 & PIECE_MASK) >> PIECE_SHIFT) as usize % PieceKind::COUNT]
    }

    /// Kind of the captured piece, if any.
    #[inline]
    pub const fn captured(self) -> Option<PieceKind> {
        let bits = (self.0 & CAPTURE_MASK) >> CAPTURE_SHIFT;
        if bits == 0 {
            None
        } else {
            PieceKind::from_index(bits as usize - 1)
        }
    }

    #[inline]
    pub const fn is_capture(self) -> bool {
        self.0 & CAPTURE_MASK != 0
    }

    #[inline]
    pub const fn is_promotion(self) -> bool {
        self.0 & PROMOTE_FLAG != 0
    }

    #[inline]
    pub const fn is_drop(self) -> bool {
        self.0 & DROP_FLAG != 0
    }

    /// Captures and pawn promotions: the moves quiescence search expands and
    /// quiet-move heuristics leave alone.
    #[inline]
    pub const fn is_capture_or_pawn_promotion(self) -> bool {
        self.is_capture()
            || (self.is_promotion() && matches!(self.piece_kind(), PieceKind::Pawn))
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Return `true` for a real move (neither sentinel).
    #[inline]
    pub const fn is_some(self) -> bool {
        !self.is_none() && !self.is_null()
    }
}

impl Default for Move {
    fn default() -> Self {
        Move::NONE
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        if self.is_null() {
            return write!(f, "pass");
        }
        match self.from() {
            None => write!(f, "{}*{}", self.piece_kind().usi_char(), self.to()),
            Some(from) if self.is_promotion() => write!(f, "{}{}+", from, self.to()),
            Some(from) => write!(f, "{}{}", from, self.to()),
        }
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_some() {
            return write!(f, "Move({self})");
        }
        write!(f, "Move({} {}", self, self.piece_kind())?;
        if let Some(captured) = self.captured() {
            write!(f, " x{captured}")?;
        }
        write!(f, ")")
    }
}
