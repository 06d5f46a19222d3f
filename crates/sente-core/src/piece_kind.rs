//! Shogi piece kinds.

use std::fmt;

use crate::score::Score;

/// The kind of a piece, without color information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PieceKind {
    Pawn = 0,
    Lance = 1,
    Knight = 2,
    Silver = 3,
    Bishop = 4,
    Rook = 5,
    Gold = 6,
    King = 7,
    ProPawn = 8,
    ProLance = 9,
    ProKnight = 10,
    ProSilver = 11,
    Horse = 12,
    Dragon = 13,
}

/// Material values indexed by [`PieceKind::index`].
const VALUES: [Score; PieceKind::COUNT] = [
    90, 315, 405, 495, 855, 990, 540, 15_000, 540, 540, 540, 540, 945, 1_395,
];

impl PieceKind {
    /// Total number of piece kinds.
    pub const COUNT: usize = 14;

    /// All piece kinds in index order.
    pub const ALL: [PieceKind; 14] = [
        PieceKind::Pawn,
        PieceKind::Lance,
        PieceKind::Knight,
        PieceKind::Silver,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Gold,
        PieceKind::King,
        PieceKind::ProPawn,
        PieceKind::ProLance,
        PieceKind::ProKnight,
        PieceKind::ProSilver,
        PieceKind::Horse,
        PieceKind::Dragon,
    ];

    /// Kinds that may be dropped from hand.
    pub const HAND: [PieceKind; 7] = [
        PieceKind::Pawn,
        PieceKind::Lance,
        PieceKind::Knight,
        PieceKind::Silver,
        PieceKind::Gold,
        PieceKind::Bishop,
        PieceKind::Rook,
    ];

    /// Return the index (0..14).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Create a piece kind from its index.
    #[inline]
    pub const fn from_index(index: usize) -> Option<PieceKind> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Return `true` for kinds that have a promoted form.
    #[inline]
    pub const fn can_promote(self) -> bool {
        matches!(
            self,
            PieceKind::Pawn
                | PieceKind::Lance
                | PieceKind::Knight
                | PieceKind::Silver
                | PieceKind::Bishop
                | PieceKind::Rook
        )
    }

    /// Return `true` for promoted kinds.
    #[inline]
    pub const fn is_promoted(self) -> bool {
        (self as u8) >= PieceKind::ProPawn as u8
    }

    /// Return the promoted form, or `self` if the kind cannot promote.
    #[inline]
    pub const fn promote(self) -> PieceKind {
        match self {
            PieceKind::Pawn => PieceKind::ProPawn,
            PieceKind::Lance => PieceKind::ProLance,
            PieceKind::Knight => PieceKind::ProKnight,
            PieceKind::Silver => PieceKind::ProSilver,
            PieceKind::Bishop => PieceKind::Horse,
            PieceKind::Rook => PieceKind::Dragon,
            other => other,
        }
    }

    /// Return the unpromoted form (the kind that goes to hand when captured).
    #[inline]
    pub const fn unpromote(self) -> PieceKind {
        match self {
            PieceKind::ProPawn => PieceKind::Pawn,
            PieceKind::ProLance => PieceKind::Lance,
            PieceKind::ProKnight => PieceKind::Knight,
            PieceKind::ProSilver => PieceKind::Silver,
            PieceKind::Horse => PieceKind::Bishop,
            PieceKind::Dragon => PieceKind::Rook,
            other => other,
        }
    }

    /// Material value of a piece of this kind standing on the board.
    #[inline]
    pub const fn value(self) -> Score {
        VALUES[self as usize]
    }

    /// Swing gained by capturing this kind: it leaves the opponent's board and enters our hand.
    #[inline]
    pub const fn capture_value(self) -> Score {
        self.value() + self.unpromote().value()
    }

    /// Value gained by promoting this kind.
    #[inline]
    pub const fn promotion_value(self) -> Score {
        self.promote().value() - self.value()
    }

    /// Return the USI letter (uppercase, without the `+` prefix for promoted kinds).
    #[inline]
    pub const fn usi_char(self) -> char {
        match self.unpromote() {
            PieceKind::Pawn => 'P',
            PieceKind::Lance => 'L',
            PieceKind::Knight => 'N',
            PieceKind::Silver => 'S',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Gold => 'G',
            _ => 'K',
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_promoted() {
            write!(f, "+{}", self.usi_char())
        } else {
            write!(f, "{}", self.usi_char())
        }
    }
}
