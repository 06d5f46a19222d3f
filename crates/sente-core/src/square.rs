//! Board squares in USI coordinates.

use std::fmt;

/// A square on the 9×9 board, encoded as `file * 9 + rank`.
///
/// File 0 is USI file `1` (the right edge from Black's side) and rank 0 is
/// USI rank `a` (White's back rank), so `Square::new(6, 6)` is `7g`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    /// Total number of squares.
    pub const COUNT: usize = 81;

    /// Number of files (and ranks).
    pub const SIDE: u8 = 9;

    /// Create a square from zero-based file and rank, returning `None` if either is off the board.
    #[inline]
    pub const fn new(file: u8, rank: u8) -> Option<Square> {
        if file < Self::SIDE && rank < Self::SIDE {
            Some(Square(file * Self::SIDE + rank))
        } else {
            None
        }
    }

    /// Create a square from a zero-based index, returning `None` if out of range.
    #[inline]
    pub const fn from_index(index: u8) -> Option<Square> {
        if (index as usize) < Self::COUNT {
            Some(Square(index))
        } else {
            None
        }
    }

    /// Create a square from an index already known to be on the board.
    #[inline]
    pub(crate) const fn from_index_unchecked(index: u8) -> Square {
        debug_assert!((index as usize) < Self::COUNT);
        Square(index)
    }

    /// Parse USI notation such as `"7g"`.
    pub fn from_usi(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].checked_sub(b'1')?;
        let rank = bytes[1].checked_sub(b'a')?;
        Square::new(file, rank)
    }

    /// Return the zero-based index (0..81).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Return the zero-based file.
    #[inline]
    pub const fn file(self) -> u8 {
        self.0 / Self::SIDE
    }

    /// Return the zero-based rank.
    #[inline]
    pub const fn rank(self) -> u8 {
        self.0 % Self::SIDE
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file() + 1, (b'a' + self.rank()) as char)
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Square({self})")
    }
}
