//! Time-shift chess: three chess boards played in one interleaved turn order.
//!
//! # Turn Order
//!
//! ```text
//! (board 1, White) -> (board 1, Black) -> (board 2, White) -> (board 2, Black)
//!   -> (board 3, White) -> (board 3, Black) -> (board 1, White) -> ...
//! ```
//!
//! Finished boards are skipped. Exactly one (board, color) pair may move.
//!
//! # Time-Shift Propagation
//!
//! ```text
//! capture on board 1  -> same piece identity removed from boards 2 and 3
//! capture on board 2  -> same piece identity removed from board 3
//! capture on board 3  -> no propagation
//! ```
//!
//! A piece identity is keyed by the square it started the game on (`PieceKey`),
//! so the "same" knight can be found on every board no matter where it has
//! wandered since.
//!
//! # Square Encoding
//!
//! ```text
//! index = rank * 8 + file      a1 = 0, h1 = 7, a8 = 56, h8 = 63
//! ```

pub mod board;
pub mod clock;
pub mod engine;
pub mod position;
pub mod replay;
pub mod rules;

#[cfg(feature = "wasm")]
pub mod wasm;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use board::{BoardOutcome, BoardState, Piece, PieceKey};
pub use clock::{ClockSnapshot, MatchClock};
pub use engine::{
    AppliedMove, BoardResignation, BoardSnapshot, EngineSnapshot, MatchResult, MoveRecord,
    RejectReason, TimeShiftEngine, TurnCursor,
};
pub use position::{CastlingRights, ColoredPiece, ParseFenError, Position};
pub use replay::{MoveAction, MoveRow, ReplayCursor, ReplayStep};
pub use rules::{MoveFlags, RulesAdapter, RulesOutcome, StandardRules};

/// Side color.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Color {
    /// Get the opposing color.
    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Rank delta of a pawn push for this color.
    #[inline]
    pub fn pawn_direction(self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// Rank the pieces of this color start on (0 = rank 1).
    #[inline]
    pub fn home_rank(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// Single-letter code used in piece codes and FEN (`w` / `b`).
    pub fn letter(self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    /// Index into per-color arrays (White = 0, Black = 1).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> impl Iterator<Item = Color> {
        [Color::White, Color::Black].into_iter()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("white"),
            Color::Black => f.write_str("black"),
        }
    }
}

/// Chess piece type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Uppercase letter (`P`, `N`, `B`, `R`, `Q`, `K`).
    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    /// Parse a piece letter, either case.
    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_uppercase() {
            'P' => Some(PieceKind::Pawn),
            'N' => Some(PieceKind::Knight),
            'B' => Some(PieceKind::Bishop),
            'R' => Some(PieceKind::Rook),
            'Q' => Some(PieceKind::Queen),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }

    /// Parse a promotion letter. Only `q`, `r`, `b`, `n` are accepted.
    pub fn from_promotion(s: &str) -> Option<PieceKind> {
        let mut chars = s.chars();
        let kind = PieceKind::from_letter(chars.next()?)?;
        if chars.next().is_some() {
            return None;
        }
        kind.is_promotion_target().then_some(kind)
    }

    #[inline]
    pub fn is_promotion_target(self) -> bool {
        matches!(
            self,
            PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen
        )
    }
}

/// Error returned when a square name like `"e4"` cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid square: {0:?}")]
pub struct ParseSquareError(pub String);

/// A square on the 8x8 board (0-63).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square(u8);

impl Square {
    /// Create a square from file and rank (0-7 each).
    #[inline]
    pub fn new(file: u8, rank: u8) -> Square {
        debug_assert!(file < 8 && rank < 8);
        Square(rank * 8 + file)
    }

    /// Create a square from its index (0-63).
    #[inline]
    pub fn from_index(index: u8) -> Option<Square> {
        (index < 64).then_some(Square(index))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// File 0-7 (a-h).
    #[inline]
    pub fn file(self) -> u8 {
        self.0 % 8
    }

    /// Rank 0-7 (1-8).
    #[inline]
    pub fn rank(self) -> u8 {
        self.0 / 8
    }

    /// Step by (file, rank) deltas, None when leaving the board.
    #[inline]
    pub fn offset(self, df: i8, dr: i8) -> Option<Square> {
        let file = self.file() as i8 + df;
        let rank = self.rank() as i8 + dr;
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Square::new(file as u8, rank as u8))
        } else {
            None
        }
    }

    /// Iterate over all 64 squares, a1 first.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file()) as char, self.rank() + 1)
    }
}

impl FromStr for Square {
    type Err = ParseSquareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(ParseSquareError(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        if file >= 8 || rank >= 8 {
            return Err(ParseSquareError(s.to_string()));
        }
        Ok(Square::new(file, rank))
    }
}

impl TryFrom<String> for Square {
    type Error = ParseSquareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(sq: Square) -> String {
        sq.to_string()
    }
}

/// Castling direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastleSide {
    Kingside,
    Queenside,
}

impl CastleSide {
    /// Rook (from, to) squares for this side and color.
    pub fn rook_squares(self, color: Color) -> (Square, Square) {
        let rank = color.home_rank();
        match self {
            CastleSide::Kingside => (Square::new(7, rank), Square::new(5, rank)),
            CastleSide::Queenside => (Square::new(0, rank), Square::new(3, rank)),
        }
    }

    /// King destination square for this side and color.
    pub fn king_target(self, color: Color) -> Square {
        let rank = color.home_rank();
        match self {
            CastleSide::Kingside => Square::new(6, rank),
            CastleSide::Queenside => Square::new(2, rank),
        }
    }
}

/// Board number, 1 to 3.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoardIndex(u8);

impl BoardIndex {
    pub const ONE: BoardIndex = BoardIndex(1);
    pub const TWO: BoardIndex = BoardIndex(2);
    pub const THREE: BoardIndex = BoardIndex(3);

    /// Create a board index, None outside 1..=3.
    #[inline]
    pub fn new(n: u8) -> Option<BoardIndex> {
        (1..=3).contains(&n).then_some(BoardIndex(n))
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot for array storage.
    #[inline]
    pub fn slot(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Next board in round-robin order: (board mod 3) + 1.
    #[inline]
    pub fn next(self) -> BoardIndex {
        BoardIndex(self.0 % 3 + 1)
    }

    /// Boards that receive propagated captures from this one.
    pub fn later_boards(self) -> impl Iterator<Item = BoardIndex> {
        (self.0 + 1..=3).map(BoardIndex)
    }

    pub fn all() -> impl Iterator<Item = BoardIndex> {
        (1..=3).map(BoardIndex)
    }
}

impl TryFrom<u8> for BoardIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BoardIndex::new(value).ok_or_else(|| format!("board index out of range: {value}"))
    }
}

impl From<BoardIndex> for u8 {
    fn from(b: BoardIndex) -> u8 {
        b.0
    }
}

impl fmt::Display for BoardIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
