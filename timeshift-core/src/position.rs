//! Mailbox chess position and FEN conversion.
//!
//! `Position` is what a rules adapter sees: piece placement plus the side to
//! move, castling rights, en passant target and move counters. Boards derive
//! a fresh `Position` from their piece identities on every read.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CastleSide, Color, PieceKind, Square};

/// A piece as it appears on a square: color and type, no identity.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct ColoredPiece {
    pub color: Color,
    pub kind: PieceKind,
}

impl ColoredPiece {
    #[inline]
    pub fn new(color: Color, kind: PieceKind) -> ColoredPiece {
        ColoredPiece { color, kind }
    }

    /// Two-letter code, e.g. `wP`, `bK`.
    pub fn code(self) -> String {
        format!("{}{}", self.color.letter(), self.kind.letter())
    }

    /// FEN letter: uppercase for White, lowercase for Black.
    pub fn fen_char(self) -> char {
        match self.color {
            Color::White => self.kind.letter(),
            Color::Black => self.kind.letter().to_ascii_lowercase(),
        }
    }

    pub fn from_fen_char(c: char) -> Option<ColoredPiece> {
        let kind = PieceKind::from_letter(c)?;
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        Some(ColoredPiece { color, kind })
    }
}

/// Castling availability, four bits.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: CastlingRights = CastlingRights(0);
    pub const ALL: CastlingRights = CastlingRights(0b1111);

    #[inline]
    fn bit(color: Color, side: CastleSide) -> u8 {
        match (color, side) {
            (Color::White, CastleSide::Kingside) => 1 << 0,
            (Color::White, CastleSide::Queenside) => 1 << 1,
            (Color::Black, CastleSide::Kingside) => 1 << 2,
            (Color::Black, CastleSide::Queenside) => 1 << 3,
        }
    }

    #[inline]
    pub fn has(self, color: Color, side: CastleSide) -> bool {
        self.0 & Self::bit(color, side) != 0
    }

    #[inline]
    pub fn set(&mut self, color: Color, side: CastleSide) {
        self.0 |= Self::bit(color, side);
    }

    #[inline]
    pub fn remove(&mut self, color: Color, side: CastleSide) {
        self.0 &= !Self::bit(color, side);
    }

    pub fn remove_color(&mut self, color: Color) {
        self.remove(color, CastleSide::Kingside);
        self.remove(color, CastleSide::Queenside);
    }

    /// FEN castling field (`KQkq`, `-`).
    pub fn to_fen(self) -> String {
        let mut s = String::new();
        for (color, side, c) in [
            (Color::White, CastleSide::Kingside, 'K'),
            (Color::White, CastleSide::Queenside, 'Q'),
            (Color::Black, CastleSide::Kingside, 'k'),
            (Color::Black, CastleSide::Queenside, 'q'),
        ] {
            if self.has(color, side) {
                s.push(c);
            }
        }
        if s.is_empty() {
            s.push('-');
        }
        s
    }
}

/// Error returned by [`Position::from_fen`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFenError {
    #[error("expected 6 space-separated FEN fields, got {0}")]
    FieldCount(usize),
    #[error("bad piece placement: {0}")]
    Placement(String),
    #[error("bad side to move: {0}")]
    SideToMove(String),
    #[error("bad castling field: {0}")]
    Castling(String),
    #[error("bad en passant field: {0}")]
    EnPassant(String),
    #[error("bad move counter: {0}")]
    Counter(String),
}

/// A full chess position.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Position {
    squares: [Option<ColoredPiece>; 64],
    pub side_to_move: Color,
    pub castling: CastlingRights,
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl Position {
    /// An empty board, White to move, no rights.
    pub fn empty() -> Position {
        Position {
            squares: [None; 64],
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    /// The standard starting position.
    pub fn starting() -> Position {
        let mut pos = Position::empty();
        for (sq, piece) in starting_layout() {
            pos.set(sq, Some(piece));
        }
        pos.castling = CastlingRights::ALL;
        pos
    }

    #[inline]
    pub fn piece_at(&self, sq: Square) -> Option<ColoredPiece> {
        self.squares[sq.index()]
    }

    #[inline]
    pub fn set(&mut self, sq: Square, piece: Option<ColoredPiece>) {
        self.squares[sq.index()] = piece;
    }

    /// All occupied squares with their pieces, a1 first.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, ColoredPiece)> + '_ {
        Square::all().filter_map(|sq| self.piece_at(sq).map(|p| (sq, p)))
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces()
            .find(|(_, p)| p.color == color && p.kind == PieceKind::King)
            .map(|(sq, _)| sq)
    }

    /// FEN piece placement field only.
    pub fn placement_fen(&self) -> String {
        let mut ranks = Vec::with_capacity(8);
        for rank in (0..8).rev() {
            let mut row = String::new();
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            row.push_str(&empty.to_string());
                            empty = 0;
                        }
                        row.push(piece.fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                row.push_str(&empty.to_string());
            }
            ranks.push(row);
        }
        ranks.join("/")
    }

    /// Full six-field FEN.
    pub fn to_fen(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.placement_fen(),
            self.side_to_move.letter(),
            self.castling.to_fen(),
            self.en_passant.map_or_else(|| "-".to_string(), |sq| sq.to_string()),
            self.halfmove_clock,
            self.fullmove_number,
        )
    }

    /// Parse a full six-field FEN.
    pub fn from_fen(fen: &str) -> Result<Position, ParseFenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ParseFenError::FieldCount(fields.len()));
        }

        let mut pos = Position::empty();

        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(ParseFenError::Placement(fields[0].to_string()));
        }
        for (i, row) in ranks.iter().enumerate() {
            let rank = 7 - i as u8;
            let mut file = 0u8;
            for c in row.chars() {
                if let Some(n) = c.to_digit(10) {
                    file += n as u8;
                } else {
                    let piece = ColoredPiece::from_fen_char(c)
                        .ok_or_else(|| ParseFenError::Placement(row.to_string()))?;
                    if file >= 8 {
                        return Err(ParseFenError::Placement(row.to_string()));
                    }
                    pos.set(Square::new(file, rank), Some(piece));
                    file += 1;
                }
                if file > 8 {
                    return Err(ParseFenError::Placement(row.to_string()));
                }
            }
            if file != 8 {
                return Err(ParseFenError::Placement(row.to_string()));
            }
        }

        pos.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(ParseFenError::SideToMove(other.to_string())),
        };

        if fields[2] != "-" {
            for c in fields[2].chars() {
                let (color, side) = match c {
                    'K' => (Color::White, CastleSide::Kingside),
                    'Q' => (Color::White, CastleSide::Queenside),
                    'k' => (Color::Black, CastleSide::Kingside),
                    'q' => (Color::Black, CastleSide::Queenside),
                    _ => return Err(ParseFenError::Castling(fields[2].to_string())),
                };
                pos.castling.set(color, side);
            }
        }

        pos.en_passant = match fields[3] {
            "-" => None,
            s => Some(
                s.parse()
                    .map_err(|_| ParseFenError::EnPassant(s.to_string()))?,
            ),
        };

        pos.halfmove_clock = fields[4]
            .parse()
            .map_err(|_| ParseFenError::Counter(fields[4].to_string()))?;
        pos.fullmove_number = fields[5]
            .parse()
            .map_err(|_| ParseFenError::Counter(fields[5].to_string()))?;

        Ok(pos)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::starting()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fen())
    }
}

/// The 32 pieces of the standard starting layout.
pub fn starting_layout() -> Vec<(Square, ColoredPiece)> {
    const BACK_RANK: [PieceKind; 8] = [
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Queen,
        PieceKind::King,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
    ];

    let mut layout = Vec::with_capacity(32);
    for color in Color::all() {
        let back = color.home_rank();
        let pawns = (back as i8 + color.pawn_direction()) as u8;
        for file in 0..8 {
            layout.push((Square::new(file, back), ColoredPiece::new(color, BACK_RANK[file as usize])));
            layout.push((Square::new(file, pawns), ColoredPiece::new(color, PieceKind::Pawn)));
        }
    }
    layout
}
