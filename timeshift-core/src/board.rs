//! One board of the match: piece identities and the position derived from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::{starting_layout, CastlingRights, ColoredPiece, Position};
use crate::{BoardIndex, CastleSide, Color, PieceKind, Square};

/// Stable identity of a physical piece: the square it started on.
///
/// The same key names the same piece on every board, which is how a capture
/// on an earlier board finds its victim on later ones.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceKey(pub Square);

impl fmt::Display for PieceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A piece with identity: color, current type (promotion changes it) and square.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
    pub square: Square,
}

impl Piece {
    pub fn colored(&self) -> ColoredPiece {
        ColoredPiece::new(self.color, self.kind)
    }
}

/// Final result of a single board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardOutcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl BoardOutcome {
    /// The board is won by `color`.
    pub fn win_for(color: Color) -> BoardOutcome {
        match color {
            Color::White => BoardOutcome::WhiteWins,
            Color::Black => BoardOutcome::BlackWins,
        }
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            BoardOutcome::WhiteWins => Some(Color::White),
            BoardOutcome::BlackWins => Some(Color::Black),
            BoardOutcome::Draw => None,
        }
    }
}

/// Game state carried between moves that the piece map cannot express.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct BoardMeta {
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
}

/// One board's piece identities plus its finished/result flags.
#[derive(Clone, Debug)]
pub struct BoardState {
    index: BoardIndex,
    pieces: BTreeMap<PieceKey, Piece>,
    meta: BoardMeta,
    outcome: Option<BoardOutcome>,
}

impl BoardState {
    /// A board in the standard starting layout.
    pub fn new(index: BoardIndex) -> BoardState {
        let pieces = starting_layout()
            .into_iter()
            .map(|(square, p)| {
                (
                    PieceKey(square),
                    Piece {
                        color: p.color,
                        kind: p.kind,
                        square,
                    },
                )
            })
            .collect();

        BoardState {
            index,
            pieces,
            meta: BoardMeta {
                side_to_move: Color::White,
                castling: CastlingRights::ALL,
                en_passant: None,
                halfmove_clock: 0,
                fullmove_number: 1,
            },
            outcome: None,
        }
    }

    #[inline]
    pub fn index(&self) -> BoardIndex {
        self.index
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    #[inline]
    pub fn outcome(&self) -> Option<BoardOutcome> {
        self.outcome
    }

    /// Mark the board finished. A finished board's result never changes.
    pub fn finish(&mut self, outcome: BoardOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    pub fn pieces(&self) -> impl Iterator<Item = (PieceKey, &Piece)> {
        self.pieces.iter().map(|(k, p)| (*k, p))
    }

    pub fn piece(&self, key: PieceKey) -> Option<&Piece> {
        self.pieces.get(&key)
    }

    pub fn contains(&self, key: PieceKey) -> bool {
        self.pieces.contains_key(&key)
    }

    /// Identity currently standing on `square`.
    pub fn key_at(&self, square: Square) -> Option<PieceKey> {
        self.pieces
            .iter()
            .find(|(_, p)| p.square == square)
            .map(|(k, _)| *k)
    }

    /// Identity of a `color` piece standing on `square`.
    pub fn key_of_color_at(&self, square: Square, color: Color) -> Option<PieceKey> {
        self.pieces
            .iter()
            .find(|(_, p)| p.square == square && p.color == color)
            .map(|(k, _)| *k)
    }

    /// Move an identity to a new square.
    pub fn relocate(&mut self, key: PieceKey, to: Square) {
        if let Some(piece) = self.pieces.get_mut(&key) {
            piece.square = to;
        }
    }

    /// Change an identity's piece type (promotion).
    pub fn promote(&mut self, key: PieceKey, kind: PieceKind) {
        if let Some(piece) = self.pieces.get_mut(&key) {
            piece.kind = kind;
        }
    }

    /// Remove an identity. Returns true if it was present.
    pub fn remove(&mut self, key: PieceKey) -> bool {
        self.pieces.remove(&key).is_some()
    }

    /// Adopt side to move, castling rights, en passant and counters from the
    /// position a rules adapter produced for this board.
    pub fn adopt_meta(&mut self, position: &Position) {
        self.meta = BoardMeta {
            side_to_move: position.side_to_move,
            castling: position.castling,
            en_passant: position.en_passant,
            halfmove_clock: position.halfmove_clock,
            fullmove_number: position.fullmove_number,
        };
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.meta.side_to_move
    }

    /// Derive the chess position from the current identity map.
    ///
    /// Castling rights survive only while the king and that rook stand on
    /// their home squares, and the en passant target only while the pawn that
    /// made the double step is still there. Both can be invalidated by a
    /// propagated removal.
    pub fn position(&self) -> Position {
        let mut pos = Position::empty();
        for piece in self.pieces.values() {
            pos.set(piece.square, Some(piece.colored()));
        }
        pos.side_to_move = self.meta.side_to_move;
        pos.halfmove_clock = self.meta.halfmove_clock;
        pos.fullmove_number = self.meta.fullmove_number;

        for color in Color::all() {
            let king_home = Square::new(4, color.home_rank());
            let king_there =
                pos.piece_at(king_home) == Some(ColoredPiece::new(color, PieceKind::King));
            for side in [CastleSide::Kingside, CastleSide::Queenside] {
                let (rook_home, _) = side.rook_squares(color);
                let rook_there =
                    pos.piece_at(rook_home) == Some(ColoredPiece::new(color, PieceKind::Rook));
                if self.meta.castling.has(color, side) && king_there && rook_there {
                    pos.castling.set(color, side);
                }
            }
        }

        pos.en_passant = self.meta.en_passant.filter(|&target| {
            let pusher = self.meta.side_to_move.opponent();
            target
                .offset(0, pusher.pawn_direction())
                .and_then(|sq| pos.piece_at(sq))
                == Some(ColoredPiece::new(pusher, PieceKind::Pawn))
        });

        pos
    }

    /// Square → piece code (`"e4"` → `"wP"`) map of the derived position.
    pub fn position_map(&self) -> BTreeMap<String, String> {
        self.pieces
            .values()
            .map(|p| (p.square.to_string(), p.colored().code()))
            .collect()
    }

    pub fn fen(&self) -> String {
        self.position().to_fen()
    }
}
