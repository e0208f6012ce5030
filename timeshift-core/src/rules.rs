//! Per-board chess legality.
//!
//! The engine never inspects chess rules itself. It asks a [`RulesAdapter`]
//! whether a move is legal in a derived [`Position`] and what happened
//! (capture, castle, en passant, promotion). [`StandardRules`] is the bundled
//! adapter: complete legal move generation over a mailbox board.

use serde::{Deserialize, Serialize};

use crate::position::{ColoredPiece, Position};
use crate::{CastleSide, Color, PieceKind, Square};

/// What a legal move did on its board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MoveFlags {
    /// Type of the captured piece, if any.
    pub captured: Option<PieceKind>,
    /// The capture was en passant (captured pawn sits behind `to`).
    pub en_passant: bool,
    /// Castling side, if the king castled.
    pub castle: Option<CastleSide>,
    /// Piece the pawn promoted to.
    pub promotion: Option<PieceKind>,
}

/// A legal move as judged by a rules adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RulesOutcome {
    pub flags: MoveFlags,
    /// Position after the move.
    pub position: Position,
}

/// Narrow legality interface for one board.
pub trait RulesAdapter {
    /// Check `from -> to` for the side to move. `promotion` defaults to a
    /// queen when a pawn reaches the last rank. `None` means illegal.
    fn legal_move(
        &self,
        position: &Position,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Option<RulesOutcome>;

    /// Side to move is in check with no legal move.
    fn is_checkmate(&self, position: &Position) -> bool;

    /// Side to move is not in check and has no legal move.
    fn is_stalemate(&self, _position: &Position) -> bool {
        false
    }
}

// =============================================================================
// Standard rules
// =============================================================================

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_STEPS: [(i8, i8); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const ROOK_DIRS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

const PROMOTION_KINDS: [PieceKind; 4] = [
    PieceKind::Queen,
    PieceKind::Rook,
    PieceKind::Bishop,
    PieceKind::Knight,
];

/// A pseudo-legal move candidate.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    from: Square,
    to: Square,
    flags: MoveFlags,
    double_push: bool,
}

/// Orthodox chess rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRules;

impl StandardRules {
    /// Is `target` attacked by any piece of color `by`?
    pub fn is_attacked(position: &Position, target: Square, by: Color) -> bool {
        let is = |sq: Option<Square>, kinds: &[PieceKind]| {
            sq.and_then(|s| position.piece_at(s))
                .is_some_and(|p| p.color == by && kinds.contains(&p.kind))
        };

        // A pawn of `by` attacks diagonally forward, so look one rank back.
        let back = -by.pawn_direction();
        if is(target.offset(-1, back), &[PieceKind::Pawn])
            || is(target.offset(1, back), &[PieceKind::Pawn])
        {
            return true;
        }

        if KNIGHT_STEPS
            .iter()
            .any(|&(df, dr)| is(target.offset(df, dr), &[PieceKind::Knight]))
        {
            return true;
        }

        if KING_STEPS
            .iter()
            .any(|&(df, dr)| is(target.offset(df, dr), &[PieceKind::King]))
        {
            return true;
        }

        let slides = [
            (&ROOK_DIRS, [PieceKind::Rook, PieceKind::Queen]),
            (&BISHOP_DIRS, [PieceKind::Bishop, PieceKind::Queen]),
        ];
        for (dirs, kinds) in slides {
            for &(df, dr) in dirs.iter() {
                let mut cur = target.offset(df, dr);
                while let Some(sq) = cur {
                    if let Some(piece) = position.piece_at(sq) {
                        if piece.color == by && kinds.contains(&piece.kind) {
                            return true;
                        }
                        break;
                    }
                    cur = sq.offset(df, dr);
                }
            }
        }

        false
    }

    /// Is `color`'s king attacked? A board without that king is never in check.
    pub fn in_check(position: &Position, color: Color) -> bool {
        position
            .king_square(color)
            .is_some_and(|king| Self::is_attacked(position, king, color.opponent()))
    }

    /// All legal moves for the side to move as (from, to, promotion).
    pub fn legal_moves(position: &Position) -> Vec<(Square, Square, Option<PieceKind>)> {
        Self::legal_candidates(position)
            .into_iter()
            .map(|c| (c.from, c.to, c.flags.promotion))
            .collect()
    }

    fn legal_candidates(position: &Position) -> Vec<Candidate> {
        let mover = position.side_to_move;
        let mut pseudo = Vec::with_capacity(48);
        for (from, piece) in position.pieces() {
            if piece.color == mover {
                pseudo_moves_from(position, from, piece, &mut pseudo);
            }
        }
        pseudo
            .into_iter()
            .filter(|c| !Self::in_check(&play(position, c), mover))
            .collect()
    }

    fn has_legal_move(position: &Position) -> bool {
        !Self::legal_candidates(position).is_empty()
    }
}

impl RulesAdapter for StandardRules {
    fn legal_move(
        &self,
        position: &Position,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Option<RulesOutcome> {
        let piece = position.piece_at(from)?;
        if piece.color != position.side_to_move {
            return None;
        }

        let wanted = promotion.unwrap_or(PieceKind::Queen);
        let mut pseudo = Vec::new();
        pseudo_moves_from(position, from, piece, &mut pseudo);

        let candidate = pseudo.into_iter().find(|c| {
            c.to == to && c.flags.promotion.map_or(true, |kind| kind == wanted)
        })?;

        let next = play(position, &candidate);
        if Self::in_check(&next, piece.color) {
            return None;
        }

        Some(RulesOutcome {
            flags: candidate.flags,
            position: next,
        })
    }

    fn is_checkmate(&self, position: &Position) -> bool {
        Self::in_check(position, position.side_to_move) && !Self::has_legal_move(position)
    }

    fn is_stalemate(&self, position: &Position) -> bool {
        !Self::in_check(position, position.side_to_move) && !Self::has_legal_move(position)
    }
}

/// Push every pseudo-legal move of `piece` standing on `from`.
fn pseudo_moves_from(position: &Position, from: Square, piece: ColoredPiece, out: &mut Vec<Candidate>) {
    let color = piece.color;

    // Kings are never captured; a move onto one is simply not generated.
    let push_target = |to: Square, out: &mut Vec<Candidate>| -> bool {
        match position.piece_at(to) {
            None => {
                out.push(quiet(from, to));
                true
            }
            Some(other) if other.color != color && other.kind != PieceKind::King => {
                out.push(capture(from, to, other.kind));
                false
            }
            Some(_) => false,
        }
    };

    match piece.kind {
        PieceKind::Pawn => pawn_moves(position, from, color, out),
        PieceKind::Knight => {
            for &(df, dr) in &KNIGHT_STEPS {
                if let Some(to) = from.offset(df, dr) {
                    push_target(to, out);
                }
            }
        }
        PieceKind::King => {
            for &(df, dr) in &KING_STEPS {
                if let Some(to) = from.offset(df, dr) {
                    push_target(to, out);
                }
            }
            castle_moves(position, from, color, out);
        }
        PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen => {
            let dirs: &[(i8, i8)] = match piece.kind {
                PieceKind::Bishop => &BISHOP_DIRS,
                PieceKind::Rook => &ROOK_DIRS,
                _ => &KING_STEPS,
            };
            for &(df, dr) in dirs {
                let mut cur = from.offset(df, dr);
                while let Some(to) = cur {
                    if !push_target(to, out) {
                        break;
                    }
                    cur = to.offset(df, dr);
                }
            }
        }
    }
}

fn pawn_moves(position: &Position, from: Square, color: Color, out: &mut Vec<Candidate>) {
    let dir = color.pawn_direction();
    let start_rank = (color.home_rank() as i8 + dir) as u8;
    let last_rank = color.opponent().home_rank();

    let push = |mut candidate: Candidate, out: &mut Vec<Candidate>| {
        if candidate.to.rank() == last_rank {
            for kind in PROMOTION_KINDS {
                candidate.flags.promotion = Some(kind);
                out.push(candidate);
            }
        } else {
            out.push(candidate);
        }
    };

    if let Some(one) = from.offset(0, dir) {
        if position.piece_at(one).is_none() {
            push(quiet(from, one), out);
            if from.rank() == start_rank {
                if let Some(two) = one.offset(0, dir) {
                    if position.piece_at(two).is_none() {
                        let mut candidate = quiet(from, two);
                        candidate.double_push = true;
                        out.push(candidate);
                    }
                }
            }
        }
    }

    for df in [-1, 1] {
        let Some(to) = from.offset(df, dir) else {
            continue;
        };
        match position.piece_at(to) {
            Some(other) if other.color != color && other.kind != PieceKind::King => {
                push(capture(from, to, other.kind), out);
            }
            None if position.en_passant == Some(to) => {
                let behind = to.offset(0, -dir);
                let victim = behind.and_then(|sq| position.piece_at(sq));
                if victim == Some(ColoredPiece::new(color.opponent(), PieceKind::Pawn)) {
                    let mut candidate = capture(from, to, PieceKind::Pawn);
                    candidate.flags.en_passant = true;
                    out.push(candidate);
                }
            }
            _ => {}
        }
    }
}

fn castle_moves(position: &Position, from: Square, color: Color, out: &mut Vec<Candidate>) {
    let rank = color.home_rank();
    if from != Square::new(4, rank) || StandardRules::in_check(position, color) {
        return;
    }

    for side in [CastleSide::Kingside, CastleSide::Queenside] {
        if !position.castling.has(color, side) {
            continue;
        }
        let (rook_from, _) = side.rook_squares(color);
        if position.piece_at(rook_from) != Some(ColoredPiece::new(color, PieceKind::Rook)) {
            continue;
        }

        // Files that must be empty, and files the king crosses.
        let between: &[u8] = match side {
            CastleSide::Kingside => &[5, 6],
            CastleSide::Queenside => &[1, 2, 3],
        };
        let transit: [u8; 2] = match side {
            CastleSide::Kingside => [5, 6],
            CastleSide::Queenside => [3, 2],
        };
        if between
            .iter()
            .any(|&file| position.piece_at(Square::new(file, rank)).is_some())
        {
            continue;
        }
        if transit
            .iter()
            .any(|&file| StandardRules::is_attacked(position, Square::new(file, rank), color.opponent()))
        {
            continue;
        }

        let mut candidate = quiet(from, side.king_target(color));
        candidate.flags.castle = Some(side);
        out.push(candidate);
    }
}

fn quiet(from: Square, to: Square) -> Candidate {
    Candidate {
        from,
        to,
        flags: MoveFlags::default(),
        double_push: false,
    }
}

fn capture(from: Square, to: Square, kind: PieceKind) -> Candidate {
    let mut candidate = quiet(from, to);
    candidate.flags.captured = Some(kind);
    candidate
}

/// Make a pseudo-legal move, producing the next position.
fn play(position: &Position, candidate: &Candidate) -> Position {
    let mut next = position.clone();
    let Some(piece) = position.piece_at(candidate.from) else {
        return next;
    };
    let color = piece.color;

    next.set(candidate.from, None);
    if candidate.flags.en_passant {
        if let Some(behind) = candidate.to.offset(0, -color.pawn_direction()) {
            next.set(behind, None);
        }
    }
    let landed = match candidate.flags.promotion {
        Some(kind) => ColoredPiece::new(color, kind),
        None => piece,
    };
    next.set(candidate.to, Some(landed));

    if let Some(side) = candidate.flags.castle {
        let (rook_from, rook_to) = side.rook_squares(color);
        let rook = next.piece_at(rook_from);
        next.set(rook_from, None);
        next.set(rook_to, rook);
    }

    if piece.kind == PieceKind::King {
        next.castling.remove_color(color);
    }
    for touched in [candidate.from, candidate.to] {
        for c in Color::all() {
            for side in [CastleSide::Kingside, CastleSide::Queenside] {
                if side.rook_squares(c).0 == touched {
                    next.castling.remove(c, side);
                }
            }
        }
    }

    next.en_passant = if candidate.double_push {
        candidate.from.offset(0, color.pawn_direction())
    } else {
        None
    };

    if piece.kind == PieceKind::Pawn || candidate.flags.captured.is_some() {
        next.halfmove_clock = 0;
    } else {
        next.halfmove_clock += 1;
    }
    if color == Color::Black {
        next.fullmove_number += 1;
    }
    next.side_to_move = color.opponent();
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn fen(s: &str) -> Position {
        Position::from_fen(s).unwrap()
    }

    #[test]
    fn test_twenty_opening_moves() {
        assert_eq!(StandardRules::legal_moves(&Position::starting()).len(), 20);
    }

    #[test]
    fn test_double_push_sets_en_passant() {
        let outcome = StandardRules
            .legal_move(&Position::starting(), sq("e2"), sq("e4"), None)
            .unwrap();
        assert_eq!(outcome.position.en_passant, Some(sq("e3")));
        assert_eq!(outcome.position.side_to_move, Color::Black);
        assert_eq!(
            outcome.position.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn test_illegal_moves_rejected() {
        let start = Position::starting();
        assert!(StandardRules.legal_move(&start, sq("e2"), sq("e5"), None).is_none());
        assert!(StandardRules.legal_move(&start, sq("g1"), sq("g3"), None).is_none());
        assert!(StandardRules.legal_move(&start, sq("e7"), sq("e5"), None).is_none());
        assert!(StandardRules.legal_move(&start, sq("e4"), sq("e5"), None).is_none());
    }

    #[test]
    fn test_pinned_piece_cannot_move() {
        // Knight on e2 pinned by the rook on e8.
        let pos = fen("4r1k1/8/8/8/8/8/4N3/4K3 w - - 0 1");
        assert!(StandardRules.legal_move(&pos, sq("e2"), sq("c3"), None).is_none());
        assert!(StandardRules.legal_move(&pos, sq("e1"), sq("d1"), None).is_some());
    }

    #[test]
    fn test_en_passant_capture() {
        let pos = fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
        let outcome = StandardRules.legal_move(&pos, sq("e5"), sq("d6"), None).unwrap();
        assert!(outcome.flags.en_passant);
        assert_eq!(outcome.flags.captured, Some(PieceKind::Pawn));
        assert_eq!(outcome.position.piece_at(sq("d5")), None);
    }

    #[test]
    fn test_castling_kingside_and_blocked_by_attack() {
        let pos = fen("4k3/8/8/8/8/8/8/4K2R w K - 0 1");
        let outcome = StandardRules.legal_move(&pos, sq("e1"), sq("g1"), None).unwrap();
        assert_eq!(outcome.flags.castle, Some(CastleSide::Kingside));
        assert_eq!(
            outcome.position.piece_at(sq("f1")),
            Some(ColoredPiece::new(Color::White, PieceKind::Rook))
        );
        assert_eq!(outcome.position.castling, crate::CastlingRights::NONE);

        // Rook on f8 covers f1: no castling through check.
        let attacked = fen("4kr2/8/8/8/8/8/8/4K2R w K - 0 1");
        assert!(StandardRules.legal_move(&attacked, sq("e1"), sq("g1"), None).is_none());
    }

    #[test]
    fn test_castling_requires_rook_present() {
        // Rights claim kingside but the rook is gone.
        let pos = fen("4k3/8/8/8/8/8/8/4K3 w K - 0 1");
        assert!(StandardRules.legal_move(&pos, sq("e1"), sq("g1"), None).is_none());
    }

    #[test]
    fn test_promotion_default_and_override() {
        let pos = fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1");
        let queen = StandardRules.legal_move(&pos, sq("e7"), sq("e8"), None).unwrap();
        assert_eq!(queen.flags.promotion, Some(PieceKind::Queen));
        let knight = StandardRules
            .legal_move(&pos, sq("e7"), sq("e8"), Some(PieceKind::Knight))
            .unwrap();
        assert_eq!(knight.flags.promotion, Some(PieceKind::Knight));
        assert_eq!(
            knight.position.piece_at(sq("e8")),
            Some(ColoredPiece::new(Color::White, PieceKind::Knight))
        );
    }

    #[test]
    fn test_checkmate_and_stalemate() {
        // Fool's mate.
        let mate = fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert!(StandardRules.is_checkmate(&mate));
        assert!(!StandardRules.is_stalemate(&mate));

        let stale = fen("k7/2Q5/1K6/8/8/8/8/8 b - - 0 1");
        assert!(StandardRules.is_stalemate(&stale));
        assert!(!StandardRules.is_checkmate(&stale));

        assert!(!StandardRules.is_checkmate(&Position::starting()));
        assert!(!StandardRules.is_stalemate(&Position::starting()));
    }

    #[test]
    fn test_king_is_never_captured() {
        // Position where the side to move could "take" the enemy king.
        let pos = fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1");
        let mut trial = pos.clone();
        trial.set(sq("a8"), Some(ColoredPiece::new(Color::White, PieceKind::Rook)));
        trial.set(sq("a1"), None);
        assert!(StandardRules.legal_move(&trial, sq("a8"), sq("e8"), None).is_none());
    }
}
