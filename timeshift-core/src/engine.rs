//! The time-shift match engine.
//!
//! Three boards share one turn cursor. A move is only accepted on the active
//! (board, color) pair, is judged by the rules adapter against the board's
//! derived position, and a capture removes the victim's identity from every
//! later board as well.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::{BoardOutcome, BoardState, PieceKey};
use crate::rules::{RulesAdapter, StandardRules};
use crate::{BoardIndex, CastleSide, Color, PieceKind, Square};

/// The single (board, color) pair allowed to move next.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct TurnCursor {
    pub board: BoardIndex,
    pub color: Color,
}

impl TurnCursor {
    /// (board 1, White).
    pub fn start() -> TurnCursor {
        TurnCursor {
            board: BoardIndex::ONE,
            color: Color::White,
        }
    }

    /// One step of the round robin: White→Black on the same board,
    /// Black→White on the next board.
    pub fn step(self) -> TurnCursor {
        match self.color {
            Color::White => TurnCursor {
                board: self.board,
                color: Color::Black,
            },
            Color::Black => TurnCursor {
                board: self.board.next(),
                color: Color::White,
            },
        }
    }
}

/// Overall match result.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    White,
    Black,
    Draw,
}

impl MatchResult {
    pub fn win_for(color: Color) -> MatchResult {
        match color {
            Color::White => MatchResult::White,
            Color::Black => MatchResult::Black,
        }
    }

    /// Score for `color`: 1.0 win, 0.5 draw, 0.0 loss.
    pub fn score_for(self, color: Color) -> f64 {
        match (self, color) {
            (MatchResult::Draw, _) => 0.5,
            (MatchResult::White, Color::White) | (MatchResult::Black, Color::Black) => 1.0,
            _ => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchResult::White => "white",
            MatchResult::Black => "black",
            MatchResult::Draw => "draw",
        }
    }

    pub fn parse(s: &str) -> Option<MatchResult> {
        match s {
            "white" => Some(MatchResult::White),
            "black" => Some(MatchResult::Black),
            "draw" => Some(MatchResult::Draw),
            _ => None,
        }
    }

    /// Majority of per-board winners; drawn boards count for neither side.
    pub fn from_boards(outcomes: impl IntoIterator<Item = BoardOutcome>) -> MatchResult {
        let (mut white, mut black) = (0, 0);
        for outcome in outcomes {
            match outcome.winner() {
                Some(Color::White) => white += 1,
                Some(Color::Black) => black += 1,
                None => {}
            }
        }
        match white.cmp(&black) {
            std::cmp::Ordering::Greater => MatchResult::White,
            std::cmp::Ordering::Less => MatchResult::Black,
            std::cmp::Ordering::Equal => MatchResult::Draw,
        }
    }
}

/// Why a move or board resignation was refused. Nothing changes on refusal.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("board_finished")]
    BoardFinished,
    #[error("not_active_board")]
    NotActiveBoard,
    #[error("no_piece_at_source")]
    NoPieceAtSource,
    #[error("wrong_color_turn")]
    WrongColorTurn,
    #[error("illegal_move")]
    IllegalMove,
}

impl RejectReason {
    /// Stable wire code.
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::BoardFinished => "board_finished",
            RejectReason::NotActiveBoard => "not_active_board",
            RejectReason::NoPieceAtSource => "no_piece_at_source",
            RejectReason::WrongColorTurn => "wrong_color_turn",
            RejectReason::IllegalMove => "illegal_move",
        }
    }
}

/// What an accepted move did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub board: BoardIndex,
    pub color: Color,
    pub piece: PieceKind,
    pub from: Square,
    pub to: Square,
    pub captured: Option<PieceKind>,
    /// Identity of the captured piece.
    pub captured_key: Option<PieceKey>,
    /// Later boards the capture was removed from.
    pub propagated_to: Vec<BoardIndex>,
    pub en_passant: bool,
    pub castle: Option<CastleSide>,
    pub promotion: Option<PieceKind>,
    /// The move checkmated its board.
    pub checkmate: bool,
}

/// Successful `apply_move`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedMove {
    pub record: MoveRecord,
    /// Set once all three boards are finished.
    pub match_result: Option<MatchResult>,
}

/// Successful `resign_active_board`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardResignation {
    pub board: BoardIndex,
    pub winner: Color,
    pub match_result: Option<MatchResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub index: BoardIndex,
    pub finished: bool,
    pub result: Option<BoardOutcome>,
    /// Square → piece code, e.g. `"e1": "wK"`.
    pub position: BTreeMap<String, String>,
    pub fen: String,
}

/// Read-only view of the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub turn: TurnCursor,
    pub boards: Vec<BoardSnapshot>,
}

/// Three boards, one rules adapter, one turn cursor.
#[derive(Clone, Debug)]
pub struct TimeShiftEngine<R = StandardRules> {
    boards: [BoardState; 3],
    turn: TurnCursor,
    rules: R,
}

impl TimeShiftEngine<StandardRules> {
    /// Fresh match with the standard rules.
    pub fn new() -> Self {
        Self::with_rules(StandardRules)
    }
}

impl Default for TimeShiftEngine<StandardRules> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RulesAdapter> TimeShiftEngine<R> {
    /// Fresh match backed by a custom rules adapter.
    pub fn with_rules(rules: R) -> Self {
        TimeShiftEngine {
            boards: [
                BoardState::new(BoardIndex::ONE),
                BoardState::new(BoardIndex::TWO),
                BoardState::new(BoardIndex::THREE),
            ],
            turn: TurnCursor::start(),
            rules,
        }
    }

    #[inline]
    pub fn turn(&self) -> TurnCursor {
        self.turn
    }

    #[inline]
    pub fn board(&self, index: BoardIndex) -> &BoardState {
        &self.boards[index.slot()]
    }

    pub fn all_finished(&self) -> bool {
        self.boards.iter().all(BoardState::is_finished)
    }

    /// Match result, or None while any board is still being played.
    pub fn match_result(&self) -> Option<MatchResult> {
        if !self.all_finished() {
            return None;
        }
        Some(MatchResult::from_boards(
            self.boards.iter().filter_map(BoardState::outcome),
        ))
    }

    /// Apply a move on `board`. On rejection nothing is modified.
    pub fn apply_move(
        &mut self,
        board: BoardIndex,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
    ) -> Result<AppliedMove, RejectReason> {
        let state = &self.boards[board.slot()];
        if state.is_finished() {
            return Err(RejectReason::BoardFinished);
        }
        if board != self.turn.board {
            return Err(RejectReason::NotActiveBoard);
        }

        let mover = self.turn.color;
        let moving_key = state.key_at(from).ok_or(RejectReason::NoPieceAtSource)?;
        let moving = *state.piece(moving_key).ok_or(RejectReason::NoPieceAtSource)?;
        if moving.color != mover {
            return Err(RejectReason::WrongColorTurn);
        }

        let outcome = self
            .rules
            .legal_move(&state.position(), from, to, promotion)
            .ok_or(RejectReason::IllegalMove)?;
        let flags = outcome.flags;

        // From here on the move is legal; mutate.
        let state = &mut self.boards[board.slot()];

        let captured_key = flags.captured.and_then(|_| {
            let victim_square = if flags.en_passant {
                to.offset(0, -mover.pawn_direction())
            } else {
                Some(to)
            };
            victim_square.and_then(|sq| state.key_of_color_at(sq, mover.opponent()))
        });

        if let Some(side) = flags.castle {
            let (rook_from, rook_to) = side.rook_squares(mover);
            if let Some(rook) = state.key_of_color_at(rook_from, mover) {
                state.relocate(rook, rook_to);
            }
        }
        if let Some(key) = captured_key {
            state.remove(key);
        }
        state.relocate(moving_key, to);
        if let Some(kind) = flags.promotion {
            state.promote(moving_key, kind);
        }
        state.adopt_meta(&outcome.position);

        let mut propagated_to = Vec::new();
        if let Some(key) = captured_key {
            for later in board.later_boards() {
                if self.boards[later.slot()].remove(key) {
                    propagated_to.push(later);
                }
            }
        }

        self.settle(board);
        for &later in &propagated_to {
            self.settle(later);
        }

        let checkmate = self.boards[board.slot()].outcome() == Some(BoardOutcome::win_for(mover));
        self.advance_turn();

        Ok(AppliedMove {
            record: MoveRecord {
                board,
                color: mover,
                piece: moving.kind,
                from,
                to,
                captured: flags.captured,
                captured_key,
                propagated_to,
                en_passant: flags.en_passant,
                castle: flags.castle,
                promotion: flags.promotion,
                checkmate,
            },
            match_result: self.match_result(),
        })
    }

    /// The active color gives up the active board only.
    pub fn resign_active_board(&mut self) -> Result<BoardResignation, RejectReason> {
        let TurnCursor { board, color } = self.turn;
        let state = &mut self.boards[board.slot()];
        if state.is_finished() {
            return Err(RejectReason::BoardFinished);
        }

        let winner = color.opponent();
        state.finish(BoardOutcome::win_for(winner));
        self.advance_turn();

        Ok(BoardResignation {
            board,
            winner,
            match_result: self.match_result(),
        })
    }

    /// Read-only snapshot of every board and the cursor.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            turn: self.turn,
            boards: self
                .boards
                .iter()
                .map(|b| BoardSnapshot {
                    index: b.index(),
                    finished: b.is_finished(),
                    result: b.outcome(),
                    position: b.position_map(),
                    fen: b.fen(),
                })
                .collect(),
        }
    }

    /// Finish a board whose side to move is mated or stalemated.
    fn settle(&mut self, index: BoardIndex) {
        let state = &self.boards[index.slot()];
        if state.is_finished() {
            return;
        }
        let position = state.position();
        let outcome = if self.rules.is_checkmate(&position) {
            Some(BoardOutcome::win_for(position.side_to_move.opponent()))
        } else if self.rules.is_stalemate(&position) {
            Some(BoardOutcome::Draw)
        } else {
            None
        };
        if let Some(outcome) = outcome {
            self.boards[index.slot()].finish(outcome);
        }
    }

    /// Step the cursor, skipping finished boards unless all are finished.
    fn advance_turn(&mut self) {
        loop {
            self.turn = self.turn.step();
            if !self.boards[self.turn.board.slot()].is_finished() || self.all_finished() {
                break;
            }
        }
    }
}
