//! Catch-up replay of persisted moves onto a local engine.

use serde::{Deserialize, Serialize};

use crate::engine::{AppliedMove, BoardResignation, RejectReason, TimeShiftEngine};
use crate::rules::RulesAdapter;
use crate::{BoardIndex, PieceKind, Square};

/// What a move log row did to its board.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveAction {
    Move {
        from: Square,
        to: Square,
        #[serde(default)]
        promotion: Option<PieceKind>,
    },
    /// The side to move gave up the board.
    ResignBoard,
}

impl MoveAction {
    pub fn kind(&self) -> &'static str {
        match self {
            MoveAction::Move { .. } => "move",
            MoveAction::ResignBoard => "resign_board",
        }
    }
}

/// One persisted move log row, as served by the moves endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRow {
    pub id: i64,
    pub board: BoardIndex,
    #[serde(flatten)]
    pub action: MoveAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayStep {
    /// Already applied earlier.
    Skipped,
    Applied(AppliedMove),
    BoardResigned(BoardResignation),
    /// The local engine disagrees with the server; resync from scratch.
    Rejected(RejectReason),
}

/// Remembers the last applied row id so repeated deliveries are harmless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayCursor {
    last_applied: i64,
}

impl ReplayCursor {
    pub fn new() -> ReplayCursor {
        ReplayCursor::default()
    }

    #[inline]
    pub fn last_applied(&self) -> i64 {
        self.last_applied
    }

    pub fn apply<R: RulesAdapter>(
        &mut self,
        engine: &mut TimeShiftEngine<R>,
        row: &MoveRow,
    ) -> ReplayStep {
        if row.id <= self.last_applied {
            return ReplayStep::Skipped;
        }
        let step = match row.action {
            MoveAction::Move { from, to, promotion } => engine
                .apply_move(row.board, from, to, promotion)
                .map(ReplayStep::Applied),
            MoveAction::ResignBoard if engine.turn().board != row.board => {
                Err(RejectReason::NotActiveBoard)
            }
            MoveAction::ResignBoard => engine.resign_active_board().map(ReplayStep::BoardResigned),
        };
        match step {
            Ok(step) => {
                self.last_applied = row.id;
                step
            }
            Err(reason) => ReplayStep::Rejected(reason),
        }
    }

    /// Apply rows in increasing id order. Stops at the first rejection.
    pub fn apply_all<R: RulesAdapter>(
        &mut self,
        engine: &mut TimeShiftEngine<R>,
        rows: &[MoveRow],
    ) -> Result<usize, RejectReason> {
        let mut ordered: Vec<&MoveRow> = rows.iter().collect();
        ordered.sort_by_key(|r| r.id);

        let mut applied = 0;
        for row in ordered {
            match self.apply(engine, row) {
                ReplayStep::Skipped => {}
                ReplayStep::Applied(_) | ReplayStep::BoardResigned(_) => applied += 1,
                ReplayStep::Rejected(reason) => return Err(reason),
            }
        }
        Ok(applied)
    }

    /// Forget progress, for a full resync against a fresh engine.
    pub fn reset(&mut self) {
        self.last_applied = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, board: u8, from: &str, to: &str) -> MoveRow {
        MoveRow {
            id,
            board: BoardIndex::new(board).unwrap(),
            action: MoveAction::Move {
                from: from.parse().unwrap(),
                to: to.parse().unwrap(),
                promotion: None,
            },
        }
    }

    fn resign(id: i64, board: u8) -> MoveRow {
        MoveRow {
            id,
            board: BoardIndex::new(board).unwrap(),
            action: MoveAction::ResignBoard,
        }
    }

    #[test]
    fn test_replay_is_idempotent() {
        let rows = [row(1, 1, "e2", "e4"), row(2, 1, "e7", "e5"), row(3, 2, "d2", "d4")];
        let mut engine = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();

        assert_eq!(cursor.apply_all(&mut engine, &rows), Ok(3));
        let once = engine.snapshot();
        assert_eq!(cursor.apply_all(&mut engine, &rows), Ok(0));
        assert_eq!(engine.snapshot(), once);
        assert_eq!(cursor.last_applied(), 3);
    }

    #[test]
    fn test_replay_sorts_by_id() {
        let rows = [row(2, 1, "e7", "e5"), row(1, 1, "e2", "e4")];
        let mut engine = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();
        assert_eq!(cursor.apply_all(&mut engine, &rows), Ok(2));
    }

    #[test]
    fn test_rejection_leaves_cursor() {
        let mut engine = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();
        assert!(matches!(cursor.apply(&mut engine, &row(5, 1, "e2", "e4")), ReplayStep::Applied(_)));
        assert_eq!(
            cursor.apply(&mut engine, &row(6, 2, "e2", "e4")),
            ReplayStep::Rejected(RejectReason::NotActiveBoard)
        );
        assert_eq!(cursor.last_applied(), 5);
        assert_eq!(cursor.apply(&mut engine, &row(4, 1, "a7", "a6")), ReplayStep::Skipped);

        cursor.reset();
        assert_eq!(cursor.last_applied(), 0);
    }

    #[test]
    fn test_replay_follows_board_resignation() {
        let rows = [
            resign(1, 1),
            row(2, 2, "e2", "e4"),
            row(3, 2, "e7", "e5"),
            row(4, 3, "d2", "d4"),
        ];
        let mut engine = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();
        assert_eq!(cursor.apply_all(&mut engine, &rows), Ok(4));

        let mut live = TimeShiftEngine::new();
        live.resign_active_board().unwrap();
        live.apply_move(BoardIndex::TWO, "e2".parse().unwrap(), "e4".parse().unwrap(), None).unwrap();
        live.apply_move(BoardIndex::TWO, "e7".parse().unwrap(), "e5".parse().unwrap(), None).unwrap();
        live.apply_move(BoardIndex::THREE, "d2".parse().unwrap(), "d4".parse().unwrap(), None).unwrap();
        assert_eq!(engine.snapshot(), live.snapshot());
        assert!(engine.board(BoardIndex::ONE).is_finished());

        // Redelivery does not resign a second board.
        assert_eq!(cursor.apply_all(&mut engine, &rows), Ok(0));
        assert_eq!(engine.snapshot(), live.snapshot());
    }

    #[test]
    fn test_resign_row_for_wrong_board_is_rejected() {
        let mut engine = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();
        assert_eq!(
            cursor.apply(&mut engine, &resign(1, 2)),
            ReplayStep::Rejected(RejectReason::NotActiveBoard)
        );
        assert!(!engine.board(BoardIndex::ONE).is_finished());
        assert_eq!(cursor.last_applied(), 0);
    }

    #[test]
    fn test_row_json_shape() {
        let json = serde_json::to_value(resign(7, 1)).unwrap();
        assert_eq!(json["kind"], "resign_board");
        assert_eq!(json["board"], 1);

        let parsed: MoveRow =
            serde_json::from_str(r#"{"id":8,"board":2,"kind":"move","from":"e2","to":"e4"}"#).unwrap();
        assert_eq!(parsed, row(8, 2, "e2", "e4"));
    }
}
