//! Randomized whole-match checks
//!
//! Plays seeded random legal games across all three boards and verifies:
//! - The turn cursor follows the round-robin rule, skipping finished boards
//! - Captured identities vanish from the right later boards
//! - Replaying the recorded rows, board resignations included, reproduces the
//!   exact same state

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use timeshift_core::{
    BoardIndex, Color, MoveAction, MoveRow, ReplayCursor, StandardRules, TimeShiftEngine, TurnCursor,
};

const MAX_PLIES: usize = 600;

/// Independent model of the cursor rule.
fn expected_next(engine: &TimeShiftEngine, from: TurnCursor) -> TurnCursor {
    let mut cursor = from;
    loop {
        cursor = match cursor.color {
            Color::White => TurnCursor {
                board: cursor.board,
                color: Color::Black,
            },
            Color::Black => TurnCursor {
                board: BoardIndex::new(cursor.board.get() % 3 + 1).unwrap(),
                color: Color::White,
            },
        };
        if !engine.board(cursor.board).is_finished() || engine.all_finished() {
            return cursor;
        }
    }
}

/// Play one random match. Returns the engine and the recorded rows.
fn random_match(seed: u64) -> (TimeShiftEngine, Vec<MoveRow>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut engine = TimeShiftEngine::new();
    let mut rows = Vec::new();

    for _ in 0..MAX_PLIES {
        if engine.all_finished() {
            break;
        }
        let before = engine.turn();
        let active = engine.board(before.board);
        assert!(!active.is_finished(), "cursor rests on a finished board");
        assert_eq!(active.side_to_move(), before.color);

        let moves = StandardRules::legal_moves(&active.position());
        assert!(!moves.is_empty(), "unfinished board without legal moves");

        // Occasionally give up a board so matches end within the ply cap.
        if rng.random_range(0..120) == 0 {
            let resignation = engine.resign_active_board().unwrap();
            assert_eq!(resignation.board, before.board);
            assert_eq!(engine.turn(), expected_next(&engine, before));
            rows.push(MoveRow {
                id: rows.len() as i64 + 1,
                board: before.board,
                action: MoveAction::ResignBoard,
            });
            continue;
        }

        let (from, to, promotion) = moves[rng.random_range(0..moves.len())];
        let applied = engine
            .apply_move(before.board, from, to, promotion)
            .expect("generated move must be accepted");

        if let Some(key) = applied.record.captured_key {
            for later in before.board.later_boards() {
                assert!(!engine.board(later).contains(key), "{key} survived on board {}", later.get());
            }
            assert!(!engine.board(before.board).contains(key));
        }

        assert_eq!(engine.turn(), expected_next(&engine, before));

        rows.push(MoveRow {
            id: rows.len() as i64 + 1,
            board: before.board,
            action: MoveAction::Move { from, to, promotion },
        });
    }
    (engine, rows)
}

#[test]
fn test_random_matches_follow_cursor_rule() {
    for seed in 0..12 {
        let (engine, _) = random_match(seed);
        assert_eq!(engine.match_result().is_some(), engine.all_finished());
    }
}

#[test]
fn test_replay_reproduces_random_match() {
    for seed in 100..106 {
        let (played, rows) = random_match(seed);

        let mut replica = TimeShiftEngine::new();
        let mut cursor = ReplayCursor::new();
        assert_eq!(cursor.apply_all(&mut replica, &rows), Ok(rows.len()));

        // Delivering the same rows again changes nothing.
        assert_eq!(cursor.apply_all(&mut replica, &rows), Ok(0));

        for board in BoardIndex::all() {
            assert_eq!(
                replica.board(board).position_map(),
                played.board(board).position_map()
            );
        }
        assert_eq!(replica.snapshot(), played.snapshot());
    }
}

#[test]
fn test_fen_of_fresh_boards() {
    let engine = TimeShiftEngine::new();
    for board in engine.snapshot().boards {
        assert_eq!(
            board.fen,
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        assert!(!board.finished);
    }
}
