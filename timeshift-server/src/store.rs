//! Persistence: players, matches, the move log and rating history.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use timeshift_core::{BoardIndex, Color, MatchResult, MoveAction, PieceKind, Square};

use crate::error::StoreError;
use crate::model::{
    timestamp, Assignment, FinishMatch, MatchHeader, MatchRecord, Mode, NewMove, PlayerRecord,
    RatingRecord, StoredMove, Termination, DEFAULT_RATING,
};
use crate::rating::{update_ratings, Participant};

/// Storage seam used by sessions and the service. Every method is atomic.
pub trait MatchStore: Send + Sync {
    fn create_player(&self, username: &str) -> Result<PlayerRecord, StoreError>;

    fn player(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError>;

    /// Header and assignment rows, in one transaction.
    fn insert_match(&self, header: &MatchHeader, assignments: &[Assignment]) -> Result<(), StoreError>;

    /// Append a move or board resignation to the log. Returns the row id.
    fn record_move(&self, match_id: &str, player_id: &str, mv: &NewMove) -> Result<i64, StoreError>;

    /// Move log rows with id > `after_id`, in id order.
    fn moves_after(&self, match_id: &str, after_id: i64) -> Result<Vec<StoredMove>, StoreError>;

    /// Stamp the outcome and write rating rows, in one transaction.
    /// Returns no rows when the match was already finished.
    fn finish_match(&self, finish: &FinishMatch<'_>) -> Result<Vec<RatingRecord>, StoreError>;

    fn match_record(&self, id: &str) -> Result<Option<MatchRecord>, StoreError>;

    fn rating_history(&self, player_id: &str) -> Result<Vec<RatingRecord>, StoreError>;
}

// =============================================================================
// SQLite
// =============================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    id          TEXT PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    rating      INTEGER NOT NULL DEFAULT 1200,
    created_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS matches (
    id               TEXT PRIMARY KEY,
    mode             TEXT NOT NULL,
    time_control_ms  INTEGER NOT NULL,
    created_at       TEXT NOT NULL,
    ended_at         TEXT,
    result           TEXT,
    termination      TEXT
);
CREATE TABLE IF NOT EXISTS match_players (
    match_id    TEXT NOT NULL REFERENCES matches(id),
    user_id     TEXT NOT NULL,
    color       TEXT NOT NULL,
    board_role  INTEGER,
    team_index  INTEGER NOT NULL,
    PRIMARY KEY (match_id, user_id)
);
CREATE TABLE IF NOT EXISTS match_moves (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id     TEXT NOT NULL REFERENCES matches(id),
    user_id      TEXT NOT NULL,
    board_index  INTEGER NOT NULL,
    kind         TEXT NOT NULL DEFAULT 'move',
    from_square  TEXT,
    to_square    TEXT,
    promotion    TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_match_moves_match ON match_moves(match_id, id);
CREATE TABLE IF NOT EXISTS rating_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT NOT NULL,
    match_id    TEXT NOT NULL REFERENCES matches(id),
    old_rating  INTEGER NOT NULL,
    new_rating  INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rating_history_user ON rating_history(user_id, id);
";

/// SQLite-backed store. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn color_code(color: Color) -> String {
    color.letter().to_string()
}

fn parse_color(table: &'static str, s: &str) -> Result<Color, StoreError> {
    match s {
        "w" => Ok(Color::White),
        "b" => Ok(Color::Black),
        other => Err(StoreError::corrupt(table, format!("color {other:?}"))),
    }
}

fn parse_board(table: &'static str, n: i64) -> Result<BoardIndex, StoreError> {
    u8::try_from(n)
        .ok()
        .and_then(BoardIndex::new)
        .ok_or_else(|| StoreError::corrupt(table, format!("board {n}")))
}

fn parse_square(table: &'static str, s: &str) -> Result<Square, StoreError> {
    s.parse()
        .map_err(|e: timeshift_core::ParseSquareError| StoreError::corrupt(table, e.to_string()))
}

fn promotion_code(kind: PieceKind) -> String {
    kind.letter().to_ascii_lowercase().to_string()
}

/// `match_moves` columns before validation.
struct RawMove {
    id: i64,
    match_id: String,
    player_id: String,
    board: i64,
    kind: String,
    from: Option<String>,
    to: Option<String>,
    promotion: Option<String>,
    created_at: String,
}

fn parse_action(table: &'static str, raw: &RawMove) -> Result<MoveAction, StoreError> {
    match (raw.kind.as_str(), &raw.from, &raw.to) {
        ("move", Some(from), Some(to)) => {
            let promotion = match &raw.promotion {
                Some(code) => Some(
                    PieceKind::from_promotion(code)
                        .ok_or_else(|| StoreError::corrupt(table, format!("promotion {code:?}")))?,
                ),
                None => None,
            };
            Ok(MoveAction::Move {
                from: parse_square(table, from)?,
                to: parse_square(table, to)?,
                promotion,
            })
        }
        ("resign_board", _, _) => Ok(MoveAction::ResignBoard),
        (kind, _, _) => Err(StoreError::corrupt(table, format!("row {} of kind {kind:?}", raw.id))),
    }
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    Ok(PlayerRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        rating: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn rating_from_row(row: &Row<'_>) -> rusqlite::Result<RatingRecord> {
    Ok(RatingRecord {
        id: row.get(0)?,
        player_id: row.get(1)?,
        match_id: row.get(2)?,
        old_rating: row.get(3)?,
        new_rating: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl MatchStore for SqliteStore {
    fn create_player(&self, username: &str) -> Result<PlayerRecord, StoreError> {
        let record = PlayerRecord {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            rating: DEFAULT_RATING,
            created_at: timestamp(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO players (id, username, rating, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.username, record.rating, record.created_at],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::UsernameTaken(username.to_string())
            } else {
                StoreError::Sqlite(e)
            }
        })?;
        Ok(record)
    }

    fn player(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError> {
        let conn = self.conn()?;
        let player = conn
            .query_row(
                "SELECT id, username, rating, created_at FROM players WHERE id = ?1",
                [id],
                player_from_row,
            )
            .optional()?;
        Ok(player)
    }

    fn insert_match(&self, header: &MatchHeader, assignments: &[Assignment]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO matches (id, mode, time_control_ms, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                header.id,
                header.mode.as_str(),
                header.time_control.millis() as i64,
                header.created_at
            ],
        )?;
        for a in assignments {
            tx.execute(
                "INSERT INTO match_players (match_id, user_id, color, board_role, team_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    header.id,
                    a.player_id,
                    color_code(a.color),
                    a.board_role.map(BoardIndex::get),
                    a.team_index()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn record_move(&self, match_id: &str, player_id: &str, mv: &NewMove) -> Result<i64, StoreError> {
        let (from, to, promotion) = match mv.action {
            MoveAction::Move { from, to, promotion } => {
                (Some(from.to_string()), Some(to.to_string()), promotion.map(promotion_code))
            }
            MoveAction::ResignBoard => (None, None, None),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO match_moves
                (match_id, user_id, board_index, kind, from_square, to_square, promotion, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                match_id,
                player_id,
                mv.board.get(),
                mv.action.kind(),
                from,
                to,
                promotion,
                timestamp()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn moves_after(&self, match_id: &str, after_id: i64) -> Result<Vec<StoredMove>, StoreError> {
        const TABLE: &str = "match_moves";
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, match_id, user_id, board_index, kind, from_square, to_square, promotion,
                    created_at
             FROM match_moves WHERE match_id = ?1 AND id > ?2 ORDER BY id",
        )?;
        let raw = stmt
            .query_map(params![match_id, after_id], |row| {
                Ok(RawMove {
                    id: row.get(0)?,
                    match_id: row.get(1)?,
                    player_id: row.get(2)?,
                    board: row.get(3)?,
                    kind: row.get(4)?,
                    from: row.get(5)?,
                    to: row.get(6)?,
                    promotion: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|raw| {
                Ok(StoredMove {
                    id: raw.id,
                    board: parse_board(TABLE, raw.board)?,
                    action: parse_action(TABLE, &raw)?,
                    match_id: raw.match_id,
                    player_id: raw.player_id,
                    created_at: raw.created_at,
                })
            })
            .collect()
    }

    fn finish_match(&self, finish: &FinishMatch<'_>) -> Result<Vec<RatingRecord>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE matches SET ended_at = ?1, result = ?2, termination = ?3
             WHERE id = ?4 AND ended_at IS NULL",
            params![
                finish.ended_at,
                finish.result.as_str(),
                finish.termination.as_str(),
                finish.match_id
            ],
        )?;
        if updated == 0 {
            debug!(match_id = finish.match_id, "finish_match: already finished");
            return Ok(Vec::new());
        }

        let participants = {
            let mut stmt = tx.prepare(
                "SELECT mp.user_id, mp.color, COALESCE(p.rating, ?2)
                 FROM match_players mp LEFT JOIN players p ON p.id = mp.user_id
                 WHERE mp.match_id = ?1
                 ORDER BY mp.team_index, mp.board_role",
            )?;
            let rows = stmt
                .query_map(params![finish.match_id, DEFAULT_RATING], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(player_id, color, rating)| {
                    Ok(Participant {
                        player_id,
                        color: parse_color("match_players", &color)?,
                        rating,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?
        };

        let mut records = Vec::with_capacity(participants.len());
        for change in update_ratings(&participants, finish.result, finish.k_factor) {
            tx.execute(
                "INSERT INTO rating_history (user_id, match_id, old_rating, new_rating, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    change.player_id,
                    finish.match_id,
                    change.old_rating,
                    change.new_rating,
                    finish.ended_at
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE players SET rating = ?1 WHERE id = ?2",
                params![change.new_rating, change.player_id],
            )?;
            records.push(RatingRecord {
                id,
                player_id: change.player_id,
                match_id: finish.match_id.to_string(),
                old_rating: change.old_rating,
                new_rating: change.new_rating,
                created_at: finish.ended_at.to_string(),
            });
        }

        tx.commit()?;
        Ok(records)
    }

    fn match_record(&self, id: &str) -> Result<Option<MatchRecord>, StoreError> {
        const TABLE: &str = "matches";
        let conn = self.conn()?;
        let header = conn
            .query_row(
                "SELECT id, mode, time_control_ms, created_at, ended_at, result, termination
                 FROM matches WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, mode, time_control_ms, created_at, ended_at, result, termination)) = header
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT user_id, color, board_role FROM match_players
             WHERE match_id = ?1 ORDER BY team_index, board_role",
        )?;
        let assignments = stmt
            .query_map([&id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(player_id, color, role)| {
                Ok(Assignment {
                    player_id,
                    color: parse_color("match_players", &color)?,
                    board_role: role.map(|n| parse_board("match_players", n)).transpose()?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(MatchRecord {
            mode: Mode::parse(&mode).ok_or_else(|| StoreError::corrupt(TABLE, format!("mode {mode:?}")))?,
            time_control_ms: u64::try_from(time_control_ms)
                .map_err(|_| StoreError::corrupt(TABLE, "negative time control"))?,
            result: result
                .map(|r| MatchResult::parse(&r).ok_or_else(|| StoreError::corrupt(TABLE, format!("result {r:?}"))))
                .transpose()?,
            termination: termination
                .map(|t| {
                    Termination::parse(&t)
                        .ok_or_else(|| StoreError::corrupt(TABLE, format!("termination {t:?}")))
                })
                .transpose()?,
            id,
            created_at,
            ended_at,
            assignments,
        }))
    }

    fn rating_history(&self, player_id: &str) -> Result<Vec<RatingRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, match_id, old_rating, new_rating, created_at
             FROM rating_history WHERE user_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map([player_id], rating_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeControl;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn solo_match(store: &SqliteStore) -> (String, PlayerRecord, PlayerRecord) {
        let white = store.create_player("alice").unwrap();
        let black = store.create_player("bob").unwrap();
        let header = MatchHeader {
            id: "m1".to_string(),
            mode: Mode::Solo,
            time_control: TimeControl::ThreeMinutes,
            created_at: timestamp(),
        };
        let assignments = [
            Assignment {
                player_id: white.id.clone(),
                color: Color::White,
                board_role: None,
            },
            Assignment {
                player_id: black.id.clone(),
                color: Color::Black,
                board_role: None,
            },
        ];
        store.insert_match(&header, &assignments).unwrap();
        (header.id, white, black)
    }

    fn finish<'a>(match_id: &'a str, ended_at: &'a str) -> FinishMatch<'a> {
        FinishMatch {
            match_id,
            result: MatchResult::White,
            termination: Termination::Checkmate,
            ended_at,
            k_factor: 24.0,
        }
    }

    #[test]
    fn test_create_and_fetch_player() {
        let store = store();
        let created = store.create_player("alice").unwrap();
        assert_eq!(created.rating, 1200);
        assert_eq!(store.player(&created.id).unwrap(), Some(created));
        assert_eq!(store.player("nobody").unwrap(), None);
    }

    #[test]
    fn test_duplicate_username() {
        let store = store();
        store.create_player("alice").unwrap();
        assert!(matches!(
            store.create_player("alice"),
            Err(StoreError::UsernameTaken(name)) if name == "alice"
        ));
    }

    #[test]
    fn test_match_record_round_trip() {
        let store = store();
        let (id, white, _) = solo_match(&store);
        let record = store.match_record(&id).unwrap().unwrap();
        assert_eq!(record.mode, Mode::Solo);
        assert_eq!(record.time_control_ms, 180_000);
        assert_eq!(record.ended_at, None);
        assert_eq!(record.assignments.len(), 2);
        assert_eq!(record.assignments[0].player_id, white.id);
        assert_eq!(record.assignments[0].color, Color::White);
    }

    #[test]
    fn test_moves_after() {
        let store = store();
        let (id, white, black) = solo_match(&store);
        let mv = |from: &str, to: &str| NewMove {
            board: BoardIndex::ONE,
            action: MoveAction::Move {
                from: from.parse().unwrap(),
                to: to.parse().unwrap(),
                promotion: None,
            },
        };
        let first = store.record_move(&id, &white.id, &mv("e2", "e4")).unwrap();
        let second = store.record_move(&id, &black.id, &mv("e7", "e5")).unwrap();
        assert!(second > first);

        let all = store.moves_after(&id, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert!(matches!(all[0].action, MoveAction::Move { from, .. } if from.to_string() == "e2"));

        let tail = store.moves_after(&id, first).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, second);
        assert_eq!(tail[0].player_id, black.id);
    }

    #[test]
    fn test_promotion_persisted_as_letter() {
        let store = store();
        let (id, white, _) = solo_match(&store);
        let mv = NewMove {
            board: BoardIndex::TWO,
            action: MoveAction::Move {
                from: "a7".parse().unwrap(),
                to: "a8".parse().unwrap(),
                promotion: Some(PieceKind::Knight),
            },
        };
        store.record_move(&id, &white.id, &mv).unwrap();
        let rows = store.moves_after(&id, 0).unwrap();
        assert_eq!(rows[0].action, mv.action);
        assert_eq!(rows[0].board, BoardIndex::TWO);
    }

    #[test]
    fn test_board_resignation_logged() {
        let store = store();
        let (id, white, _) = solo_match(&store);
        let resign = NewMove {
            board: BoardIndex::ONE,
            action: MoveAction::ResignBoard,
        };
        let row_id = store.record_move(&id, &white.id, &resign).unwrap();

        let rows = store.moves_after(&id, 0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, MoveAction::ResignBoard);
        assert_eq!(rows[0].row().id, row_id);

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["kind"], "resign_board");
        assert_eq!(json["playerId"], white.id.as_str());
    }

    #[test]
    fn test_finish_match_once() {
        let store = store();
        let (id, white, black) = solo_match(&store);
        let ended = timestamp();

        let records = store.finish_match(&finish(&id, &ended)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(store.finish_match(&finish(&id, &ended)).unwrap().is_empty());

        assert_eq!(store.player(&white.id).unwrap().unwrap().rating, 1212);
        assert_eq!(store.player(&black.id).unwrap().unwrap().rating, 1188);
        assert_eq!(store.rating_history(&white.id).unwrap().len(), 1);
        assert_eq!(store.rating_history(&black.id).unwrap().len(), 1);

        let record = store.match_record(&id).unwrap().unwrap();
        assert_eq!(record.result, Some(MatchResult::White));
        assert_eq!(record.termination, Some(Termination::Checkmate));
        assert_eq!(record.ended_at, Some(ended));
    }

    #[test]
    fn test_unknown_participant_rated_from_default() {
        let store = store();
        let header = MatchHeader {
            id: "ghosts".to_string(),
            mode: Mode::Solo,
            time_control: TimeControl::TenMinutes,
            created_at: timestamp(),
        };
        let assignments = [
            Assignment {
                player_id: "ghost-w".into(),
                color: Color::White,
                board_role: None,
            },
            Assignment {
                player_id: "ghost-b".into(),
                color: Color::Black,
                board_role: None,
            },
        ];
        store.insert_match(&header, &assignments).unwrap();
        let ended = timestamp();
        let records = store.finish_match(&finish("ghosts", &ended)).unwrap();
        assert_eq!(records[0].old_rating, 1200);
        assert_eq!(records[1].new_rating, 1188);
    }
}
