//! Records shared by the store, sessions and the wire protocol.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use timeshift_core::{BoardIndex, Color, MatchResult, MoveAction, MoveRow};

/// Rating given to players with no stored rating.
pub const DEFAULT_RATING: i64 = 1200;

/// Wall clock in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// RFC 3339 timestamp for persisted rows.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Match parameters
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Two players, each owning one color on all three boards.
    Solo,
    /// Six players, each owning one color on one board.
    Team,
}

impl Mode {
    /// Number of queued players that forms a match.
    pub fn threshold(self) -> usize {
        match self {
            Mode::Solo => 2,
            Mode::Team => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Solo => "solo",
            Mode::Team => "team",
        }
    }

    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "solo" => Some(Mode::Solo),
            "team" => Some(Mode::Team),
            _ => None,
        }
    }
}

/// Allowed time controls. On the wire: `"180"` or `"600"` seconds.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeControl {
    ThreeMinutes,
    TenMinutes,
}

impl TimeControl {
    pub fn seconds(self) -> u64 {
        match self {
            TimeControl::ThreeMinutes => 180,
            TimeControl::TenMinutes => 600,
        }
    }

    pub fn millis(self) -> u64 {
        self.seconds() * 1000
    }

    pub fn from_millis(ms: i64) -> Option<TimeControl> {
        match ms {
            180_000 => Some(TimeControl::ThreeMinutes),
            600_000 => Some(TimeControl::TenMinutes),
            _ => None,
        }
    }
}

impl TryFrom<String> for TimeControl {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim() {
            "180" => Ok(TimeControl::ThreeMinutes),
            "600" => Ok(TimeControl::TenMinutes),
            other => Err(format!("unsupported time control: {other}")),
        }
    }
}

impl From<TimeControl> for String {
    fn from(tc: TimeControl) -> String {
        tc.seconds().to_string()
    }
}

/// How a match ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Checkmate,
    Timeout,
    Resign,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Checkmate => "checkmate",
            Termination::Timeout => "timeout",
            Termination::Resign => "resign",
        }
    }

    pub fn parse(s: &str) -> Option<Termination> {
        match s {
            "checkmate" => Some(Termination::Checkmate),
            "timeout" => Some(Termination::Timeout),
            "resign" => Some(Termination::Resign),
            _ => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Persisted records
// =============================================================================

/// Which color (and, in Team mode, which board) a player controls.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub player_id: String,
    pub color: Color,
    /// `None` in Solo mode: the player moves on every board.
    pub board_role: Option<BoardIndex>,
}

impl Assignment {
    /// 1 for White, 2 for Black.
    pub fn team_index(&self) -> u8 {
        match self.color {
            Color::White => 1,
            Color::Black => 2,
        }
    }

    /// May this assignment move `color` on `board`?
    pub fn covers(&self, color: Color, board: BoardIndex) -> bool {
        self.color == color && self.board_role.map_or(true, |role| role == board)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub username: String,
    pub rating: i64,
    pub created_at: String,
}

/// Row written when a match is created.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MatchHeader {
    pub id: String,
    pub mode: Mode,
    pub time_control: TimeControl,
    pub created_at: String,
}

/// A match as persisted, including its outcome once finished.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: String,
    pub mode: Mode,
    pub time_control_ms: u64,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub result: Option<MatchResult>,
    pub termination: Option<Termination>,
    pub assignments: Vec<Assignment>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRecord {
    pub id: i64,
    pub player_id: String,
    pub match_id: String,
    pub old_rating: i64,
    pub new_rating: i64,
    pub created_at: String,
}

/// Entry about to be written to the move log.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NewMove {
    pub board: BoardIndex,
    pub action: MoveAction,
}

/// Move log row: a move or a board resignation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMove {
    pub id: i64,
    pub match_id: String,
    pub player_id: String,
    pub board: BoardIndex,
    #[serde(flatten)]
    pub action: MoveAction,
    pub created_at: String,
}

impl StoredMove {
    /// The part a replay cursor needs.
    pub fn row(&self) -> MoveRow {
        MoveRow {
            id: self.id,
            board: self.board,
            action: self.action,
        }
    }
}

/// Everything `finish_match` needs to close a match.
#[derive(Clone, Debug)]
pub struct FinishMatch<'a> {
    pub match_id: &'a str,
    pub result: MatchResult,
    pub termination: Termination,
    pub ended_at: &'a str,
    pub k_factor: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_control_wire_values() {
        let tc: TimeControl = serde_json::from_str("\"180\"").unwrap();
        assert_eq!(tc, TimeControl::ThreeMinutes);
        assert_eq!(tc.millis(), 180_000);
        assert_eq!(serde_json::to_string(&TimeControl::TenMinutes).unwrap(), "\"600\"");
        assert!(serde_json::from_str::<TimeControl>("\"300\"").is_err());
    }

    #[test]
    fn test_mode_thresholds() {
        assert_eq!(Mode::Solo.threshold(), 2);
        assert_eq!(Mode::Team.threshold(), 6);
        assert_eq!(Mode::parse("team"), Some(Mode::Team));
    }

    #[test]
    fn test_assignment_coverage() {
        let solo = Assignment {
            player_id: "a".into(),
            color: Color::White,
            board_role: None,
        };
        assert!(solo.covers(Color::White, BoardIndex::THREE));
        assert!(!solo.covers(Color::Black, BoardIndex::ONE));

        let team = Assignment {
            player_id: "b".into(),
            color: Color::Black,
            board_role: Some(BoardIndex::TWO),
        };
        assert!(team.covers(Color::Black, BoardIndex::TWO));
        assert!(!team.covers(Color::Black, BoardIndex::ONE));
        assert_eq!(team.team_index(), 2);
    }
}
