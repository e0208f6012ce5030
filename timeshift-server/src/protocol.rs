//! WebSocket event frames. JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

use timeshift_core::{BoardIndex, Square};

use crate::model::{Mode, PlayerRecord, TimeControl};
use crate::session::MatchView;

/// Client → server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    QueueJoin {
        mode: Mode,
        time_control: TimeControl,
    },
    QueueLeave,
    #[serde(rename_all = "camelCase")]
    MoveAttempt {
        session_id: String,
        board_index: BoardIndex,
        from: Square,
        to: Square,
        /// `q`, `r`, `b` or `n`.
        #[serde(default)]
        promotion: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Resign { session_id: String },
    #[serde(rename_all = "camelCase")]
    ResignBoard { session_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Queued,
    Matched,
    Idle,
}

/// Server → client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        player: PlayerRecord,
    },
    #[serde(rename_all = "camelCase")]
    QueueStatus {
        status: QueueState,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<Mode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MoveRejected {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    MatchState(MatchView),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queue_join() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"queue_join","mode":"team","timeControl":"600"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::QueueJoin {
                mode: Mode::Team,
                time_control: TimeControl::TenMinutes,
            }
        );
    }

    #[test]
    fn test_parse_move_attempt() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"move_attempt","sessionId":"m1","boardIndex":2,"from":"e7","to":"e8","promotion":"n"}"#,
        )
        .unwrap();
        match event {
            ClientEvent::MoveAttempt {
                session_id,
                board_index,
                from,
                to,
                promotion,
            } => {
                assert_eq!(session_id, "m1");
                assert_eq!(board_index, BoardIndex::TWO);
                assert_eq!(from.to_string(), "e7");
                assert_eq!(to.to_string(), "e8");
                assert_eq!(promotion.as_deref(), Some("n"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_time_control_and_board() {
        assert!(serde_json::from_str::<ClientEvent>(
            r#"{"type":"queue_join","mode":"solo","timeControl":"60"}"#
        )
        .is_err());
        assert!(serde_json::from_str::<ClientEvent>(
            r#"{"type":"move_attempt","sessionId":"m","boardIndex":4,"from":"e2","to":"e4"}"#
        )
        .is_err());
    }

    #[test]
    fn test_serialize_queue_status() {
        let json = serde_json::to_value(ServerEvent::QueueStatus {
            status: QueueState::Matched,
            mode: Some(Mode::Solo),
            session_id: Some("m1".into()),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type":"queue_status","status":"matched","mode":"solo","sessionId":"m1"})
        );

        let idle = serde_json::to_value(ServerEvent::QueueStatus {
            status: QueueState::Idle,
            mode: None,
            session_id: None,
        })
        .unwrap();
        assert_eq!(idle, serde_json::json!({"type":"queue_status","status":"idle"}));
    }

    #[test]
    fn test_serialize_move_rejected() {
        let json = serde_json::to_value(ServerEvent::MoveRejected {
            reason: "not_active_board".into(),
            session_id: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type":"move_rejected","reason":"not_active_board"}));
    }
}
