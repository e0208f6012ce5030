//! Error types for the store, sessions and the service layer.

use timeshift_core::RejectReason;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, detail: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            table,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The engine refused the move or board resignation.
    #[error("{0}")]
    Rejected(#[from] RejectReason),

    /// Actor does not control the active (board, color) pair.
    #[error("not_allowed")]
    NotAllowed,

    #[error("match already ended")]
    AlreadyEnded,

    #[error("invalid participants: {0}")]
    Participants(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Code sent back to the client in `move_rejected`.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Rejected(reason) => reason.code(),
            SessionError::NotAllowed => "not_allowed",
            SessionError::AlreadyEnded => "match_ended",
            SessionError::Participants(_) | SessionError::Store(_) => "server_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown player: {0}")]
    UnknownPlayer(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "bad_request",
            ServiceError::UnknownPlayer(_) => "unknown_player",
            ServiceError::UnknownSession(_) => "unknown_session",
            ServiceError::Session(err) => err.code(),
            ServiceError::Store(_) => "server_error",
        }
    }
}
