//! Server side of time-shift chess.
//!
//! ```text
//! socket ──ClientEvent──> GameService ──> Matchmaker ──> MatchSession::create
//!                              │                               │
//!                              ├──> SessionRegistry ──lock──> MatchSession ──> MatchStore
//!                              │
//!                              └──> Hub ──ServerEvent──> every participant's socket
//! ```
//!
//! Each live match sits behind its own mutex; moves, resignations and the
//! periodic timeout sweep all take that lock, so a match has a single writer.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod matchmaker;
pub mod model;
pub mod protocol;
pub mod rating;
pub mod registry;
pub mod service;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{ServiceError, SessionError, StoreError};
pub use model::{now_ms, Mode, TimeControl, Termination};
pub use service::GameService;
pub use store::{MatchStore, SqliteStore};
