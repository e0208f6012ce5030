//! HTTP routes and the WebSocket endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::error::{ServiceError, StoreError};
use crate::hub::ConnectionId;
use crate::model::{now_ms, MatchRecord, PlayerRecord, RatingRecord, StoredMove};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::service::GameService;
use crate::session::MatchView;

pub type AppState = Arc<GameService>;

const MAX_USERNAME_LEN: usize = 32;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorModel {
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            warn!(%detail, "request failed");
        }
        let body = ErrorModel {
            error: self.code(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UsernameTaken(name) => ApiError::Conflict(format!("username taken: {name}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownPlayer(id) => ApiError::NotFound(format!("unknown player: {id}")),
            ServiceError::UnknownSession(id) => ApiError::NotFound(format!("unknown match: {id}")),
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::Store(err) => err.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// =============================================================================
// JSON Models
// =============================================================================

#[derive(Serialize)]
struct HealthModel {
    status: &'static str,
}

#[derive(Deserialize)]
struct CreatePlayerRequest {
    username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchDetails {
    #[serde(flatten)]
    record: MatchRecord,
    /// Present while the match is running.
    live: Option<MatchView>,
}

#[derive(Deserialize)]
struct MovesQuery {
    #[serde(default)]
    after: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsParams {
    player_id: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health() -> Json<HealthModel> {
    Json(HealthModel { status: "ok" })
}

async fn create_player(
    State(service): State<AppState>,
    Json(req): Json<CreatePlayerRequest>,
) -> Result<(StatusCode, Json<PlayerRecord>), ApiError> {
    let username = req.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be 1 to {MAX_USERNAME_LEN} characters"
        )));
    }
    let player = service.store().create_player(username)?;
    Ok((StatusCode::CREATED, Json(player)))
}

async fn get_player(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerRecord>, ApiError> {
    Ok(Json(service.player(&id)?))
}

async fn get_ratings(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RatingRecord>>, ApiError> {
    service.player(&id)?;
    Ok(Json(service.store().rating_history(&id)?))
}

async fn get_match(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MatchDetails>, ApiError> {
    let record = service
        .store()
        .match_record(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("unknown match: {id}")))?;
    let live = service.live_view(&id, now_ms());
    Ok(Json(MatchDetails { record, live }))
}

async fn get_moves(
    State(service): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MovesQuery>,
) -> Result<Json<Vec<StoredMove>>, ApiError> {
    if service.store().match_record(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("unknown match: {id}")));
    }
    Ok(Json(service.store().moves_after(&id, query.after)?))
}

// =============================================================================
// WebSocket
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(service): State<AppState>,
) -> Result<Response, ApiError> {
    let player = service.player(&params.player_id)?;
    Ok(ws.on_upgrade(move |socket| async move {
        let (conn, rx) = service.connect(player, now_ms());
        run_socket(socket, service, params.player_id, conn, rx).await;
    }))
}

async fn run_socket(
    socket: WebSocket,
    service: AppState,
    player_id: String,
    conn: ConnectionId,
    mut rx: UnboundedReceiver<ServerEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%err, "failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => service.dispatch(&player_id, event, now_ms()),
                Err(err) => debug!(player_id = %player_id, %err, "dropping malformed frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    service.disconnect(&player_id, conn);
    writer.abort();
}

// =============================================================================
// Router
// =============================================================================

pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/players", post(create_player))
        .route("/api/players/{id}", get(get_player))
        .route("/api/players/{id}/ratings", get(get_ratings))
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/moves", get(get_moves))
        .layer(cors)
        .with_state(service)
}
