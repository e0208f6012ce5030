//! Inbound event handling: queueing, moves, resignations and the timeout sweep.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use timeshift_core::{BoardIndex, PieceKind, Square};

use crate::error::{ServiceError, SessionError};
use crate::hub::{ConnectionId, Hub};
use crate::matchmaker::{MatchGroup, Matchmaker};
use crate::model::{Mode, PlayerRecord, TimeControl};
use crate::protocol::{ClientEvent, QueueState, ServerEvent};
use crate::registry::{lock_session, SessionRegistry, SharedSession};
use crate::session::{MatchSession, MatchView, MoveOutcome};
use crate::store::MatchStore;

pub struct GameService {
    store: Arc<dyn MatchStore>,
    matchmaker: Matchmaker,
    registry: SessionRegistry,
    hub: Hub,
    rating_k: f64,
    rng: Mutex<StdRng>,
}

impl GameService {
    pub fn new(store: Arc<dyn MatchStore>, rating_k: f64) -> Self {
        Self::with_rng(store, rating_k, StdRng::from_os_rng())
    }

    /// Deterministic color assignment, for tests.
    pub fn with_rng(store: Arc<dyn MatchStore>, rating_k: f64, rng: StdRng) -> Self {
        GameService {
            store,
            matchmaker: Matchmaker::new(),
            registry: SessionRegistry::new(),
            hub: Hub::new(),
            rating_k,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &dyn MatchStore {
        self.store.as_ref()
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Look up a player before accepting their socket.
    pub fn player(&self, player_id: &str) -> Result<PlayerRecord, ServiceError> {
        self.store
            .player(player_id)?
            .ok_or_else(|| ServiceError::UnknownPlayer(player_id.to_string()))
    }

    /// Register a socket, greet the player and replay the state of any
    /// match they are still in.
    pub fn connect(
        &self,
        player: PlayerRecord,
        now: u64,
    ) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let (conn, rx) = self.hub.register(&player.id);
        let player_id = player.id.clone();
        self.hub.send(&player_id, ServerEvent::Hello { player });
        for session in self.registry.sessions_for(&player_id) {
            let view = lock_session(&session).view(now);
            self.hub.send(&player_id, ServerEvent::MatchState(view));
        }
        info!(player_id = %player_id, conn, "player connected");
        (conn, rx)
    }

    /// Socket closed: leave the queues. Running matches continue on the clock,
    /// so a player can reconnect and carry on; an absent player loses on time.
    pub fn disconnect(&self, player_id: &str, conn: ConnectionId) {
        self.matchmaker.dequeue_actor(player_id);
        self.hub.unregister(player_id, conn);
        info!(player_id, conn, "player disconnected");
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Handle an event; failures are reported to the actor as `move_rejected`.
    pub fn dispatch(&self, actor: &str, event: ClientEvent, now: u64) {
        let session_id = match &event {
            ClientEvent::MoveAttempt { session_id, .. }
            | ClientEvent::Resign { session_id }
            | ClientEvent::ResignBoard { session_id } => Some(session_id.clone()),
            _ => None,
        };
        if let Err(err) = self.handle(actor, event, now) {
            match &err {
                ServiceError::Store(_) | ServiceError::Session(SessionError::Store(_)) => {
                    warn!(actor, %err, "event failed")
                }
                _ => debug!(actor, %err, "event rejected"),
            }
            self.hub.send(
                actor,
                ServerEvent::MoveRejected {
                    reason: err.code().to_string(),
                    session_id,
                },
            );
        }
    }

    pub fn handle(&self, actor: &str, event: ClientEvent, now: u64) -> Result<(), ServiceError> {
        match event {
            ClientEvent::QueueJoin { mode, time_control } => self.queue_join(actor, mode, time_control, now),
            ClientEvent::QueueLeave => {
                self.matchmaker.dequeue_actor(actor);
                self.hub.send(
                    actor,
                    ServerEvent::QueueStatus {
                        status: QueueState::Idle,
                        mode: None,
                        session_id: None,
                    },
                );
                Ok(())
            }
            ClientEvent::MoveAttempt {
                session_id,
                board_index,
                from,
                to,
                promotion,
            } => self.move_attempt(actor, &session_id, board_index, from, to, promotion.as_deref(), now),
            ClientEvent::Resign { session_id } => {
                self.with_session(&session_id, now, |session| {
                    session.resign(self.store(), actor, now).map(|_| ())
                })
            }
            ClientEvent::ResignBoard { session_id } => {
                self.with_session(&session_id, now, |session| {
                    session.resign_board(self.store(), actor, now).map(|_| ())
                })
            }
        }
    }

    fn queue_join(
        &self,
        actor: &str,
        mode: Mode,
        time_control: TimeControl,
        now: u64,
    ) -> Result<(), ServiceError> {
        let Some(group) = self.matchmaker.join(mode, actor, time_control) else {
            self.hub.send(
                actor,
                ServerEvent::QueueStatus {
                    status: QueueState::Queued,
                    mode: Some(mode),
                    session_id: None,
                },
            );
            return Ok(());
        };

        let session = match self.create_session(&group, now) {
            Ok(session) => {
                self.matchmaker.release(&group);
                session
            }
            Err(err) => {
                self.matchmaker.requeue_front(group);
                return Err(err);
            }
        };

        let shared = self.registry.insert(session);
        let mut session = lock_session(&shared);
        for player_id in session.participants() {
            self.hub.send(
                player_id,
                ServerEvent::QueueStatus {
                    status: QueueState::Matched,
                    mode: Some(mode),
                    session_id: Some(session.id().to_string()),
                },
            );
        }
        self.broadcast_state(&mut *session, now);
        Ok(())
    }

    fn create_session(&self, group: &MatchGroup, now: u64) -> Result<MatchSession, ServiceError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let session = MatchSession::create(
            self.store(),
            group.mode,
            group.time_control,
            group.player_ids(),
            self.rating_k,
            &mut *rng,
            now,
        )?;
        Ok(session)
    }

    #[allow(clippy::too_many_arguments)]
    fn move_attempt(
        &self,
        actor: &str,
        session_id: &str,
        board: BoardIndex,
        from: Square,
        to: Square,
        promotion: Option<&str>,
        now: u64,
    ) -> Result<(), ServiceError> {
        let promotion = match promotion.filter(|p| !p.is_empty()) {
            Some(code) => Some(
                PieceKind::from_promotion(code)
                    .ok_or_else(|| ServiceError::Validation(format!("bad promotion {code:?}")))?,
            ),
            None => None,
        };
        self.with_session(session_id, now, |session| {
            let outcome = session.apply_move(self.store(), actor, board, from, to, promotion, now)?;
            if let MoveOutcome::Applied(record) = &outcome {
                debug!(
                    match_id = session.id(),
                    board = record.board.get(),
                    from = %record.from,
                    to = %record.to,
                    "move applied"
                );
            }
            Ok(())
        })
    }

    /// Run `op` under the session lock. On success the new state is pushed to
    /// every participant; an ended session leaves the registry.
    fn with_session<F>(&self, session_id: &str, now: u64, op: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut MatchSession) -> Result<(), SessionError>,
    {
        let shared = self
            .registry
            .get(session_id)
            .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;
        let mut session = lock_session(&shared);
        op(&mut *session)?;
        self.broadcast_state(&mut *session, now);
        if session.is_ended() {
            self.registry.remove(session_id);
        }
        Ok(())
    }

    fn broadcast_state(&self, session: &mut MatchSession, now: u64) {
        let event = ServerEvent::MatchState(session.view(now));
        self.hub.broadcast(session.participants(), &event);
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// End flagged matches. Returns how many ended.
    pub fn sweep_timeouts(&self, now: u64) -> usize {
        let mut ended = 0;
        for shared in self.registry.all() {
            let mut session = lock_session(&shared);
            match session.tick(self.store(), now) {
                Ok(true) => {
                    ended += 1;
                    self.broadcast_state(&mut *session, now);
                }
                Ok(false) => {}
                Err(err) => warn!(match_id = session.id(), %err, "sweep failed to finish match"),
            }
            if session.is_ended() {
                self.registry.remove(session.id());
            }
        }
        ended
    }

    /// Current state of a live match.
    pub fn live_view(&self, session_id: &str, now: u64) -> Option<MatchView> {
        let shared: SharedSession = self.registry.get(session_id)?;
        let view = lock_session(&shared).view(now);
        Some(view)
    }
}
