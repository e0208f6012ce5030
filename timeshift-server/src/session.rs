//! One match from creation to its final rating update.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use timeshift_core::{
    BoardIndex, ClockSnapshot, Color, EngineSnapshot, MatchClock, MatchResult, MoveAction,
    MoveRecord, PieceKind, Square, TimeShiftEngine,
};

use crate::error::SessionError;
use crate::model::{
    timestamp, Assignment, FinishMatch, MatchHeader, Mode, NewMove, Termination, TimeControl,
};
use crate::store::MatchStore;

/// Outcome of a move attempt that changed the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied(MoveRecord),
    /// The mover's clock had already run out; the match ended instead.
    FlagFell(Color),
}

/// Full state pushed to clients as `match_state`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub session_id: String,
    pub mode: Mode,
    pub time_control_ms: u64,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub result: Option<MatchResult>,
    pub termination: Option<Termination>,
    pub engine: EngineSnapshot,
    pub clock: ClockSnapshot,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug)]
pub struct MatchSession {
    id: String,
    mode: Mode,
    time_control: TimeControl,
    created_at: String,
    ended_at: Option<String>,
    result: Option<MatchResult>,
    termination: Option<Termination>,
    /// How the engine's decided result ended, while its close is pending.
    decided: Option<Termination>,
    assignments: Vec<Assignment>,
    engine: TimeShiftEngine,
    clock: MatchClock,
    rating_k: f64,
}

/// Shuffle participants into colors (and boards, in Team mode).
fn assign<R: Rng + ?Sized>(mode: Mode, mut participants: Vec<String>, rng: &mut R) -> Vec<Assignment> {
    participants.shuffle(rng);
    match mode {
        Mode::Solo => participants
            .into_iter()
            .zip([Color::White, Color::Black])
            .map(|(player_id, color)| Assignment {
                player_id,
                color,
                board_role: None,
            })
            .collect(),
        Mode::Team => participants
            .into_iter()
            .enumerate()
            .map(|(i, player_id)| Assignment {
                player_id,
                color: if i < 3 { Color::White } else { Color::Black },
                board_role: BoardIndex::new((i % 3) as u8 + 1),
            })
            .collect(),
    }
}

impl MatchSession {
    /// Assign colors, persist the match and start the clock.
    pub fn create<R: Rng + ?Sized>(
        store: &dyn MatchStore,
        mode: Mode,
        time_control: TimeControl,
        participants: Vec<String>,
        rating_k: f64,
        rng: &mut R,
        now: u64,
    ) -> Result<MatchSession, SessionError> {
        if participants.len() != mode.threshold() {
            return Err(SessionError::Participants(format!(
                "{} needs {} players, got {}",
                mode.as_str(),
                mode.threshold(),
                participants.len()
            )));
        }
        let distinct: HashSet<&String> = participants.iter().collect();
        if distinct.len() != participants.len() {
            return Err(SessionError::Participants("duplicate player".to_string()));
        }

        let assignments = assign(mode, participants, rng);
        let header = MatchHeader {
            id: Uuid::new_v4().to_string(),
            mode,
            time_control,
            created_at: timestamp(),
        };
        store.insert_match(&header, &assignments)?;

        let mut clock = MatchClock::new(time_control.millis());
        clock.start(now);

        info!(
            match_id = %header.id,
            mode = mode.as_str(),
            time_control = time_control.seconds(),
            "match created"
        );

        Ok(MatchSession {
            id: header.id,
            mode,
            time_control,
            created_at: header.created_at,
            ended_at: None,
            result: None,
            termination: None,
            decided: None,
            assignments,
            engine: TimeShiftEngine::new(),
            clock,
            rating_k,
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Ended, or decided by the engine with the close still pending.
    fn is_over(&self) -> bool {
        self.is_ended() || self.engine.match_result().is_some()
    }

    pub fn result(&self) -> Option<MatchResult> {
        self.result
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn engine(&self) -> &TimeShiftEngine {
        &self.engine
    }

    pub fn participants(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|a| a.player_id.as_str())
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.participants().any(|p| p == player_id)
    }

    /// Does `actor` control the active color on `board`?
    pub fn can_move(&self, actor: &str, board: BoardIndex) -> bool {
        let color = self.engine.turn().color;
        self.assignments
            .iter()
            .any(|a| a.player_id == actor && a.covers(color, board))
    }

    /// Validate, persist and commit a move. Nothing changes on error.
    ///
    /// Once the move row is written the move stands: if it decides the match
    /// and closing fails, the close is left to [`MatchSession::tick`].
    #[allow(clippy::too_many_arguments)]
    pub fn apply_move(
        &mut self,
        store: &dyn MatchStore,
        actor: &str,
        board: BoardIndex,
        from: Square,
        to: Square,
        promotion: Option<PieceKind>,
        now: u64,
    ) -> Result<MoveOutcome, SessionError> {
        if self.is_over() {
            return Err(SessionError::AlreadyEnded);
        }
        if let Some(flagged) = self.clock.is_flagged(now) {
            self.finish(store, MatchResult::win_for(flagged.opponent()), Termination::Timeout, now)?;
            return Ok(MoveOutcome::FlagFell(flagged));
        }
        if !self.can_move(actor, board) {
            return Err(SessionError::NotAllowed);
        }

        let mut next = self.engine.clone();
        let applied = next.apply_move(board, from, to, promotion)?;
        store.record_move(
            &self.id,
            actor,
            &NewMove {
                board,
                action: MoveAction::Move {
                    from,
                    to,
                    promotion: applied.record.promotion,
                },
            },
        )?;

        self.engine = next;
        self.clock.switch_turn(self.engine.turn().color, now);
        if let Some(result) = applied.match_result {
            self.settle(store, result, Termination::Checkmate, now);
        }
        Ok(MoveOutcome::Applied(applied.record))
    }

    /// The actor's whole color loses the match.
    pub fn resign(
        &mut self,
        store: &dyn MatchStore,
        actor: &str,
        now: u64,
    ) -> Result<MatchResult, SessionError> {
        if self.is_over() {
            return Err(SessionError::AlreadyEnded);
        }
        let color = self
            .assignments
            .iter()
            .find(|a| a.player_id == actor)
            .map(|a| a.color)
            .ok_or(SessionError::NotAllowed)?;
        let result = MatchResult::win_for(color.opponent());
        self.finish(store, result, Termination::Resign, now)?;
        Ok(result)
    }

    /// The actor gives up the active board only. The resignation is logged
    /// like a move so replays follow the same cursor.
    pub fn resign_board(
        &mut self,
        store: &dyn MatchStore,
        actor: &str,
        now: u64,
    ) -> Result<Option<MatchResult>, SessionError> {
        if self.is_over() {
            return Err(SessionError::AlreadyEnded);
        }
        if !self.can_move(actor, self.engine.turn().board) {
            return Err(SessionError::NotAllowed);
        }

        let mut next = self.engine.clone();
        let resignation = next.resign_active_board()?;
        store.record_move(
            &self.id,
            actor,
            &NewMove {
                board: resignation.board,
                action: MoveAction::ResignBoard,
            },
        )?;

        self.engine = next;
        self.clock.switch_turn(self.engine.turn().color, now);
        if let Some(result) = resignation.match_result {
            self.settle(store, result, Termination::Resign, now);
        }
        Ok(resignation.match_result)
    }

    /// Close the match once. Returns false if it had already ended.
    ///
    /// The outcome and rating rows are written first; if that fails the
    /// session stays active.
    pub fn finish(
        &mut self,
        store: &dyn MatchStore,
        result: MatchResult,
        termination: Termination,
        now: u64,
    ) -> Result<bool, SessionError> {
        if self.is_ended() {
            return Ok(false);
        }
        let ended_at = timestamp();
        let ratings = store
            .finish_match(&FinishMatch {
                match_id: &self.id,
                result,
                termination,
                ended_at: &ended_at,
                k_factor: self.rating_k,
            })
            .inspect_err(|err| warn!(match_id = %self.id, %err, "failed to persist match result"))?;

        self.clock.pause(now);
        self.ended_at = Some(ended_at);
        self.result = Some(result);
        self.termination = Some(termination);

        info!(
            match_id = %self.id,
            result = result.as_str(),
            termination = termination.as_str(),
            rating_rows = ratings.len(),
            "match finished"
        );
        Ok(true)
    }

    /// Close a match the engine has decided after a committed change.
    fn settle(
        &mut self,
        store: &dyn MatchStore,
        result: MatchResult,
        termination: Termination,
        now: u64,
    ) {
        self.decided = Some(termination);
        if let Err(err) = self.finish(store, result, termination, now) {
            warn!(match_id = %self.id, %err, "match decided, close left to the sweep");
        }
    }

    /// Periodic check: end the match on a flag, or retry a finish whose
    /// result is already decided. Returns true if the session ended now.
    pub fn tick(&mut self, store: &dyn MatchStore, now: u64) -> Result<bool, SessionError> {
        if self.is_ended() {
            return Ok(false);
        }
        if let Some(result) = self.engine.match_result() {
            let termination = self.decided.unwrap_or(Termination::Checkmate);
            return self.finish(store, result, termination, now);
        }
        match self.clock.is_flagged(now) {
            Some(flagged) => self.finish(
                store,
                MatchResult::win_for(flagged.opponent()),
                Termination::Timeout,
                now,
            ),
            None => Ok(false),
        }
    }

    pub fn view(&mut self, now: u64) -> MatchView {
        MatchView {
            session_id: self.id.clone(),
            mode: self.mode,
            time_control_ms: self.time_control.millis(),
            created_at: self.created_at.clone(),
            ended_at: self.ended_at.clone(),
            result: self.result,
            termination: self.termination,
            engine: self.engine.snapshot(),
            clock: self.clock.snapshot(now),
            assignments: self.assignments.clone(),
        }
    }
}
