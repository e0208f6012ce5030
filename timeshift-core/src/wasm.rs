//! WASM bindings for timeshift-core
//!
//! Lets the browser client run the same engine, replay cursor and clock as
//! the server.

use wasm_bindgen::prelude::*;

use crate::{
    BoardIndex, ClockSnapshot, Color, MatchClock, MoveRow, PieceKind, ReplayCursor, ReplayStep,
    Square, StandardRules, TimeShiftEngine,
};

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

fn parse_move(board: u8, from: &str, to: &str) -> Option<(BoardIndex, Square, Square)> {
    Some((BoardIndex::new(board)?, from.parse().ok()?, to.parse().ok()?))
}

/// Local engine plus catch-up cursor.
#[wasm_bindgen]
pub struct WasmEngine {
    inner: TimeShiftEngine<StandardRules>,
    cursor: ReplayCursor,
}

#[wasm_bindgen]
impl WasmEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmEngine {
        WasmEngine {
            inner: TimeShiftEngine::new(),
            cursor: ReplayCursor::new(),
        }
    }

    /// Snapshot as a JS object: { turn, boards: [{ index, finished, result, position, fen }] }
    pub fn snapshot(&self) -> JsValue {
        to_js(&self.inner.snapshot())
    }

    /// Try a move locally. Returns null on success, otherwise the reject code.
    #[wasm_bindgen(js_name = applyMove)]
    pub fn apply_move(
        &mut self,
        board: u8,
        from: &str,
        to: &str,
        promotion: Option<String>,
    ) -> Option<String> {
        let Some((board, from, to)) = parse_move(board, from, to) else {
            return Some("illegal_move".to_string());
        };
        let promotion = promotion.as_deref().and_then(PieceKind::from_promotion);
        match self.inner.apply_move(board, from, to, promotion) {
            Ok(_) => None,
            Err(reason) => Some(reason.code().to_string()),
        }
    }

    /// Is (board, color) allowed to move right now? `color` is "w" or "b".
    #[wasm_bindgen(js_name = isActive)]
    pub fn is_active(&self, board: u8, color: &str) -> bool {
        let turn = self.inner.turn();
        let color = match color {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return false,
        };
        turn.board.get() == board && turn.color == color
    }

    /// "white", "black", "draw", or undefined while the match is running.
    #[wasm_bindgen(js_name = matchResult)]
    pub fn match_result(&self) -> Option<String> {
        self.inner.match_result().map(|r| r.as_str().to_string())
    }

    /// Apply server move rows. Returns the number applied, or -1 when the
    /// local engine rejected a row and has been reset for a full resync.
    #[wasm_bindgen(js_name = applyRows)]
    pub fn apply_rows(&mut self, rows: JsValue) -> i32 {
        let rows: Vec<MoveRow> = match serde_wasm_bindgen::from_value(rows) {
            Ok(rows) => rows,
            Err(_) => return -1,
        };
        let mut applied = 0;
        for row in &rows {
            match self.cursor.apply(&mut self.inner, row) {
                ReplayStep::Skipped => {}
                ReplayStep::Applied(_) | ReplayStep::BoardResigned(_) => applied += 1,
                ReplayStep::Rejected(_) => {
                    self.resync();
                    return -1;
                }
            }
        }
        applied
    }

    /// Id of the last applied server row.
    #[wasm_bindgen(js_name = lastAppliedId)]
    pub fn last_applied_id(&self) -> f64 {
        self.cursor.last_applied() as f64
    }

    /// Start over from the initial position.
    pub fn resync(&mut self) {
        self.inner = TimeShiftEngine::new();
        self.cursor.reset();
    }

    /// Legal destinations from `from` on `board` for the side to move there.
    #[wasm_bindgen(js_name = legalTargets)]
    pub fn legal_targets(&self, board: u8, from: &str) -> Vec<String> {
        let (Some(board), Ok(from)) = (BoardIndex::new(board), from.parse::<Square>()) else {
            return vec![];
        };
        let state = self.inner.board(board);
        if state.is_finished() {
            return vec![];
        }
        let mut targets: Vec<String> = StandardRules::legal_moves(&state.position())
            .into_iter()
            .filter(|(f, _, _)| *f == from)
            .map(|(_, t, _)| t.to_string())
            .collect();
        targets.dedup();
        targets
    }
}

impl Default for WasmEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Display clock synced from server snapshots.
#[wasm_bindgen]
pub struct WasmClock {
    inner: MatchClock,
}

#[wasm_bindgen]
impl WasmClock {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_ms: f64) -> WasmClock {
        WasmClock {
            inner: MatchClock::new(initial_ms.max(0.0) as u64),
        }
    }

    /// Adopt a server `ClockSnapshot` object at local time `now`.
    #[wasm_bindgen(js_name = setFromSnapshot)]
    pub fn set_from_snapshot(&mut self, snapshot: JsValue, now: f64) -> bool {
        match serde_wasm_bindgen::from_value::<ClockSnapshot>(snapshot) {
            Ok(snap) => {
                self.inner.set_from_snapshot(&snap, now as u64);
                true
            }
            Err(_) => false,
        }
    }

    pub fn snapshot(&mut self, now: f64) -> JsValue {
        to_js(&self.inner.snapshot(now as u64))
    }

    pub fn pause(&mut self, now: f64) {
        self.inner.pause(now as u64);
    }
}
