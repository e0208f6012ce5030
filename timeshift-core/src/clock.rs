//! Two-sided chess clock shared by all three boards of a match.
//!
//! Timestamps are milliseconds supplied by the caller, so the same clock runs
//! on the server and in the browser build.

use serde::{Deserialize, Serialize};

use crate::Color;

/// Point-in-time view of a [`MatchClock`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub white_ms: u64,
    pub black_ms: u64,
    pub active_color: Color,
    pub running: bool,
}

impl ClockSnapshot {
    pub fn remaining(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchClock {
    initial_ms: u64,
    remaining: [u64; 2],
    active: Color,
    running: bool,
    /// Last time elapsed time was charged.
    anchor: u64,
}

impl MatchClock {
    /// Both sides start with `initial_ms`; White is active; not running.
    pub fn new(initial_ms: u64) -> MatchClock {
        MatchClock {
            initial_ms,
            remaining: [initial_ms; 2],
            active: Color::White,
            running: false,
            anchor: 0,
        }
    }

    #[inline]
    pub fn initial_ms(&self) -> u64 {
        self.initial_ms
    }

    #[inline]
    pub fn active(&self) -> Color {
        self.active
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begin counting down for the active color. No-op while running.
    pub fn start(&mut self, now: u64) {
        if self.running {
            return;
        }
        self.running = true;
        self.anchor = now;
    }

    /// Charge the outgoing color and hand the clock to `next`.
    pub fn switch_turn(&mut self, next: Color, now: u64) {
        self.tick(now);
        self.active = next;
        self.anchor = now;
    }

    /// Charge elapsed time and stop. No-op while stopped.
    pub fn pause(&mut self, now: u64) {
        if !self.running {
            return;
        }
        self.tick(now);
        self.running = false;
    }

    /// The color whose time has run out, if any. White is checked first.
    pub fn is_flagged(&mut self, now: u64) -> Option<Color> {
        self.tick(now);
        Color::all().find(|c| self.remaining[c.index()] == 0)
    }

    pub fn snapshot(&mut self, now: u64) -> ClockSnapshot {
        self.tick(now);
        self.peek()
    }

    /// Snapshot without charging elapsed time.
    pub fn peek(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_ms: self.remaining[Color::White.index()],
            black_ms: self.remaining[Color::Black.index()],
            active_color: self.active,
            running: self.running,
        }
    }

    /// Adopt an authoritative snapshot taken elsewhere, counting from `now`.
    pub fn set_from_snapshot(&mut self, snapshot: &ClockSnapshot, now: u64) {
        self.remaining = [snapshot.white_ms, snapshot.black_ms];
        self.active = snapshot.active_color;
        self.running = snapshot.running;
        self.anchor = now;
    }

    fn tick(&mut self, now: u64) {
        if !self.running {
            return;
        }
        let elapsed = now.saturating_sub(self.anchor);
        let slot = &mut self.remaining[self.active.index()];
        *slot = slot.saturating_sub(elapsed);
        self.anchor = self.anchor.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_MINUTES: u64 = 180_000;

    #[test]
    fn test_new_clock_is_idle() {
        let mut clock = MatchClock::new(THREE_MINUTES);
        let snap = clock.snapshot(50_000);
        assert_eq!(snap.white_ms, THREE_MINUTES);
        assert_eq!(snap.black_ms, THREE_MINUTES);
        assert_eq!(snap.active_color, Color::White);
        assert!(!snap.running);
    }

    #[test]
    fn test_switch_turn_charges_previous_color() {
        let mut clock = MatchClock::new(THREE_MINUTES);
        clock.start(1_000);
        clock.switch_turn(Color::Black, 6_000);
        let snap = clock.snapshot(6_000);
        assert_eq!(snap.white_ms, 175_000);
        assert_eq!(snap.black_ms, THREE_MINUTES);
        assert_eq!(snap.active_color, Color::Black);
        assert!(snap.running);
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut clock = MatchClock::new(THREE_MINUTES);
        clock.start(0);
        clock.start(4_000);
        assert_eq!(clock.snapshot(5_000).white_ms, 175_000);
    }

    #[test]
    fn test_pause_stops_charging() {
        let mut clock = MatchClock::new(THREE_MINUTES);
        clock.start(0);
        clock.pause(2_000);
        clock.pause(9_000);
        let snap = clock.snapshot(60_000);
        assert_eq!(snap.white_ms, 178_000);
        assert!(!snap.running);
    }

    #[test]
    fn test_backwards_timestamp_charges_nothing() {
        let mut clock = MatchClock::new(THREE_MINUTES);
        clock.start(10_000);
        assert_eq!(clock.snapshot(5_000).white_ms, THREE_MINUTES);
        // The anchor does not move backwards either.
        assert_eq!(clock.snapshot(12_000).white_ms, 178_000);
    }

    #[test]
    fn test_is_flagged_reports_only_flagged_color() {
        let mut clock = MatchClock::new(1_000);
        clock.start(0);
        assert_eq!(clock.is_flagged(999), None);
        clock.switch_turn(Color::Black, 999);
        assert_eq!(clock.is_flagged(1_500), None);
        assert_eq!(clock.is_flagged(2_000), Some(Color::Black));
        let snap = clock.snapshot(2_000);
        assert_eq!(snap.black_ms, 0);
        assert_eq!(snap.white_ms, 1);
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let mut clock = MatchClock::new(1_000);
        clock.start(0);
        assert_eq!(clock.snapshot(1_000_000).white_ms, 0);
        assert_eq!(clock.is_flagged(1_000_001), Some(Color::White));
    }

    #[test]
    fn test_set_from_snapshot_resumes() {
        let mut server = MatchClock::new(THREE_MINUTES);
        server.start(0);
        server.switch_turn(Color::Black, 30_000);
        let snap = server.snapshot(40_000);

        let mut browser = MatchClock::new(THREE_MINUTES);
        browser.set_from_snapshot(&snap, 500);
        let local = browser.snapshot(1_500);
        assert_eq!(local.white_ms, 150_000);
        assert_eq!(local.black_ms, 169_000);
        assert_eq!(local.active_color, Color::Black);
    }
}
