//! FIFO matchmaking queues, one per mode.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::{Mode, TimeControl};

/// A player waiting for a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub player_id: String,
    pub time_control: TimeControl,
}

/// Entries removed from a queue to form one match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchGroup {
    pub mode: Mode,
    /// Requested by the entry that completed the group.
    pub time_control: TimeControl,
    /// Oldest first.
    pub entries: Vec<QueueEntry>,
}

impl MatchGroup {
    pub fn player_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.player_id.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct Queues {
    solo: VecDeque<QueueEntry>,
    team: VecDeque<QueueEntry>,
    /// Players taken into a group whose match is still being created.
    forming: HashSet<String>,
}

impl Queues {
    fn get_mut(&mut self, mode: Mode) -> &mut VecDeque<QueueEntry> {
        match mode {
            Mode::Solo => &mut self.solo,
            Mode::Team => &mut self.team,
        }
    }

    fn is_queued(&self, player_id: &str) -> bool {
        self.solo.iter().chain(&self.team).any(|e| e.player_id == player_id)
    }

    fn remove(&mut self, player_id: &str) -> bool {
        let before = self.solo.len() + self.team.len();
        self.solo.retain(|e| e.player_id != player_id);
        self.team.retain(|e| e.player_id != player_id);
        let forming = self.forming.remove(player_id);
        forming || self.solo.len() + self.team.len() != before
    }

    fn push(&mut self, mode: Mode, player_id: &str, time_control: TimeControl) -> bool {
        if self.is_queued(player_id) {
            return false;
        }
        self.get_mut(mode).push_back(QueueEntry {
            player_id: player_id.to_string(),
            time_control,
        });
        true
    }

    fn take(&mut self, mode: Mode) -> Option<MatchGroup> {
        let need = mode.threshold();
        let queue = self.get_mut(mode);
        if queue.len() < need {
            return None;
        }
        let entries: Vec<QueueEntry> = queue.drain(..need).collect();
        let time_control = entries.last()?.time_control;
        self.forming.extend(entries.iter().map(|e| e.player_id.clone()));
        Some(MatchGroup {
            mode,
            time_control,
            entries,
        })
    }
}

/// Both queues behind one lock, so every operation is atomic with respect to
/// the others.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queues: Mutex<Queues>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the back of the `mode` queue. A player already waiting in
    /// any queue is refused.
    pub fn enqueue(&self, mode: Mode, player_id: &str, time_control: TimeControl) -> bool {
        self.lock().push(mode, player_id, time_control)
    }

    /// Move `player_id` to the back of the `mode` queue and take a group if
    /// that completes one, as a single step.
    pub fn join(&self, mode: Mode, player_id: &str, time_control: TimeControl) -> Option<MatchGroup> {
        let mut queues = self.lock();
        queues.remove(player_id);
        queues.push(mode, player_id, time_control);
        queues.take(mode)
    }

    /// Remove every entry of `player_id` from every queue, including a group
    /// still being formed. Returns true if anything was removed.
    pub fn dequeue_actor(&self, player_id: &str) -> bool {
        self.lock().remove(player_id)
    }

    /// Take exactly `mode.threshold()` oldest entries, or nothing.
    pub fn try_match(&self, mode: Mode) -> Option<MatchGroup> {
        self.lock().take(mode)
    }

    /// The group became a match.
    pub fn release(&self, group: &MatchGroup) {
        let mut queues = self.lock();
        for entry in &group.entries {
            queues.forming.remove(&entry.player_id);
        }
    }

    /// The group could not become a match: put its players back at the head
    /// of the queue in their original order. Players who left meanwhile, or
    /// who are already queued again, are not restored; each player returns once.
    pub fn requeue_front(&self, group: MatchGroup) {
        let mut queues = self.lock();
        let mut restored = Vec::with_capacity(group.entries.len());
        for entry in group.entries {
            if queues.forming.remove(&entry.player_id) && !queues.is_queued(&entry.player_id) {
                restored.push(entry);
            }
        }
        let queue = queues.get_mut(group.mode);
        for entry in restored.into_iter().rev() {
            queue.push_front(entry);
        }
    }

    pub fn queue_len(&self, mode: Mode) -> usize {
        self.lock().get_mut(mode).len()
    }
}
