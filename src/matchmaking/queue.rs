//! FIFO matchmaking queue.
//!
//! Arrival order is the only tie-break. Pairing takes the two oldest entries
//! in one call, so the Nth pairing is always enqueue ranks 2N-1 and 2N.

use std::collections::VecDeque;
use tokio::time::Instant;

use crate::cards::Deck;
use crate::core::{ConnectionId, UserId};
use crate::session::NewPlayer;

/// A player waiting for an opponent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchmakingEntry {
    pub connection: ConnectionId,
    pub user_id: UserId,
    pub deck: Deck,
    pub display_name: String,
    pub enqueued_at: Instant,
}

impl MatchmakingEntry {
    #[must_use]
    pub fn new(connection: ConnectionId, user_id: UserId, deck: Deck, display_name: impl Into<String>) -> Self {
        Self {
            connection,
            user_id,
            deck,
            display_name: display_name.into(),
            enqueued_at: Instant::now(),
        }
    }

    /// Seat request for the session store.
    #[must_use]
    pub fn into_new_player(self) -> NewPlayer {
        NewPlayer {
            connection: self.connection,
            user_id: self.user_id,
            display_name: self.display_name,
            deck: self.deck,
        }
    }
}

/// Outcome of `enqueue`. Positions are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    Added(usize),
    /// Connection was already waiting; nothing changed.
    AlreadyQueued(usize),
}

impl Enqueued {
    #[must_use]
    pub fn position(self) -> usize {
        match self {
            Enqueued::Added(pos) | Enqueued::AlreadyQueued(pos) => pos,
        }
    }
}

/// Two entries removed together; `first` arrived earlier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pairing {
    pub first: MatchmakingEntry,
    pub second: MatchmakingEntry,
}

/// Waiting players in arrival order.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<MatchmakingEntry>,
}

impl MatchmakingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` unless its connection is already waiting.
    pub fn enqueue(&mut self, entry: MatchmakingEntry) -> Enqueued {
        if let Some(pos) = self.position(entry.connection) {
            return Enqueued::AlreadyQueued(pos);
        }
        self.entries.push_back(entry);
        Enqueued::Added(self.entries.len())
    }

    /// Remove `conn` if present.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<MatchmakingEntry> {
        let index = self.entries.iter().position(|e| e.connection == conn)?;
        self.entries.remove(index)
    }

    /// Take the two oldest entries, if there are two.
    pub fn pop_pair(&mut self) -> Option<Pairing> {
        if self.entries.len() < 2 {
            return None;
        }
        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        Some(Pairing { first, second })
    }

    /// 1-based position of `conn`.
    #[must_use]
    pub fn position(&self, conn: ConnectionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.connection == conn)
            .map(|i| i + 1)
    }

    #[must_use]
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.position(conn).is_some()
    }

    /// Connection waiting under `user_id`, if any.
    #[must_use]
    pub fn queued_user(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.entries
            .iter()
            .find(|e| &e.user_id == user_id)
            .map(|e| e.connection)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everyone. Used on shutdown.
    pub fn clear(&mut self) -> Vec<MatchmakingEntry> {
        self.entries.drain(..).collect()
    }
}
