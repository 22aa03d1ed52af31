//! External collaborators: profile reads and match-result writes.
//!
//! The gateway reads a player's deck from a `ProfileStore` when a join
//! request arrives without one. On match end the engine fires off one
//! `MatchHistoryStore::append_match` plus a `LeaderboardStore::record_win`
//! for a winning human. Writes are
//! spawned and never awaited by the engine loop; failures are logged and
//! not retried.

pub mod memory;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::cards::Deck;
use crate::core::{SessionId, StoreError, UserId};
use crate::session::{BattleMode, EndReason, MoveRecord};

pub use memory::MemoryStore;

/// Stored player profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub deck: Deck,
}

/// Per-participant outcome in a history record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Lose,
    Abandoned,
}

/// One human participant of a finished match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub outcome: Outcome,
    pub final_hp: u32,
}

/// History entry for a finished or abandoned match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub session_id: SessionId,
    pub mode: BattleMode,
    pub reason: EndReason,
    pub winner: Option<UserId>,
    pub participants: Vec<ParticipantRecord>,
    pub turns: u32,
    pub duration_ms: u64,
    pub moves: Vec<MoveRecord>,
}

/// Source of player decks and display names.
pub trait ProfileStore: Send + Sync + 'static {
    fn load_profile(&self, user_id: &UserId) -> BoxFuture<'_, Result<Option<Profile>, StoreError>>;
}

/// Append-only match history.
pub trait MatchHistoryStore: Send + Sync + 'static {
    fn append_match(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Win counters.
pub trait LeaderboardStore: Send + Sync + 'static {
    fn record_win(&self, user_id: UserId, display_name: String) -> BoxFuture<'_, Result<(), StoreError>>;
}
