//! Error taxonomy for battle operations.
//!
//! Validation failures (`InvalidTurn`, `InsufficientMana`, `SessionNotFound`,
//! `QueueFailure`, `CardNotInHand`, `InvalidPayload`) are reported to the
//! originating connection only and never mutate state. `PersistenceFailure`
//! is logged server-side and never rolls back a finished match.

use thiserror::Error;

use super::ids::SessionId;

/// Errors raised while handling a client action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BattleError {
    /// Actor is not the current turn owner, or the session is not in progress.
    #[error("Not your turn")]
    InvalidTurn,

    /// Card cost exceeds the actor's current mana.
    #[error("Not enough mana: required {required}, available {available}")]
    InsufficientMana { required: u32, available: u32 },

    /// Stale or already-deleted session id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The connection has no session and none was named.
    #[error("No active session for this connection")]
    NoActiveSession,

    /// Queue request rejected (already seated, malformed join payload).
    #[error("Queue failure: {0}")]
    QueueFailure(String),

    /// The played card is not in the actor's hand.
    #[error("Card not in hand: {0}")]
    CardNotInHand(String),

    /// Malformed action payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// External store write failed.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    /// The engine loop is no longer running.
    #[error("Battle engine is not running")]
    ChannelClosed,
}

/// Errors raised by external collaborators (profile, history, leaderboard).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Record encoding failed: {0}")]
    Encoding(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Encoding(err.to_string())
    }
}
