//! # rust-ccg-arena
//!
//! A real-time card battle engine: players queue or challenge an AI, take
//! turns playing flat-damage cards under a mana budget, and the engine
//! resolves plays, runs turn and inactivity timers, and terminates matches on
//! victory, timeout or disconnect.
//!
//! ## Design Principles
//!
//! 1. **One writer**: All match state lives in a `BattleEngine` owned by a
//!    single task. Requests and timer expiries are consumed one at a time, so
//!    a resolution is never interleaved with another action.
//!
//! 2. **Validate, then mutate**: Every handler runs all of its checks before
//!    the first state change. A rejected request changes nothing and is
//!    answered only to its sender.
//!
//! 3. **Termination never waits on storage**: Match results are written by
//!    spawned tasks. A store outage is logged; the match still ends.
//!
//! ## Modules
//!
//! - `core`: Ids, RNG, configuration, errors
//! - `cards`: Cards and decks
//! - `session`: Session store, seats and player state
//! - `matchmaking`: FIFO queue
//! - `combat`: Card play resolver
//! - `turn`: Turn switching, AI policy, cancellable timers
//! - `relay`: Event delivery and spectators
//! - `lifecycle`: Completion, abandonment, disconnect, drain
//! - `persistence`: Profile / history / leaderboard collaborators
//! - `protocol`: JSON requests and events
//! - `server`: Engine loop, handle, TCP gateway

pub mod cards;
pub mod combat;
pub mod core;
pub mod lifecycle;
pub mod matchmaking;
pub mod persistence;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod turn;

// Re-export commonly used types
pub use crate::core::{
    BattleConfig, BattleError, ConfigError, ConnectionId, GameRng, SessionId, StoreError, TurnTimeoutPolicy,
    UserId,
};

pub use crate::cards::{Card, Deck};

pub use crate::session::{
    BattleMode, EndReason, MoveRecord, Participant, PlayerState, Session, SessionStatus, SessionStore,
    SessionSummary, Side,
};

pub use crate::matchmaking::{Enqueued, MatchmakingEntry, MatchmakingQueue};

pub use crate::combat::{apply_card_play, CardPlay};

pub use crate::turn::{end_turn, TimerHandle, TimerKind, TimerScheduler, TurnChange};

pub use crate::relay::Outbox;

pub use crate::lifecycle::LifecycleHandler;

pub use crate::persistence::{
    LeaderboardStore, MatchHistoryStore, MatchRecord, MemoryStore, Profile, ProfileStore,
};

pub use crate::protocol::{ClientMessage, MatchResult, ServerEvent};

pub use crate::server::{BattleEngine, BattleHandle, BattleServer, ClientConnection, EngineStats, Gateway};
