//! Session store: active matches and the players in them.
//!
//! ## Key Types
//!
//! - `SessionStore`: Registry of live sessions with connection indexes
//! - `Session`: Seats, turn owner, status, spectators, move log, timers
//! - `PlayerState`: Bounded hp / mana / hand for one seat
//! - `Side`: `First` or `Second` seat; `First` always opens

pub mod player;
pub mod state;
pub mod store;

pub use player::PlayerState;
pub use state::{
    BattleMode, EndReason, MoveRecord, Participant, PlayerSummary, Seat, Session, SessionStatus,
    SessionSummary, SessionTimers, Side, AI_PLAYER_ID,
};
pub use store::{NewPlayer, SessionStore, AI_DISPLAY_NAME};
