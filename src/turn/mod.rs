//! Turn controller: turn switching, mana regeneration, AI move policy and
//! the cancellable timers that drive turn limits, inactivity and AI delay.
//!
//! ## Key Types
//!
//! - `TurnChange`: New owner, turn number and per-player mana
//! - `TimerScheduler` / `TimerHandle`: Spawned sleeps that report back to the
//!   engine loop; dropping the handle cancels the timer

pub mod controller;
pub mod timer;

pub use controller::{
    ai_fallback_card, choose_ai_card, end_turn, is_ai_turn, TurnChange, AI_FALLBACK_CARD, MANA_PER_TURN,
};
pub use timer::{TimerEvent, TimerHandle, TimerKind, TimerScheduler, TimerToken};
