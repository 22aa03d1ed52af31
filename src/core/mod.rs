//! Core types: identifiers, RNG, configuration, errors.
//!
//! These are the leaf building blocks shared by every other module.

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;

pub use config::{BattleConfig, ConfigError, TurnTimeoutPolicy};
pub use error::{BattleError, StoreError};
pub use ids::{ConnectionId, ConnectionIdAllocator, SessionId, UserId};
pub use rng::GameRng;
