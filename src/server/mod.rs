//! Engine loop, command handle and TCP gateway.
//!
//! ## Key Types
//!
//! - `BattleEngine`: Synchronous handlers over the store, queue and outbox
//! - `BattleServer`: Task that owns the engine and serializes every command
//! - `BattleHandle`: Cloneable sender side used by transports and tests
//! - `Gateway`: JSON-lines TCP transport

pub mod engine;
pub mod gateway;
pub mod runtime;

pub use engine::{BattleEngine, EngineStats};
pub use gateway::Gateway;
pub use runtime::{BattleHandle, BattleServer, ClientConnection, Command};
