//! Spectator relay and event delivery.
//!
//! ## Key Types
//!
//! - `Outbox`: Connection id to sender map; targeted sends and session broadcast
//! - `join_as_spectator` / `leave_spectating`: Read-only observers

pub mod outbox;
pub mod spectators;

pub use outbox::{EventReceiver, EventSender, Outbox};
pub use spectators::{join_as_spectator, leave_spectating};
