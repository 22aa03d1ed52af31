//! Lifecycle and disconnect handling.
//!
//! `LifecycleHandler` is the only code that removes sessions from the store.

pub mod handler;

pub use handler::{build_record, Departure, LifecycleHandler};
