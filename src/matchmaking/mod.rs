//! Matchmaking: FIFO pairing of waiting players.

pub mod queue;

pub use queue::{Enqueued, MatchmakingEntry, MatchmakingQueue, Pairing};
