//! Wire protocol: JSON requests in, JSON events out.
//!
//! ## Key Types
//!
//! - `ClientMessage`: Tagged request enum with boundary validation
//! - `ServerEvent`: Tagged event enum; `from_error` maps failures to replies

pub mod inbound;
pub mod outbound;

pub use inbound::{ChatRequest, ClientMessage, EndTurnRequest, JoinMatchRequest, JoinRequest, PlayCardRequest};
pub use outbound::{MatchResult, MatchStats, ServerEvent};
