//! Client requests.
//!
//! Every request is a JSON object tagged by `type`:
//!
//! ```json
//! {"type":"joinQueue","userId":"u1","deck":[{"name":"Spark","manaCost":1,"attack":3}]}
//! {"type":"playCard","card":{"name":"Spark"},"target":"enemy"}
//! ```
//!
//! `parse` checks shape, `validate` checks bounds. Neither touches engine
//! state, so a rejected request never causes a mutation.

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Deck};
use crate::core::{BattleConfig, BattleError, SessionId, UserId};
use crate::session::AI_PLAYER_ID;

/// Body of `joinQueue` and `joinBattle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: UserId,
    /// Empty means "load from the profile store".
    #[serde(default)]
    pub deck: Deck,
    #[serde(default)]
    pub display_name: String,
}

impl JoinRequest {
    /// Display name, falling back to the user id when blank.
    #[must_use]
    pub fn effective_display_name(&self) -> String {
        let trimmed = self.display_name.trim();
        if trimmed.is_empty() {
            self.user_id.to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn validate(&self, config: &BattleConfig) -> Result<(), BattleError> {
        if self.user_id.as_str().trim().is_empty() {
            return Err(BattleError::QueueFailure("userId is required".to_string()));
        }
        if self.user_id.as_str() == AI_PLAYER_ID {
            return Err(BattleError::QueueFailure(format!("userId '{AI_PLAYER_ID}' is reserved")));
        }
        if self.deck.is_empty() {
            return Err(BattleError::QueueFailure("Deck is empty".to_string()));
        }
        if self.deck.len() > config.max_deck_size {
            return Err(BattleError::QueueFailure(format!(
                "Deck has {} cards, limit is {}",
                self.deck.len(),
                config.max_deck_size
            )));
        }
        if self.deck.cards().iter().any(|card| card.name.trim().is_empty()) {
            return Err(BattleError::QueueFailure("Deck contains an unnamed card".to_string()));
        }
        if self.display_name.chars().count() > config.max_display_name {
            return Err(BattleError::QueueFailure(format!(
                "Display name longer than {} characters",
                config.max_display_name
            )));
        }
        Ok(())
    }
}

/// Body of `joinMatch`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatchRequest {
    pub session_id: SessionId,
    #[serde(default)]
    pub as_spectator: bool,
}

/// Body of `playCard`. The session defaults to the sender's seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayCardRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub card: Card,
    #[serde(default)]
    pub target: Option<String>,
}

/// Body of `endTurn`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndTurnRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// Body of `chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
}

/// A request from one connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinQueue(JoinRequest),
    LeaveQueue,
    JoinBattle(JoinRequest),
    JoinMatch(JoinMatchRequest),
    PlayCard(PlayCardRequest),
    EndTurn(EndTurnRequest),
    Chat(ChatRequest),
}

impl ClientMessage {
    /// Parse one JSON request.
    pub fn parse(text: &str) -> Result<Self, BattleError> {
        serde_json::from_str(text).map_err(|err| BattleError::InvalidPayload(err.to_string()))
    }

    /// Wire name of the request, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinQueue(_) => "joinQueue",
            ClientMessage::LeaveQueue => "leaveQueue",
            ClientMessage::JoinBattle(_) => "joinBattle",
            ClientMessage::JoinMatch(_) => "joinMatch",
            ClientMessage::PlayCard(_) => "playCard",
            ClientMessage::EndTurn(_) => "endTurn",
            ClientMessage::Chat(_) => "chat",
        }
    }

    /// Failures of queue requests are reported as `queueError`.
    #[must_use]
    pub fn is_queue_request(&self) -> bool {
        matches!(self, ClientMessage::JoinQueue(_) | ClientMessage::LeaveQueue)
    }

    /// Join body, if this is a join request.
    pub fn join_request_mut(&mut self) -> Option<&mut JoinRequest> {
        match self {
            ClientMessage::JoinQueue(req) | ClientMessage::JoinBattle(req) => Some(req),
            _ => None,
        }
    }

    /// Check field bounds against `config`.
    pub fn validate(&self, config: &BattleConfig) -> Result<(), BattleError> {
        match self {
            ClientMessage::JoinQueue(req) | ClientMessage::JoinBattle(req) => req.validate(config),
            ClientMessage::PlayCard(req) => {
                if req.card.name.trim().is_empty() {
                    return Err(BattleError::InvalidPayload("Card name is required".to_string()));
                }
                Ok(())
            }
            ClientMessage::Chat(req) => {
                let message = req.message.trim();
                if message.is_empty() {
                    return Err(BattleError::InvalidPayload("Message is empty".to_string()));
                }
                if message.chars().count() > config.max_chat_length {
                    return Err(BattleError::InvalidPayload(format!(
                        "Message longer than {} characters",
                        config.max_chat_length
                    )));
                }
                Ok(())
            }
            ClientMessage::LeaveQueue | ClientMessage::JoinMatch(_) | ClientMessage::EndTurn(_) => Ok(()),
        }
    }
}
