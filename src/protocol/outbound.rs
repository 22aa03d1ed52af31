//! Server events.
//!
//! One JSON object per event, tagged by `type`, camelCase fields throughout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cards::Card;
use crate::combat::CardPlay;
use crate::core::{BattleError, SessionId};
use crate::session::{BattleMode, EndReason, Session, SessionSummary, Side};
use crate::turn::TurnChange;

/// Per-recipient match outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Lose,
    /// Sent to spectators of a decided match.
    Ended,
    Abandoned,
}

/// Summary numbers attached to `matchEnd`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub duration_ms: u64,
    pub total_moves: usize,
    pub turns: u32,
}

/// An event for one connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent to each player when their match starts (or on rejoin).
    BattleReady {
        session_id: SessionId,
        mode: BattleMode,
        hand: Vec<Card>,
        your_hp: u32,
        enemy_hp: u32,
        mana: u32,
        your_turn: bool,
        opponent: String,
    },
    CardPlayed {
        session_id: SessionId,
        actor_id: String,
        target_id: String,
        card: Card,
        damage: u32,
        /// Actor's hp.
        player_hp: u32,
        /// Defender's hp.
        enemy_hp: u32,
        /// Actor's mana after paying.
        mana: u32,
        move_number: u32,
    },
    TurnChanged {
        session_id: SessionId,
        current_turn_owner: String,
        turn: u32,
        mana: BTreeMap<String, u32>,
    },
    TurnTimeout {
        session_id: SessionId,
        player_id: String,
    },
    MatchEnd {
        session_id: SessionId,
        winner: Option<String>,
        result: MatchResult,
        reason: EndReason,
        stats: MatchStats,
    },
    QueueStatus {
        position: usize,
    },
    QueueLeft {
        removed: bool,
    },
    QueueError {
        message: String,
    },
    ActionError {
        message: String,
    },
    NotEnoughMana {
        required: u32,
        available: u32,
    },
    OpponentDisconnected {
        session_id: SessionId,
    },
    PlayerJoined {
        session_id: SessionId,
        spectator_count: usize,
    },
    SpectatorLeft {
        session_id: SessionId,
        spectator_count: usize,
    },
    /// Snapshot for a new spectator.
    Spectating(SessionSummary),
    ChatMessage {
        session_id: SessionId,
        player_id: String,
        message: String,
    },
}

impl ServerEvent {
    /// Error reply for the originating connection.
    ///
    /// Mana shortfalls get their own event; other failures of queue requests
    /// become `queueError`, everything else `actionError`.
    #[must_use]
    pub fn from_error(err: &BattleError, queue_request: bool) -> Self {
        match err {
            BattleError::InsufficientMana { required, available } => ServerEvent::NotEnoughMana {
                required: *required,
                available: *available,
            },
            _ if queue_request => ServerEvent::QueueError {
                message: err.to_string(),
            },
            _ => ServerEvent::ActionError {
                message: err.to_string(),
            },
        }
    }

    /// Opening view of `session` for the player in `side`.
    #[must_use]
    pub fn battle_ready(session: &Session, side: Side) -> Self {
        let me = &session.seat(side).state;
        let them = &session.seat(side.opponent()).state;
        ServerEvent::BattleReady {
            session_id: session.id(),
            mode: session.mode(),
            hand: me.hand().to_vec(),
            your_hp: me.hp(),
            enemy_hp: them.hp(),
            mana: me.mana(),
            your_turn: session.current_turn() == side,
            opponent: them.display_name().to_string(),
        }
    }

    #[must_use]
    pub fn card_played(session_id: SessionId, play: &CardPlay) -> Self {
        ServerEvent::CardPlayed {
            session_id,
            actor_id: play.actor_id.clone(),
            target_id: play.target_id.clone(),
            card: play.card.clone(),
            damage: play.damage,
            player_hp: play.actor_hp,
            enemy_hp: play.defender_hp,
            mana: play.actor_mana,
            move_number: play.move_number,
        }
    }

    #[must_use]
    pub fn turn_changed(session_id: SessionId, change: &TurnChange) -> Self {
        ServerEvent::TurnChanged {
            session_id,
            current_turn_owner: change.owner_id.clone(),
            turn: change.turn,
            mana: change.mana.clone(),
        }
    }

    /// Wire name of the event, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::BattleReady { .. } => "battleReady",
            ServerEvent::CardPlayed { .. } => "cardPlayed",
            ServerEvent::TurnChanged { .. } => "turnChanged",
            ServerEvent::TurnTimeout { .. } => "turnTimeout",
            ServerEvent::MatchEnd { .. } => "matchEnd",
            ServerEvent::QueueStatus { .. } => "queueStatus",
            ServerEvent::QueueLeft { .. } => "queueLeft",
            ServerEvent::QueueError { .. } => "queueError",
            ServerEvent::ActionError { .. } => "actionError",
            ServerEvent::NotEnoughMana { .. } => "notEnoughMana",
            ServerEvent::OpponentDisconnected { .. } => "opponentDisconnected",
            ServerEvent::PlayerJoined { .. } => "playerJoined",
            ServerEvent::SpectatorLeft { .. } => "spectatorLeft",
            ServerEvent::Spectating(_) => "spectating",
            ServerEvent::ChatMessage { .. } => "chatMessage",
        }
    }
}
