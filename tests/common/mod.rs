//! Shared harness for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ccg_arena::cards::{Card, Deck};
use ccg_arena::core::{BattleConfig, SessionId, UserId};
use ccg_arena::protocol::{ChatRequest, EndTurnRequest, JoinMatchRequest, JoinRequest, PlayCardRequest};
use ccg_arena::server::{BattleHandle, BattleServer, ClientConnection};
use ccg_arena::{ClientMessage, MemoryStore, ServerEvent};
use tokio::task::JoinHandle;

/// A running engine plus the in-memory backend it writes to.
pub struct Arena {
    pub handle: BattleHandle,
    pub store: Arc<MemoryStore>,
    pub task: JoinHandle<()>,
}

impl Arena {
    pub fn start(config: BattleConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: BattleConfig, store: Arc<MemoryStore>) -> Self {
        let (handle, task) = BattleServer::spawn(config, store.clone(), store.clone());
        Self { handle, store, task }
    }

    pub fn connect(&self) -> ClientConnection {
        self.handle.connect().expect("engine running")
    }

    pub fn send(&self, client: &ClientConnection, message: ClientMessage) {
        self.handle.send(client.id, message).expect("engine running");
    }
}

/// Seeded config so hands are reproducible.
pub fn config() -> BattleConfig {
    BattleConfig::default().with_seed(7)
}

pub fn spark() -> Card {
    Card::new("Spark", 1, 3)
}

pub fn deck_of(cards: &[Card]) -> Deck {
    Deck::new(cards.to_vec())
}

pub fn join_request(user: &str, deck: Deck) -> JoinRequest {
    JoinRequest {
        user_id: UserId::new(user),
        deck,
        display_name: String::new(),
    }
}

pub fn join_battle(user: &str, deck: Deck) -> ClientMessage {
    ClientMessage::JoinBattle(join_request(user, deck))
}

pub fn join_queue(user: &str, deck: Deck) -> ClientMessage {
    ClientMessage::JoinQueue(join_request(user, deck))
}

pub fn spectate(session_id: SessionId) -> ClientMessage {
    ClientMessage::JoinMatch(JoinMatchRequest {
        session_id,
        as_spectator: true,
    })
}

pub fn play(card: Card) -> ClientMessage {
    ClientMessage::PlayCard(PlayCardRequest {
        session_id: None,
        card,
        target: Some("enemy".to_string()),
    })
}

pub fn end_turn() -> ClientMessage {
    ClientMessage::EndTurn(EndTurnRequest::default())
}

pub fn chat(message: &str) -> ClientMessage {
    ClientMessage::Chat(ChatRequest {
        session_id: None,
        message: message.to_string(),
    })
}

/// Next event for `client`; panics if the engine dropped the connection.
pub async fn next(client: &mut ClientConnection) -> ServerEvent {
    client.events.recv().await.expect("connection open")
}

/// Session id and turn flag from a `battleReady`.
pub async fn ready(client: &mut ClientConnection) -> (SessionId, bool) {
    match next(client).await {
        ServerEvent::BattleReady {
            session_id, your_turn, ..
        } => (session_id, your_turn),
        other => panic!("expected battleReady, got {other:?}"),
    }
}

/// Let spawned persistence tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
