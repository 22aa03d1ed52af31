//! Process-scoped registry of active sessions.
//!
//! The store owns every `Session` plus two connection indexes (seated players
//! and spectators) so lookups by connection stay O(1). It also holds the root
//! RNG; each new session gets its own forked stream.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::player::PlayerState;
use super::state::{BattleMode, Participant, Seat, Session, AI_PLAYER_ID};
use crate::cards::Deck;
use crate::core::{BattleConfig, BattleError, ConnectionId, GameRng, SessionId, UserId};

/// Display name given to the AI seat.
pub const AI_DISPLAY_NAME: &str = "AI Opponent";

/// A human about to be seated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPlayer {
    pub connection: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub deck: Deck,
}

/// In-memory session registry.
#[derive(Debug)]
pub struct SessionStore {
    config: Arc<BattleConfig>,
    sessions: FxHashMap<SessionId, Session>,
    seated: FxHashMap<ConnectionId, SessionId>,
    watching: FxHashMap<ConnectionId, SessionId>,
    rng: GameRng,
}

impl SessionStore {
    /// Empty store. Draws are seeded from `config.seed` when set.
    #[must_use]
    pub fn new(config: Arc<BattleConfig>) -> Self {
        let rng = GameRng::from_seed_or_entropy(config.seed);
        Self {
            config,
            sessions: FxHashMap::default(),
            seated: FxHashMap::default(),
            watching: FxHashMap::default(),
            rng,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Create a session.
    ///
    /// AI mode takes exactly one player and seats the AI second with a copy
    /// of the player's deck. PvP takes exactly two distinct users; the first
    /// owns the opening turn. Fails without side effects if a player is
    /// already seated elsewhere.
    pub fn create(&mut self, mode: BattleMode, players: Vec<NewPlayer>) -> Result<SessionId, BattleError> {
        let expected = match mode {
            BattleMode::Ai => 1,
            BattleMode::PvP => 2,
        };
        if players.len() != expected {
            return Err(BattleError::InvalidPayload(format!(
                "{mode:?} battle needs {expected} player(s), got {}",
                players.len()
            )));
        }
        if players.iter().any(|p| self.seated.contains_key(&p.connection)) {
            return Err(BattleError::QueueFailure("Already in a battle".to_string()));
        }
        if mode == BattleMode::PvP
            && (players[0].connection == players[1].connection || players[0].user_id == players[1].user_id)
        {
            return Err(BattleError::QueueFailure("Cannot battle yourself".to_string()));
        }

        let id = SessionId::generate();
        let mut rng = self.rng.fork();
        let mut seats: Vec<Seat> = players
            .into_iter()
            .map(|p| Seat {
                participant: Participant::Human(p.connection),
                state: PlayerState::new(p.user_id, p.display_name, p.deck, &self.config, &mut rng),
            })
            .collect();

        if mode == BattleMode::Ai {
            let deck = seats[0].state.deck().clone();
            seats.push(Seat {
                participant: Participant::Ai,
                state: PlayerState::new(UserId::new(AI_PLAYER_ID), AI_DISPLAY_NAME, deck, &self.config, &mut rng),
            });
        }
        let second = seats.pop();
        let first = seats.pop();
        let (Some(first), Some(second)) = (first, second) else {
            return Err(BattleError::InvalidPayload("No players".to_string()));
        };

        let session = Session::new(id, mode, first, second, rng);
        for conn in session.players() {
            self.seated.insert(conn, id);
        }
        self.sessions.insert(id, session);
        Ok(id)
    }

    /// Look up a session.
    pub fn get(&self, id: SessionId) -> Result<&Session, BattleError> {
        self.sessions.get(&id).ok_or(BattleError::SessionNotFound(id))
    }

    /// Look up a session for mutation.
    pub fn get_mut(&mut self, id: SessionId) -> Result<&mut Session, BattleError> {
        self.sessions.get_mut(&id).ok_or(BattleError::SessionNotFound(id))
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Remove a session, cancel its timers and unindex its connections.
    ///
    /// Idempotent: a second call returns `None`.
    pub fn delete(&mut self, id: SessionId) -> Option<Session> {
        let mut session = self.sessions.remove(&id)?;
        session.timers.cancel_all();
        for conn in session.players() {
            self.seated.remove(&conn);
        }
        for conn in session.spectators() {
            self.watching.remove(conn);
        }
        Some(session)
    }

    /// Session in which `conn` holds a seat.
    #[must_use]
    pub fn session_of(&self, conn: ConnectionId) -> Option<SessionId> {
        self.seated.get(&conn).copied()
    }

    /// Session in which `user_id` holds a human seat, whatever the connection.
    #[must_use]
    pub fn seated_user(&self, user_id: &UserId) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|session| {
                session
                    .seats()
                    .any(|(_, seat)| seat.participant != Participant::Ai && seat.state.user_id() == user_id)
            })
            .map(Session::id)
    }

    /// Session `conn` is spectating.
    #[must_use]
    pub fn spectating(&self, conn: ConnectionId) -> Option<SessionId> {
        self.watching.get(&conn).copied()
    }

    /// Add `conn` to a session's spectators. Returns the new count.
    pub fn add_spectator(&mut self, id: SessionId, conn: ConnectionId) -> Result<usize, BattleError> {
        let session = self.sessions.get_mut(&id).ok_or(BattleError::SessionNotFound(id))?;
        let count = session.add_spectator(conn);
        self.watching.insert(conn, id);
        Ok(count)
    }

    /// Remove `conn` from whatever it is spectating.
    ///
    /// Returns the session and its remaining spectator count.
    pub fn remove_spectator(&mut self, conn: ConnectionId) -> Option<(SessionId, usize)> {
        let id = self.watching.remove(&conn)?;
        let session = self.sessions.get_mut(&id)?;
        session.remove_spectator(conn);
        Some((id, session.spectators().len()))
    }

    /// IDs of every live session.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
