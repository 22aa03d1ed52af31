//! The battle engine: all mutable match state and the handlers that act on it.
//!
//! `BattleEngine` is owned by a single task (see `runtime`), so handlers run
//! one at a time and never await. Each handler validates, mutates and emits
//! outbound events in one synchronous step; persistence is spawned off.
//!
//! ## Flow
//!
//! ```text
//! joinQueue  -> queue -> (2 waiting) -> SessionStore::create -> battleReady x2
//! joinBattle -> SessionStore::create(AI) -> battleReady
//! playCard   -> combat::apply_card_play -> cardPlayed [-> lifecycle.complete]
//! endTurn    -> turn::end_turn -> turnChanged [-> AI action timer]
//! timers     -> turnTimeout / inactivity abandon / AI move
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::combat::apply_card_play;
use crate::core::{BattleConfig, BattleError, ConnectionId, SessionId, TurnTimeoutPolicy, UserId};
use crate::lifecycle::LifecycleHandler;
use crate::matchmaking::{Enqueued, MatchmakingEntry, MatchmakingQueue};
use crate::protocol::{
    ChatRequest, ClientMessage, EndTurnRequest, JoinMatchRequest, JoinRequest, PlayCardRequest, ServerEvent,
};
use crate::relay::{join_as_spectator, EventSender, Outbox};
use crate::session::{BattleMode, EndReason, NewPlayer, Participant, SessionStore, SessionSummary};
use crate::turn::{self, TimerEvent, TimerKind, TimerScheduler};

/// Point-in-time engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub active_sessions: usize,
    pub queued_players: usize,
    pub connections: usize,
}

/// Session store, queue and outbox plus the handlers that drive them.
#[derive(Debug)]
pub struct BattleEngine {
    config: Arc<BattleConfig>,
    store: SessionStore,
    queue: MatchmakingQueue,
    outbox: Outbox,
    timers: TimerScheduler,
    lifecycle: LifecycleHandler,
}

impl BattleEngine {
    #[must_use]
    pub fn new(config: Arc<BattleConfig>, lifecycle: LifecycleHandler, timers: TimerScheduler) -> Self {
        Self {
            store: SessionStore::new(Arc::clone(&config)),
            config,
            queue: MatchmakingQueue::new(),
            outbox: Outbox::new(),
            timers,
            lifecycle,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_sessions: self.store.len(),
            queued_players: self.queue.len(),
            connections: self.outbox.len(),
        }
    }

    #[must_use]
    pub fn session_summary(&self, id: SessionId) -> Option<SessionSummary> {
        self.store.get(id).ok().map(|session| session.summary())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    pub fn connect(&mut self, conn: ConnectionId, sender: EventSender) {
        debug!(connection = %conn, "Connected");
        self.outbox.register(conn, sender);
    }

    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.lifecycle
            .disconnect(&mut self.store, &mut self.queue, &mut self.outbox, conn);
        self.outbox.unregister(conn);
    }

    /// Reply to a request that failed before reaching a handler.
    pub fn reject(&mut self, conn: ConnectionId, err: &BattleError, queue_request: bool) {
        debug!(connection = %conn, error = %err, "Request rejected");
        self.outbox.send(conn, ServerEvent::from_error(err, queue_request));
    }

    /// Validate and apply one client request. Failures go back to `conn` only.
    pub fn handle(&mut self, conn: ConnectionId, message: ClientMessage) {
        let queue_request = message.is_queue_request();
        let kind = message.kind();
        let result = message
            .validate(&self.config)
            .and_then(|()| self.dispatch(conn, message));
        if let Err(err) = result {
            debug!(connection = %conn, request = kind, error = %err, "Request rejected");
            self.outbox.send(conn, ServerEvent::from_error(&err, queue_request));
        }
    }

    /// Abandon every session and clear the queue.
    pub fn shutdown(&mut self) -> usize {
        self.lifecycle
            .drain(&mut self.store, &mut self.queue, &mut self.outbox)
    }

    /// Wait for spawned persistence writes to finish.
    pub async fn flush_persistence(&mut self) {
        self.lifecycle.flush().await;
    }

        fn dispatch(&mut self, conn: ConnectionId, message: ClientMessage) -> Result<(), BattleError> {
        match message {
            ClientMessage::JoinQueue(req) => self.join_queue(conn, req),
            ClientMessage::LeaveQueue => self.leave_queue(conn),
            ClientMessage::JoinBattle(req) => self.join_battle(conn, req),
            ClientMessage::JoinMatch(req) => self.join_match(conn, req),
            ClientMessage::PlayCard(req) => self.play_card(conn, req),
            ClientMessage::EndTurn(req) => self.end_turn(conn, req),
            ClientMessage::Chat(req) => self.chat(conn, req),
        }
    }

    // =========================================================================
    // Matchmaking
    // =========================================================================

    fn join_queue(&mut self, conn: ConnectionId, req: JoinRequest) -> Result<(), BattleError> {
        if self.store.session_of(conn).is_some() {
            return Err(BattleError::QueueFailure("Already in a battle".to_string()));
        }
        self.check_user_free(conn, &req.user_id)?;

        let display_name = req.effective_display_name();
        let entry = MatchmakingEntry::new(conn, req.user_id, req.deck, display_name);
        let enqueued = self.queue.enqueue(entry);
        if let Enqueued::Added(position) = enqueued {
            debug!(connection = %conn, position, "Queued");
        }
        self.outbox.send(
            conn,
            ServerEvent::QueueStatus {
                position: enqueued.position(),
            },
        );

        self.pair_waiting();
        Ok(())
    }

    fn leave_queue(&mut self, conn: ConnectionId) -> Result<(), BattleError> {
        let removed = self.queue.leave(conn).is_some();
        self.outbox.send(conn, ServerEvent::QueueLeft { removed });
        Ok(())
    }

    /// A user holds at most one seat or queue slot, so player ids stay
    /// unique within a session.
    fn check_user_free(&self, conn: ConnectionId, user_id: &UserId) -> Result<(), BattleError> {
        if self.store.seated_user(user_id).is_some() {
            return Err(BattleError::QueueFailure(format!("User {user_id} is already in a battle")));
        }
        if self.queue.queued_user(user_id).is_some_and(|queued| queued != conn) {
            return Err(BattleError::QueueFailure(format!(
                "User {user_id} is already waiting in the queue"
            )));
        }
        Ok(())
    }

        /// Start a PvP session for every waiting pair.
    fn pair_waiting(&mut self) {
        while let Some(pair) = self.queue.pop_pair() {
            let conns = [pair.first.connection, pair.second.connection];
            let players = vec![pair.first.into_new_player(), pair.second.into_new_player()];
            match self.store.create(BattleMode::PvP, players) {
                Ok(id) => self.start_session(id),
                Err(err) => {
                    warn!(error = %err, "Pairing failed");
                    for conn in conns {
                        self.outbox.send(conn, ServerEvent::from_error(&err, true));
                    }
                }
            }
        }
    }

    fn join_battle(&mut self, conn: ConnectionId, req: JoinRequest) -> Result<(), BattleError> {
        if self.store.session_of(conn).is_some() {
            return Err(BattleError::QueueFailure("Already in a battle".to_string()));
        }
        if self.queue.contains(conn) {
            return Err(BattleError::QueueFailure("Already waiting in the queue".to_string()));
        }
        self.check_user_free(conn, &req.user_id)?;

        let display_name = req.effective_display_name();
        let id = self.store.create(
            BattleMode::Ai,
            vec![NewPlayer {
                connection: conn,
                user_id: req.user_id,
                display_name,
                deck: req.deck,
            }],
        )?;
        self.start_session(id);
        Ok(())
    }

    /// Arm timers and send each player their opening view.
    fn start_session(&mut self, id: SessionId) {
        self.arm(id, TimerKind::Turn);
        self.arm(id, TimerKind::Inactivity);

        let Ok(session) = self.store.get(id) else {
            return;
        };
        info!(session = %id, mode = ?session.mode(), players = session.players().len(), "Session created");
        for (side, seat) in session.seats() {
            if let Participant::Human(conn) = seat.participant {
                self.outbox.send(conn, ServerEvent::battle_ready(session, side));
            }
        }
    }

    // =========================================================================
    // Match actions
    // =========================================================================

    fn join_match(&mut self, conn: ConnectionId, req: JoinMatchRequest) -> Result<(), BattleError> {
        if req.as_spectator {
            join_as_spectator(&mut self.store, &mut self.outbox, conn, req.session_id)?;
            return Ok(());
        }

        let session = self.store.get(req.session_id)?;
        let side = session
            .side_of(Participant::Human(conn))
            .ok_or_else(|| BattleError::InvalidPayload("Not a participant in this match".to_string()))?;
        self.outbox.send(conn, ServerEvent::battle_ready(session, side));
        Ok(())
    }

    /// Session a request applies to: the named one, else the sender's seat,
    /// else the session it is watching.
    fn target_session(&self, conn: ConnectionId, named: Option<SessionId>) -> Result<SessionId, BattleError> {
        match named {
            Some(id) if self.store.contains(id) => Ok(id),
            Some(id) => Err(BattleError::SessionNotFound(id)),
            None => self
                .store
                .session_of(conn)
                .or_else(|| self.store.spectating(conn))
                .ok_or(BattleError::NoActiveSession),
        }
    }

    fn play_card(&mut self, conn: ConnectionId, req: PlayCardRequest) -> Result<(), BattleError> {
        let id = self.target_session(conn, req.session_id)?;
        let session = self.store.get_mut(id)?;
        let play = apply_card_play(session, Participant::Human(conn), &req.card, req.target.as_deref())?;

        debug!(session = %id, actor = %play.actor_id, card = %play.card, damage = play.damage, "Card played");
        self.outbox.broadcast(session, &ServerEvent::card_played(id, &play));

        if play.is_lethal() {
            self.lifecycle.complete(&mut self.store, &mut self.outbox, id);
        } else {
            self.arm(id, TimerKind::Inactivity);
        }
        Ok(())
    }

    fn end_turn(&mut self, conn: ConnectionId, req: EndTurnRequest) -> Result<(), BattleError> {
        let id = self.target_session(conn, req.session_id)?;
        self.pass_turn(id, Participant::Human(conn))?;
        self.arm(id, TimerKind::Inactivity);
        Ok(())
    }

    fn chat(&mut self, conn: ConnectionId, req: ChatRequest) -> Result<(), BattleError> {
        let id = self.target_session(conn, req.session_id)?;
        let session = self.store.get(id)?;
        let side = session
            .side_of(Participant::Human(conn))
            .ok_or_else(|| BattleError::InvalidPayload("Only players can chat".to_string()))?;

        let event = ServerEvent::ChatMessage {
            session_id: id,
            player_id: session.seat(side).player_id(),
            message: req.message.trim().to_string(),
        };
        self.outbox.broadcast(session, &event);
        Ok(())
    }

    /// End `actor`'s turn, announce it and arm whatever the new turn needs.
    fn pass_turn(&mut self, id: SessionId, actor: Participant) -> Result<(), BattleError> {
        let session = self.store.get_mut(id)?;
        let change = turn::end_turn(session, actor)?;
        let ai_next = turn::is_ai_turn(session);

        debug!(session = %id, owner = %change.owner_id, turn = change.turn, "Turn changed");
        self.outbox.broadcast(session, &ServerEvent::turn_changed(id, &change));

        self.arm(id, TimerKind::Turn);
        if ai_next {
            self.arm(id, TimerKind::AiAction);
        }
        Ok(())
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn timer_duration(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::Turn => self.config.turn_timeout,
            TimerKind::Inactivity => self.config.inactivity_timeout,
            TimerKind::AiAction => self.config.ai_turn_delay,
        }
    }

    /// Schedule `kind` for `id`, replacing (and so cancelling) the previous one.
    fn arm(&mut self, id: SessionId, kind: TimerKind) {
        let after = self.timer_duration(kind);
        if let Ok(session) = self.store.get_mut(id) {
            let handle = self.timers.schedule(id, kind, after);
            *session.timers.slot_mut(kind) = Some(handle);
        }
    }

    /// React to an elapsed timer. Stale or orphaned events are ignored.
    pub fn on_timer(&mut self, event: TimerEvent) {
        let TimerEvent { session: id, kind, token } = event;
        let Ok(session) = self.store.get_mut(id) else {
            debug!(session = %id, ?kind, "Timer for a finished session");
            return;
        };
        if !session.timers.is_current(kind, token) {
            debug!(session = %id, ?kind, "Stale timer");
            return;
        }
        session.timers.slot_mut(kind).take();

        match kind {
            TimerKind::Turn => self.turn_timed_out(id),
            TimerKind::Inactivity => {
                info!(session = %id, "Session inactive");
                self.lifecycle
                    .abandon(&mut self.store, &mut self.outbox, id, EndReason::Inactivity);
            }
            TimerKind::AiAction => self.ai_move(id),
        }
    }

    fn turn_timed_out(&mut self, id: SessionId) {
        let Ok(session) = self.store.get(id) else {
            return;
        };
        let owner = session.current_turn_owner();
        let player_id = session.seat(session.current_turn()).player_id();
        info!(session = %id, player = %player_id, "Turn timed out");
        self.outbox.broadcast(
            session,
            &ServerEvent::TurnTimeout {
                session_id: id,
                player_id,
            },
        );

        match self.config.turn_timeout_policy {
            TurnTimeoutPolicy::Advisory => self.arm(id, TimerKind::Turn),
            TurnTimeoutPolicy::AutoEndTurn => {
                if let Err(err) = self.pass_turn(id, owner) {
                    warn!(session = %id, error = %err, "Could not end timed-out turn");
                    self.arm(id, TimerKind::Turn);
                }
            }
        }
    }

    /// The AI's delayed move: one card, then end the turn.
    fn ai_move(&mut self, id: SessionId) {
        let Ok(session) = self.store.get_mut(id) else {
            return;
        };
        if !turn::is_ai_turn(session) {
            return;
        }
        let Some(card) = turn::choose_ai_card(session) else {
            return;
        };

        match apply_card_play(session, Participant::Ai, &card, None) {
            Ok(play) => {
                debug!(session = %id, card = %play.card, damage = play.damage, "AI played");
                self.outbox.broadcast(session, &ServerEvent::card_played(id, &play));
                if play.is_lethal() {
                    self.lifecycle.complete(&mut self.store, &mut self.outbox, id);
                    return;
                }
            }
            Err(err) => warn!(session = %id, error = %err, "AI card rejected"),
        }

        if let Err(err) = self.pass_turn(id, Participant::Ai) {
            warn!(session = %id, error = %err, "AI could not end its turn");
        }
    }
}
