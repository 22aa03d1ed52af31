//! Session termination.
//!
//! Every exit path (victory, inactivity, disconnect, shutdown) goes through
//! `LifecycleHandler`, which deletes the session (cancelling its timers),
//! notifies whoever is still connected and spawns the persistence writes.
//! A failed write is logged and never undoes the termination. Pending
//! writes are tracked so shutdown can wait for them.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::{ConnectionId, SessionId, UserId};
use crate::matchmaking::MatchmakingQueue;
use crate::persistence::{LeaderboardStore, MatchHistoryStore, MatchRecord, Outcome, ParticipantRecord};
use crate::protocol::{MatchResult, MatchStats, ServerEvent};
use crate::relay::{leave_spectating, Outbox};
use crate::session::{BattleMode, EndReason, Participant, Session, SessionStatus, SessionStore};

/// What a disconnect cleaned up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Departure {
    pub left_queue: bool,
    /// Session the connection was seated in; it no longer exists.
    pub ended_session: Option<SessionId>,
    /// Session the connection was watching.
    pub stopped_watching: Option<SessionId>,
}

/// Terminates sessions and hands results to the external stores.
pub struct LifecycleHandler {
    history: Arc<dyn MatchHistoryStore>,
    leaderboard: Arc<dyn LeaderboardStore>,
    writes: JoinSet<()>,
}

impl std::fmt::Debug for LifecycleHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHandler")
            .field("pending_writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleHandler {
    #[must_use]
    pub fn new(history: Arc<dyn MatchHistoryStore>, leaderboard: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            history,
            leaderboard,
            writes: JoinSet::new(),
        }
    }

    /// Persistence writes spawned but not yet reaped.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Wait until every spawned write has finished.
    pub async fn flush(&mut self) {
        while let Some(joined) = self.writes.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Persistence task failed");
            }
        }
    }

    /// End a match the resolver marked `Completed`.
    ///
    /// The winner is told `win`, the loser `lose`, spectators `ended`. One
    /// history append is spawned, plus a leaderboard win for a human winner.
    pub fn complete(&mut self, store: &mut SessionStore, outbox: &mut Outbox, id: SessionId) -> Option<MatchRecord> {
        let session = store.delete(id)?;
        let SessionStatus::Completed { winner } = session.status() else {
            warn!(session = %id, status = ?session.status(), "Completing a session that was not decided");
            return Some(self.finish(session, EndReason::Victory, true));
        };

        let winner_seat = session.seat(winner);
        let winner_id = winner_seat.player_id();
        let stats = stats(&session);

        for (side, seat) in session.seats() {
            if let Participant::Human(conn) = seat.participant {
                let result = if side == winner { MatchResult::Win } else { MatchResult::Lose };
                outbox.send(conn, match_end(id, Some(winner_id.clone()), result, EndReason::Victory, stats));
            }
        }
        outbox.send_all(
            session.spectators().iter().copied(),
            &match_end(id, Some(winner_id), MatchResult::Ended, EndReason::Victory, stats),
        );

        let record = build_record(&session, EndReason::Victory);
        if let Participant::Human(_) = winner_seat.participant {
            self.spawn_record_win(
                winner_seat.state.user_id().clone(),
                winner_seat.state.display_name().to_string(),
            );
        }
        self.spawn_append(record.clone());

        info!(session = %id, winner = %record.winner.as_ref().map_or("ai", UserId::as_str), "Match completed");
        Some(record)
    }

    /// End an undecided match for `reason`.
    ///
    /// Everyone still connected gets `matchEnd` with result `abandoned`.
    /// History is written unless an AI match ended by disconnect.
    pub fn abandon(
        &mut self,
        store: &mut SessionStore,
        outbox: &mut Outbox,
        id: SessionId,
        reason: EndReason,
    ) -> Option<MatchRecord> {
        let mut session = store.delete(id)?;
        session.set_status(SessionStatus::Abandoned(reason));
        let stats = stats(&session);

        outbox.broadcast(&session, &match_end(id, None, MatchResult::Abandoned, reason, stats));

        let persist = !(session.mode() == BattleMode::Ai && reason == EndReason::Disconnect);
        Some(self.finish(session, reason, persist))
    }

    /// Clean up after a closed connection.
    ///
    /// Drops its queue entry, ends any session it was seated in and removes
    /// it from any session it was watching.
    pub fn disconnect(
        &mut self,
        store: &mut SessionStore,
        queue: &mut MatchmakingQueue,
        outbox: &mut Outbox,
        conn: ConnectionId,
    ) -> Departure {
        let mut departure = Departure {
            left_queue: queue.leave(conn).is_some(),
            ..Departure::default()
        };

        if let Some((id, _)) = leave_spectating(store, outbox, conn) {
            departure.stopped_watching = Some(id);
        }

        if let Some(id) = store.session_of(conn) {
            departure.ended_session = Some(id);
            let is_pvp = store.get(id).is_ok_and(|s| s.mode() == BattleMode::PvP);
            if is_pvp {
                if let Ok(session) = store.get(id) {
                    for other in session.players().into_iter().filter(|c| *c != conn) {
                        outbox.send(other, ServerEvent::OpponentDisconnected { session_id: id });
                    }
                }
                // The leaver's sender may still be registered; don't write to it.
                outbox.unregister(conn);
                self.abandon(store, outbox, id, EndReason::Disconnect);
            } else if let Some(mut session) = store.delete(id) {
                session.set_status(SessionStatus::Abandoned(EndReason::Disconnect));
                outbox.unregister(conn);
                let stats = stats(&session);
                outbox.send_all(
                    session.spectators().iter().copied(),
                    &match_end(id, None, MatchResult::Abandoned, EndReason::Disconnect, stats),
                );
                info!(session = %id, connection = %conn, "AI match dropped on disconnect");
            }
        }

        debug!(connection = %conn, ?departure, "Connection cleaned up");
        departure
    }

    /// Abandon every session with reason `shutdown` and empty the queue.
    pub fn drain(&mut self, store: &mut SessionStore, queue: &mut MatchmakingQueue, outbox: &mut Outbox) -> usize {
        let ids = store.ids();
        for id in &ids {
            self.abandon(store, outbox, *id, EndReason::Shutdown);
        }
        let dropped = queue.clear();
        info!(sessions = ids.len(), queued = dropped.len(), "Drained engine");
        ids.len()
    }

    fn finish(&mut self, session: Session, reason: EndReason, persist: bool) -> MatchRecord {
        let record = build_record(&session, reason);
        if persist {
            self.spawn_append(record.clone());
        }
        info!(session = %session.id(), ?reason, persisted = persist, "Match ended");
        record
    }

    fn spawn_append(&mut self, record: MatchRecord) {
        self.reap();
        let history = Arc::clone(&self.history);
        let session = record.session_id;
        self.writes.spawn(async move {
            if let Err(err) = history.append_match(record).await {
                warn!(session = %session, error = %err, "Failed to save match history");
            }
        });
    }

    fn spawn_record_win(&mut self, user_id: UserId, display_name: String) {
        self.reap();
        let leaderboard = Arc::clone(&self.leaderboard);
        self.writes.spawn(async move {
            if let Err(err) = leaderboard.record_win(user_id.clone(), display_name).await {
                warn!(user = %user_id, error = %err, "Failed to update leaderboard");
            }
        });
    }

    /// Drop finished writes so the set only holds pending ones.
    fn reap(&mut self) {
        while self.writes.try_join_next().is_some() {}
    }
}

fn stats(session: &Session) -> MatchStats {
    MatchStats {
        duration_ms: session.elapsed().as_millis() as u64,
        total_moves: session.move_log().len(),
        turns: session.turn_number(),
    }
}

fn match_end(
    session_id: SessionId,
    winner: Option<String>,
    result: MatchResult,
    reason: EndReason,
    stats: MatchStats,
) -> ServerEvent {
    ServerEvent::MatchEnd {
        session_id,
        winner,
        result,
        reason,
        stats,
    }
}

/// History record for a terminated session. Only human seats are listed.
#[must_use]
pub fn build_record(session: &Session, reason: EndReason) -> MatchRecord {
    let winner = match session.status() {
        SessionStatus::Completed { winner } => Some(winner),
        _ => None,
    };
    let participants = session
        .seats()
        .filter(|(_, seat)| seat.participant != Participant::Ai)
        .map(|(side, seat)| ParticipantRecord {
            user_id: seat.state.user_id().clone(),
            display_name: seat.state.display_name().to_string(),
            outcome: match winner {
                Some(w) if w == side => Outcome::Win,
                Some(_) => Outcome::Lose,
                None => Outcome::Abandoned,
            },
            final_hp: seat.state.hp(),
        })
        .collect();

    MatchRecord {
        session_id: session.id(),
        mode: session.mode(),
        reason,
        winner: winner
            .map(|side| session.seat(side))
            .filter(|seat| seat.participant != Participant::Ai)
            .map(|seat| seat.state.user_id().clone()),
        participants,
        turns: session.turn_number(),
        duration_ms: session.elapsed().as_millis() as u64,
        moves: session.move_log().iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Card, Deck};
    use crate::combat::apply_card_play;
    use crate::core::BattleConfig;
    use crate::matchmaking::MatchmakingEntry;
    use crate::persistence::MemoryStore;
    use crate::relay::EventReceiver;
    use crate::session::NewPlayer;
    use tokio::sync::mpsc;

    struct Fixture {
        store: SessionStore,
        queue: MatchmakingQueue,
        outbox: Outbox,
        backend: Arc<MemoryStore>,
        lifecycle: LifecycleHandler,
        rx: Vec<EventReceiver>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryStore::new());
        let mut outbox = Outbox::new();
        let rx = (1..=3)
            .map(|i| {
                let (tx, rx) = mpsc::channel(64);
                outbox.register(ConnectionId::new(i), tx);
                rx
            })
            .collect();
        Fixture {
            store: SessionStore::new(Arc::new(BattleConfig::default().with_seed(4))),
            queue: MatchmakingQueue::new(),
            outbox,
            lifecycle: LifecycleHandler::new(backend.clone(), backend.clone()),
            backend,
            rx,
        }
    }

    fn player(conn: u64, user: &str) -> NewPlayer {
        NewPlayer {
            connection: ConnectionId::new(conn),
            user_id: UserId::new(user),
            display_name: user.to_string(),
            deck: Deck::new(vec![Card::new("Nuke", 1, 99)]),
        }
    }

    fn pvp(f: &mut Fixture) -> SessionId {
        f.store
            .create(BattleMode::PvP, vec![player(1, "alice"), player(2, "bob")])
            .unwrap()
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn drain_events(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_complete_notifies_and_persists_once() {
        let mut f = fixture();
        let id = pvp(&mut f);
        f.store.add_spectator(id, ConnectionId::new(3)).unwrap();
        let session = f.store.get_mut(id).unwrap();
        apply_card_play(session, Participant::Human(ConnectionId::new(1)), &Card::new("Nuke", 1, 99), None).unwrap();

        let record = f.lifecycle.complete(&mut f.store, &mut f.outbox, id).unwrap();
        settle().await;

        assert_eq!(record.winner, Some(UserId::new("alice")));
        assert!(!f.store.contains(id));

        let results: Vec<_> = f
            .rx
            .iter_mut()
            .map(|rx| match drain_events(rx).pop() {
                Some(ServerEvent::MatchEnd { result, .. }) => result,
                other => panic!("expected matchEnd, got {other:?}"),
            })
            .collect();
        assert_eq!(results, vec![MatchResult::Win, MatchResult::Lose, MatchResult::Ended]);

        assert_eq!(f.backend.history_attempts(), 1);
        assert_eq!(f.backend.wins(&UserId::new("alice")), 1);
        assert_eq!(f.backend.history().unwrap()[0].participants[1].outcome, Outcome::Lose);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let mut f = fixture();
        let id = pvp(&mut f);
        let session = f.store.get_mut(id).unwrap();
        apply_card_play(session, Participant::Human(ConnectionId::new(1)), &Card::new("Nuke", 1, 99), None).unwrap();

        assert!(f.lifecycle.complete(&mut f.store, &mut f.outbox, id).is_some());
        assert!(f.lifecycle.complete(&mut f.store, &mut f.outbox, id).is_none());
        settle().await;
        assert_eq!(f.backend.history_attempts(), 1);
    }

    #[tokio::test]
    async fn test_abandon_for_inactivity() {
        let mut f = fixture();
        let id = pvp(&mut f);

        let record = f
            .lifecycle
            .abandon(&mut f.store, &mut f.outbox, id, EndReason::Inactivity)
            .unwrap();
        settle().await;

        assert_eq!(record.reason, EndReason::Inactivity);
        assert!(record.participants.iter().all(|p| p.outcome == Outcome::Abandoned));
        assert!(matches!(
            drain_events(&mut f.rx[0]).pop(),
            Some(ServerEvent::MatchEnd {
                result: MatchResult::Abandoned,
                reason: EndReason::Inactivity,
                ..
            })
        ));
        assert_eq!(f.backend.history_attempts(), 1);
        assert_eq!(f.backend.leaderboard_attempts(), 0);
    }

    #[tokio::test]
    async fn test_pvp_disconnect() {
        let mut f = fixture();
        let id = pvp(&mut f);

        let departure = f
            .lifecycle
            .disconnect(&mut f.store, &mut f.queue, &mut f.outbox, ConnectionId::new(1));
        settle().await;

        assert_eq!(departure.ended_session, Some(id));
        assert!(!f.store.contains(id));
        assert_eq!(f.store.session_of(ConnectionId::new(2)), None);
        let events = drain_events(&mut f.rx[1]);
        assert_eq!(events[0], ServerEvent::OpponentDisconnected { session_id: id });
        assert!(drain_events(&mut f.rx[0]).is_empty());
        assert_eq!(f.backend.history().unwrap()[0].reason, EndReason::Disconnect);
    }

    #[tokio::test]
    async fn test_ai_disconnect_skips_history() {
        let mut f = fixture();
        let id = f.store.create(BattleMode::Ai, vec![player(1, "alice")]).unwrap();

        f.lifecycle
            .disconnect(&mut f.store, &mut f.queue, &mut f.outbox, ConnectionId::new(1));
        settle().await;

        assert!(!f.store.contains(id));
        assert_eq!(f.backend.history_attempts(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_queue() {
        let mut f = fixture();
        f.queue.enqueue(MatchmakingEntry::new(
            ConnectionId::new(2),
            UserId::new("bob"),
            Deck::default(),
            "bob",
        ));

        let departure = f
            .lifecycle
            .disconnect(&mut f.store, &mut f.queue, &mut f.outbox, ConnectionId::new(2));

        assert!(departure.left_queue);
        assert!(f.queue.is_empty());
        assert_eq!(departure.ended_session, None);
    }

    #[tokio::test]
    async fn test_drain() {
        let mut f = fixture();
        pvp(&mut f);
        f.store.create(BattleMode::Ai, vec![player(3, "carol")]).unwrap();

        assert_eq!(f.lifecycle.drain(&mut f.store, &mut f.queue, &mut f.outbox), 2);
        settle().await;

        assert!(f.store.is_empty());
        assert_eq!(f.backend.history_attempts(), 2);
        let reasons: Vec<_> = f.backend.history().unwrap().iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec![EndReason::Shutdown, EndReason::Shutdown]);
    }

    #[tokio::test]
    async fn test_flush_waits_for_pending_writes() {
        let mut f = fixture();
        pvp(&mut f);
        f.store.create(BattleMode::Ai, vec![player(3, "carol")]).unwrap();
        f.lifecycle.drain(&mut f.store, &mut f.queue, &mut f.outbox);
        assert_eq!(f.lifecycle.pending_writes(), 2);

        f.lifecycle.flush().await;

        assert_eq!(f.lifecycle.pending_writes(), 0);
        assert_eq!(f.backend.history().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_outage_does_not_block_termination() {
        let mut f = fixture();
        f.backend.set_offline(true);
        let id = pvp(&mut f);
        let session = f.store.get_mut(id).unwrap();
        apply_card_play(session, Participant::Human(ConnectionId::new(1)), &Card::new("Nuke", 1, 99), None).unwrap();

        assert!(f.lifecycle.complete(&mut f.store, &mut f.outbox, id).is_some());
        settle().await;

        assert!(!f.store.contains(id));
        assert_eq!(f.backend.history_attempts(), 1);
        assert!(f.backend.history().unwrap().is_empty());
    }
}
