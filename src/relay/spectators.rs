//! Spectator join and leave.
//!
//! Spectators are part of a session's broadcast group but hold no seat, so
//! the resolver rejects their plays with `InvalidTurn`. Joining or leaving
//! never changes combat state.

use tracing::debug;

use super::outbox::Outbox;
use crate::core::{BattleError, ConnectionId, SessionId};
use crate::protocol::ServerEvent;
use crate::session::SessionStore;

/// Add `conn` as a spectator of `session_id`.
///
/// Broadcasts `playerJoined` with the new count and sends the joiner a
/// `spectating` snapshot. A connection watching another session is moved.
/// Returns the spectator count.
pub fn join_as_spectator(
    store: &mut SessionStore,
    outbox: &mut Outbox,
    conn: ConnectionId,
    session_id: SessionId,
) -> Result<usize, BattleError> {
    let session = store.get(session_id)?;
    if session.is_player(conn) {
        return Err(BattleError::InvalidPayload("Already playing in this match".to_string()));
    }
    if session.spectators().contains(&conn) {
        outbox.send(conn, ServerEvent::Spectating(session.summary()));
        return Ok(session.spectators().len());
    }

    if store.spectating(conn).is_some() {
        leave_spectating(store, outbox, conn);
    }

    let count = store.add_spectator(session_id, conn)?;
    let session = store.get(session_id)?;
    debug!(session = %session_id, connection = %conn, spectators = count, "Spectator joined");

    outbox.broadcast(
        session,
        &ServerEvent::PlayerJoined {
            session_id,
            spectator_count: count,
        },
    );
    outbox.send(conn, ServerEvent::Spectating(session.summary()));
    Ok(count)
}

/// Remove `conn` from whatever it is watching and tell the rest of the room.
pub fn leave_spectating(store: &mut SessionStore, outbox: &mut Outbox, conn: ConnectionId) -> Option<(SessionId, usize)> {
    let (session_id, count) = store.remove_spectator(conn)?;
    debug!(session = %session_id, connection = %conn, spectators = count, "Spectator left");

    if let Ok(session) = store.get(session_id) {
        outbox.broadcast(
            session,
            &ServerEvent::SpectatorLeft {
                session_id,
                spectator_count: count,
            },
        );
    }
    Some((session_id, count))
}
