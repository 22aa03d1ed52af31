//! Per-connection event delivery.
//!
//! Each connection registers a bounded sender; the engine pushes
//! `ServerEvent`s to one connection or to a session's whole audience without
//! ever waiting. A send to a closed or full receiver unregisters that
//! connection, which closes its writer and so the transport connection.

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::core::ConnectionId;
use crate::protocol::ServerEvent;
use crate::session::Session;

pub type EventSender = mpsc::Sender<ServerEvent>;
pub type EventReceiver = mpsc::Receiver<ServerEvent>;

/// Registered connections and their senders.
#[derive(Debug, Default)]
pub struct Outbox {
    senders: FxHashMap<ConnectionId, EventSender>,
}

impl Outbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn`, replacing any previous sender.
    pub fn register(&mut self, conn: ConnectionId, sender: EventSender) {
        self.senders.insert(conn, sender);
    }

    pub fn unregister(&mut self, conn: ConnectionId) -> bool {
        self.senders.remove(&conn).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, conn: ConnectionId) -> bool {
        self.senders.contains_key(&conn)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Deliver to one connection. Returns false if it is gone or too far
    /// behind, in which case it is dropped.
    pub fn send(&mut self, conn: ConnectionId, event: ServerEvent) -> bool {
        let Some(sender) = self.senders.get(&conn) else {
            return false;
        };
        trace!(connection = %conn, event = event.kind(), "send");
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(connection = %conn, event = event.kind(), "Outbound buffer full; dropping slow client");
                self.senders.remove(&conn);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.senders.remove(&conn);
                false
            }
        }
    }

    /// Deliver to every connection in `targets`.
    pub fn send_all(&mut self, targets: impl IntoIterator<Item = ConnectionId>, event: &ServerEvent) {
        for conn in targets {
            self.send(conn, event.clone());
        }
    }

    /// Deliver to a session's players and spectators.
    pub fn broadcast(&mut self, session: &Session, event: &ServerEvent) {
        self.send_all(session.audience(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(position: usize) -> ServerEvent {
        ServerEvent::QueueStatus { position }
    }

    #[test]
    fn test_send_to_registered() {
        let mut outbox = Outbox::new();
        let (tx, mut rx) = mpsc::channel(8);
        outbox.register(ConnectionId::new(1), tx);

        assert!(outbox.send(ConnectionId::new(1), status(1)));
        assert_eq!(rx.try_recv().unwrap(), status(1));
    }

    #[test]
    fn test_send_to_unknown() {
        let mut outbox = Outbox::new();
        assert!(!outbox.send(ConnectionId::new(5), status(1)));
    }

    #[test]
    fn test_closed_receiver_unregisters() {
        let mut outbox = Outbox::new();
        let (tx, rx) = mpsc::channel(8);
        outbox.register(ConnectionId::new(1), tx);
        drop(rx);

        assert!(!outbox.send(ConnectionId::new(1), status(1)));
        assert!(!outbox.is_registered(ConnectionId::new(1)));
    }

    #[test]
    fn test_full_buffer_drops_slow_reader() {
        let mut outbox = Outbox::new();
        let (tx, mut rx) = mpsc::channel(2);
        outbox.register(ConnectionId::new(1), tx);

        assert!(outbox.send(ConnectionId::new(1), status(1)));
        assert!(outbox.send(ConnectionId::new(1), status(2)));
        assert!(!outbox.send(ConnectionId::new(1), status(3)));
        assert!(!outbox.is_registered(ConnectionId::new(1)));

        assert_eq!(rx.try_recv().unwrap(), status(1));
        assert_eq!(rx.try_recv().unwrap(), status(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_all() {
        let mut outbox = Outbox::new();
        let mut receivers = Vec::new();
        for id in 1..=3 {
            let (tx, rx) = mpsc::channel(8);
            outbox.register(ConnectionId::new(id), tx);
            receivers.push(rx);
        }

        outbox.send_all([ConnectionId::new(1), ConnectionId::new(3)], &status(2));

        assert!(receivers[0].try_recv().is_ok());
        assert!(receivers[1].try_recv().is_err());
        assert!(receivers[2].try_recv().is_ok());
    }
}
