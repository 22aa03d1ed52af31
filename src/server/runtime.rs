//! Single-consumer engine loop.
//!
//! `BattleServer` owns the `BattleEngine` and is the only task that touches
//! it. Client requests arrive as `Command`s over one channel and timer
//! expiries over another; the loop handles one message at a time, so no
//! action is ever interleaved mid-resolution. A panic inside a handler is
//! caught, logged and contained to that message.
//!
//! On shutdown the loop drains every session, then waits (bounded by
//! [`PERSISTENCE_FLUSH_TIMEOUT`]) for the resulting history writes before it
//! replies, so a process that exits right after `shutdown()` loses nothing.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::engine::{BattleEngine, EngineStats};
use crate::core::{BattleConfig, BattleError, ConnectionId, ConnectionIdAllocator, SessionId};
use crate::lifecycle::LifecycleHandler;
use crate::persistence::{LeaderboardStore, MatchHistoryStore};
use crate::protocol::ClientMessage;
use crate::relay::{EventReceiver, EventSender};
use crate::session::SessionSummary;
use crate::turn::{TimerEvent, TimerScheduler};

/// Upper bound on waiting for persistence writes when the engine stops.
pub const PERSISTENCE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages consumed by the engine loop.
#[derive(Debug)]
pub enum Command {
    Connect {
        connection: ConnectionId,
        sender: EventSender,
    },
    Client {
        connection: ConnectionId,
        message: ClientMessage,
    },
    /// A request that failed to parse at the transport.
    Reject {
        connection: ConnectionId,
        error: BattleError,
        queue_request: bool,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Inspect {
        session: SessionId,
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    /// Drain every session and stop the loop.
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
    /// Panic inside a contained handler.
    #[cfg(test)]
    Panic,
}

/// A connection's id and the events addressed to it.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub events: EventReceiver,
}

/// Cloneable front door to a running `BattleServer`.
#[derive(Clone, Debug)]
pub struct BattleHandle {
    commands: mpsc::UnboundedSender<Command>,
    ids: Arc<ConnectionIdAllocator>,
    outbound_buffer: usize,
}

impl BattleHandle {
    fn submit(&self, command: Command) -> Result<(), BattleError> {
        self.commands.send(command).map_err(|_| BattleError::ChannelClosed)
    }

    /// Register a new connection.
    pub fn connect(&self) -> Result<ClientConnection, BattleError> {
        let id = self.ids.next_id();
        let (sender, events) = mpsc::channel(self.outbound_buffer);
        self.submit(Command::Connect { connection: id, sender })?;
        Ok(ClientConnection { id, events })
    }

    /// Forward a parsed request.
    pub fn send(&self, connection: ConnectionId, message: ClientMessage) -> Result<(), BattleError> {
        self.submit(Command::Client { connection, message })
    }

    /// Report a request the transport could not parse.
    pub fn reject(&self, connection: ConnectionId, error: BattleError, queue_request: bool) -> Result<(), BattleError> {
        self.submit(Command::Reject {
            connection,
            error,
            queue_request,
        })
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<(), BattleError> {
        self.submit(Command::Disconnect { connection })
    }

    /// Snapshot of a live session.
    pub async fn session(&self, session: SessionId) -> Result<Option<SessionSummary>, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Inspect { session, reply })?;
        rx.await.map_err(|_| BattleError::ChannelClosed)
    }

    pub async fn stats(&self) -> Result<EngineStats, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Stats { reply })?;
        rx.await.map_err(|_| BattleError::ChannelClosed)
    }

    /// Abandon every session, clear the queue and stop the engine.
    ///
    /// Returns the number of sessions that were abandoned.
    pub async fn shutdown(&self) -> Result<usize, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Shutdown { reply })?;
        rx.await.map_err(|_| BattleError::ChannelClosed)
    }
}

/// Owns the engine and runs its loop.
#[derive(Debug)]
pub struct BattleServer {
    engine: BattleEngine,
    commands: mpsc::UnboundedReceiver<Command>,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
}

impl BattleServer {
    /// Build a server and its handle. Call `run` (or use `spawn`) to start it.
    pub fn new(
        config: BattleConfig,
        history: Arc<dyn MatchHistoryStore>,
        leaderboard: Arc<dyn LeaderboardStore>,
    ) -> (Self, BattleHandle) {
        let (timers, timer_events) = TimerScheduler::new();
        let (tx, commands) = mpsc::unbounded_channel();
        let outbound_buffer = config.outbound_buffer;
        let engine = BattleEngine::new(Arc::new(config), LifecycleHandler::new(history, leaderboard), timers);

        let server = Self {
            engine,
            commands,
            timer_events,
        };
        let handle = BattleHandle {
            commands: tx,
            ids: Arc::new(ConnectionIdAllocator::new()),
            outbound_buffer,
        };
        (server, handle)
    }

    /// Build and spawn onto the current runtime.
    pub fn spawn(
        config: BattleConfig,
        history: Arc<dyn MatchHistoryStore>,
        leaderboard: Arc<dyn LeaderboardStore>,
    ) -> (BattleHandle, JoinHandle<()>) {
        let (server, handle) = Self::new(config, history, leaderboard);
        (handle, tokio::spawn(server.run()))
    }

    /// Process commands and timer events until shutdown or every handle is
    /// dropped.
    pub async fn run(mut self) {
        info!("Battle engine started");
        let shutdown = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break None;
                    };
                    if let Some(reply) = self.apply(command) {
                        break Some(reply);
                    }
                }
                Some(event) = self.timer_events.recv() => {
                    self.contained("timer", |engine| engine.on_timer(event));
                }
            }
        };

        let mut drained = 0;
        if shutdown.is_some() {
            self.contained("shutdown", |engine| drained = engine.shutdown());
        }
        if tokio::time::timeout(PERSISTENCE_FLUSH_TIMEOUT, self.engine.flush_persistence())
            .await
            .is_err()
        {
            warn!("Timed out waiting for persistence writes");
        }
        if let Some(reply) = shutdown {
            let _ = reply.send(drained);
        }
        info!(drained, "Battle engine stopped");
    }

    /// Apply one command. A shutdown request is handed back to the loop.
    fn apply(&mut self, command: Command) -> Option<oneshot::Sender<usize>> {
        match command {
            Command::Connect { connection, sender } => {
                self.contained("connect", |engine| engine.connect(connection, sender));
            }
            Command::Client { connection, message } => {
                let kind = message.kind();
                self.contained(kind, |engine| engine.handle(connection, message));
            }
            Command::Reject {
                connection,
                error,
                queue_request,
            } => {
                self.contained("reject", |engine| engine.reject(connection, &error, queue_request));
            }
            Command::Disconnect { connection } => {
                self.contained("disconnect", |engine| engine.disconnect(connection));
            }
            Command::Inspect { session, reply } => {
                let _ = reply.send(self.engine.session_summary(session));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.engine.stats());
            }
            Command::Shutdown { reply } => return Some(reply),
            #[cfg(test)]
            Command::Panic => {
                self.contained("panic", |_| panic!("injected handler fault"));
            }
        }
        None
    }

    fn contained(&mut self, handler: &'static str, f: impl FnOnce(&mut BattleEngine)) {
        let engine = &mut self.engine;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(engine))) {
            error!(handler, panic = panic_message(&*panic), "Handler panicked; engine continues");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Card;
    use crate::core::{StoreError, UserId};
    use crate::persistence::{MatchRecord, MemoryStore};
    use crate::protocol::{JoinRequest, ServerEvent};
    use futures::future::{BoxFuture, FutureExt};

    /// Backend that takes a while to acknowledge each write.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl MatchHistoryStore for SlowStore {
        fn append_match(&self, record: MatchRecord) -> BoxFuture<'_, Result<(), StoreError>> {
            async move {
                tokio::time::sleep(self.delay).await;
                self.inner.append_match(record).await
            }
            .boxed()
        }
    }

    impl LeaderboardStore for SlowStore {
        fn record_win(&self, user_id: UserId, display_name: String) -> BoxFuture<'_, Result<(), StoreError>> {
            self.inner.record_win(user_id, display_name)
        }
    }

    fn spawn() -> BattleHandle {
        let backend = Arc::new(MemoryStore::new());
        let (handle, _task) = BattleServer::spawn(BattleConfig::default().with_seed(1), backend.clone(), backend);
        handle
    }

    fn join(user: &str) -> ClientMessage {
        ClientMessage::JoinBattle(JoinRequest {
            user_id: UserId::new(user),
            deck: vec![Card::new("Spark", 1, 3)].into(),
            display_name: String::new(),
        })
    }

    #[tokio::test]
    async fn test_connect_and_battle() {
        let handle = spawn();
        let mut client = handle.connect().unwrap();

        handle.send(client.id, join("alice")).unwrap();

        let event = client.events.recv().await.unwrap();
        let ServerEvent::BattleReady { session_id, .. } = event else {
            panic!("expected battleReady, got {event:?}");
        };
        let summary = handle.session(session_id).await.unwrap().unwrap();
        assert_eq!(summary.players[0].player_id, "alice");
        assert_eq!(handle.stats().await.unwrap().active_sessions, 1);
    }

    #[tokio::test]
    async fn test_reject_reaches_client() {
        let handle = spawn();
        let mut client = handle.connect().unwrap();

        handle
            .reject(client.id, BattleError::InvalidPayload("bad json".into()), false)
            .unwrap();

        assert!(matches!(
            client.events.recv().await,
            Some(ServerEvent::ActionError { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_engine() {
        let handle = spawn();
        let client = handle.connect().unwrap();
        handle.send(client.id, join("alice")).unwrap();

        assert_eq!(handle.shutdown().await, Ok(1));
        assert_eq!(handle.stats().await, Err(BattleError::ChannelClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_history_writes() {
        let backend = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_secs(1),
        });
        let (handle, _task) = BattleServer::spawn(BattleConfig::default().with_seed(1), backend.clone(), backend.clone());
        let mut client = handle.connect().unwrap();
        handle.send(client.id, join("alice")).unwrap();
        client.events.recv().await.unwrap();

        assert_eq!(handle.shutdown().await, Ok(1));

        let history = backend.inner.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, crate::session::EndReason::Shutdown);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let handle = spawn();
        let mut client = handle.connect().unwrap();

        handle.submit(Command::Panic).unwrap();

        assert_eq!(handle.stats().await.unwrap().connections, 1);
        handle.send(client.id, join("alice")).unwrap();
        assert!(matches!(
            client.events.recv().await,
            Some(ServerEvent::BattleReady { .. })
        ));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
