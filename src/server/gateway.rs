//! Newline-delimited JSON transport.
//!
//! One `ClientMessage` per inbound line, one `ServerEvent` per outbound
//! line. Each connection gets a reader (this task) and a writer task that
//! drains the connection's event channel. When the engine drops a client
//! whose event buffer filled up, the writer stops and the connection is
//! closed. A join request with an empty deck is completed from the profile
//! store before it reaches the engine.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::runtime::{BattleHandle, ClientConnection};
use crate::core::BattleError;
use crate::persistence::ProfileStore;
use crate::protocol::{ClientMessage, JoinRequest};

/// Accepts connections and bridges them to the engine.
#[derive(Clone)]
pub struct Gateway {
    handle: BattleHandle,
    profiles: Arc<dyn ProfileStore>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").field("handle", &self.handle).finish_non_exhaustive()
    }
}

impl Gateway {
    #[must_use]
    pub fn new(handle: BattleHandle, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { handle, profiles }
    }

    /// Accept connections forever.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "Listening");
        loop {
            let (socket, peer) = listener.accept().await?;
            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(err) = gateway.serve_connection(socket, Some(peer)).await {
                    debug!(%peer, error = %err, "Connection closed with error");
                }
            });
        }
    }

    /// Run one connection until the peer hangs up or the engine stops.
    pub async fn serve_connection<S>(&self, stream: S, peer: Option<SocketAddr>) -> Result<(), BattleError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let ClientConnection { id, mut events } = self.handle.connect()?;
        debug!(connection = %id, ?peer, "Client connected");

        let (reader, mut writer) = tokio::io::split(stream);
        let mut writer_task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut line = match serde_json::to_vec(&event) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(connection = %id, error = %err, "Could not encode event");
                        continue;
                    }
                };
                line.push(b'\n');
                if writer.write_all(&line).await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        let read_loop = async {
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(err) => {
                        debug!(connection = %id, error = %err, "Read failed");
                        break Ok(());
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let sent = match ClientMessage::parse(line) {
                    Ok(mut message) => {
                        let queue_request = message.is_queue_request();
                        let filled = match message.join_request_mut() {
                            Some(req) => self.fill_from_profile(req).await,
                            None => Ok(()),
                        };
                        match filled {
                            Ok(()) => self.handle.send(id, message),
                            Err(err) => self.handle.reject(id, err, queue_request),
                        }
                    }
                    Err(err) => self.handle.reject(id, err, false),
                };
                if let Err(err) = sent {
                    break Err(err);
                }
            }
        };
        let result = tokio::select! {
            result = read_loop => result,
            _ = &mut writer_task => {
                debug!(connection = %id, "Writer closed; dropping connection");
                Ok(())
            }
        };

        // Engine may already be gone; nothing left to clean up then.
        let _ = self.handle.disconnect(id);
        debug!(connection = %id, "Client disconnected");
        result
    }

    /// Load deck (and a missing display name) for a join without a deck.
    async fn fill_from_profile(&self, req: &mut JoinRequest) -> Result<(), BattleError> {
        if !req.deck.is_empty() {
            return Ok(());
        }
        match self.profiles.load_profile(&req.user_id).await {
            Ok(Some(profile)) => {
                req.deck = profile.deck;
                if req.display_name.trim().is_empty() {
                    req.display_name = profile.display_name;
                }
                Ok(())
            }
            Ok(None) => Err(BattleError::QueueFailure(format!("No profile for user {}", req.user_id))),
            Err(err) => {
                warn!(user = %req.user_id, error = %err, "Profile lookup failed");
                Err(BattleError::QueueFailure("Could not load deck".to_string()))
            }
        }
    }
}
