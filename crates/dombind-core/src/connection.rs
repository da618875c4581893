//! Connection manager
//!
//! Maintains one long-lived WebSocket connection to the server and
//! reconnects automatically with exponential backoff whenever it closes.
//!
//! Outbound messages are sent only while the connection is open. Anything
//! sent while connecting, while waiting to reconnect, or still queued when
//! the socket closes is dropped, never replayed on the next connection.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::engine::Outbox;
use crate::message::EventMessage;

/// Commands sent to the connection task
#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    /// Send one text frame
    Send(String),
    /// Close the connection and stop reconnecting
    Shutdown,
}

/// Events emitted by the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection status changed
    StatusChanged(ConnectionStatus),
    /// Text frame received
    Message(String),
    /// Connection attempt or transport failed
    Error(String),
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected; waiting to reconnect or shut down
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected; sends go through
    Open,
}

/// Configuration for the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket URL
    pub url: String,
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            initial_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Cloneable sending half of a connection
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    command_tx: mpsc::Sender<ConnectionCommand>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl ConnectionSender {
    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Send a text frame
    ///
    /// Returns false, dropping the text, if the connection is not open.
    pub fn send_text(&self, text: String) -> bool {
        if self.status() != ConnectionStatus::Open {
            debug!("Connection not open, dropping outbound message");
            return false;
        }
        match self.command_tx.try_send(ConnectionCommand::Send(text)) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping outbound message: {}", e);
                false
            }
        }
    }

    /// Serialize and send an event message
    pub fn send(&self, message: &EventMessage) -> bool {
        match message.encode() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!("Failed to encode event for '{}': {}", message.reference, e);
                false
            }
        }
    }

    /// Ask the connection task to close and stop
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown).await;
    }
}

impl Outbox for ConnectionSender {
    fn deliver(&mut self, message: EventMessage) -> bool {
        self.send(&message)
    }
}

/// Handle to control the connection task
pub struct ConnectionHandle {
    /// Send frames and commands
    pub sender: ConnectionSender,
    /// Receive events from the connection task
    pub event_rx: mpsc::Receiver<ConnectionEvent>,
    /// Watch connection status
    pub status_rx: watch::Receiver<ConnectionStatus>,
}

/// Spawn the connection task
///
/// Returns a handle to control and monitor it. The task connects at once
/// and reconnects on every disconnection until shut down.
pub fn spawn_connection(config: ConnectionConfig) -> ConnectionHandle {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(256);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

    tokio::spawn(connection_loop(config, command_rx, event_tx, status_tx));

    ConnectionHandle {
        sender: ConnectionSender {
            command_tx,
            status_rx: status_rx.clone(),
        },
        event_rx,
        status_rx,
    }
}

async fn announce(
    status: ConnectionStatus,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
) {
    let _ = status_tx.send(status);
    let _ = event_tx.send(ConnectionEvent::StatusChanged(status)).await;
}

/// Main connection loop with reconnection
async fn connection_loop(
    config: ConnectionConfig,
    mut command_rx: mpsc::Receiver<ConnectionCommand>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        announce(ConnectionStatus::Connecting, &event_tx, &status_tx).await;

        match run_connection(&config, &mut command_rx, &event_tx, &status_tx).await {
            Ok(true) => {
                announce(ConnectionStatus::Disconnected, &event_tx, &status_tx).await;
                info!("Connection to {} shut down", config.url);
                return;
            }
            Ok(false) => {
                // Connection closed after opening, reset backoff
                reconnect_delay = config.initial_reconnect_delay;
            }
            Err(e) => {
                warn!("Connection error: {:#}", e);
                let _ = event_tx
                    .send(ConnectionEvent::Error(format!("{:#}", e)))
                    .await;
            }
        }

        announce(ConnectionStatus::Disconnected, &event_tx, &status_tx).await;
        debug!("Reconnecting to {} in {:?}", config.url, reconnect_delay);

        // Wait before reconnecting; sends issued meanwhile are dropped
        let wait = tokio::time::sleep(reconnect_delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                cmd = command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Send(_)) => {
                        debug!("Dropping outbound message while disconnected");
                    }
                    Some(ConnectionCommand::Shutdown) | None => {
                        info!("Connection to {} shut down", config.url);
                        return;
                    }
                }
            }
        }

        // Exponential backoff
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
    }
}

/// Connect and pump frames until disconnection or shutdown
///
/// Returns `Ok(true)` on shutdown, `Ok(false)` when the server closed an
/// open connection.
async fn run_connection(
    config: &ConnectionConfig,
    command_rx: &mut mpsc::Receiver<ConnectionCommand>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
) -> Result<bool> {
    let (ws_stream, _response) = connect_async(&config.url)
        .await
        .with_context(|| format!("Failed to connect to {}", config.url))?;
    let (mut write, mut read) = ws_stream.split();

    // Anything already queued was issued before the socket opened
    while let Ok(cmd) = command_rx.try_recv() {
        match cmd {
            ConnectionCommand::Send(_) => debug!("Dropping message queued before open"),
            ConnectionCommand::Shutdown => {
                write.close().await.ok();
                return Ok(true);
            }
        }
    }

    info!("Connected to {}", config.url);
    announce(ConnectionStatus::Open, event_tx, status_tx).await;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(ConnectionCommand::Send(text)) => {
                    write.send(Message::Text(text)).await?;
                }
                Some(ConnectionCommand::Shutdown) | None => {
                    write.close().await.ok();
                    return Ok(true);
                }
            },

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if event_tx.send(ConnectionEvent::Message(text)).await.is_err() {
                        // Nobody is listening any more
                        write.close().await.ok();
                        return Ok(true);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Server closed connection to {}", config.url);
                    return Ok(false);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket error");
                }
                _ => {
                    // Binary, ping and pong frames
                }
            },
        }
    }
}
