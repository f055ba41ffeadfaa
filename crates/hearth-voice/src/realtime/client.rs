//! Public handle for interacting with the Supabase Realtime connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::connection::connection_loop;
use super::router::Router;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};
use crate::error::{Result, VoiceError};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the Supabase Realtime connection.
///
/// All methods send commands to the background connection task. Clones
/// share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
    router: Arc<Router>,
    project_ref: String,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`; the receiver carries
    /// connection-level events and must be drained.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));
        let router = Arc::new(Router::default());

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
            router: Arc::clone(&router),
            project_ref: config.project_ref.clone(),
        };

        tokio::spawn(connection_loop(config, connected, router, event_tx, command_rx));

        (client, event_rx)
    }

    pub fn project_ref(&self) -> &str {
        &self.project_ref
    }

    /// Join a channel. Every event for `topic`, including the join
    /// confirmation, arrives on the returned receiver.
    pub async fn join_channel(
        &self,
        topic: &str,
        config: ChannelConfig,
    ) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let (tx, rx) = mpsc::channel(256);
        self.router.register(topic, tx).await;
        let sent = self
            .send(RealtimeCommand::JoinChannel {
                topic: topic.to_string(),
                config,
            })
            .await;
        if sent.is_err() {
            self.router.unregister(topic).await;
        }
        sent.map(|()| rx)
    }

    /// Leave a channel and stop routing its events.
    pub async fn leave_channel(&self, topic: &str) -> Result<()> {
        self.router.unregister(topic).await;
        self.send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await
    }

    /// Send a broadcast event on a channel.
    pub async fn broadcast(&self, topic: &str, event: &str, payload: serde_json::Value) -> Result<()> {
        self.send(RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Disconnect from the server.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(RealtimeCommand::Disconnect).await;
    }

    async fn send(&self, command: RealtimeCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| VoiceError::Relay("realtime connection task has stopped".into()))
    }
}

/// Wait on a channel's receiver until the server confirms the join.
///
/// Fails on a join error, on a closed receiver, or once `timeout` elapses.
pub async fn wait_for_join(
    events: &mut mpsc::Receiver<RealtimeEvent>,
    topic: &str,
    timeout: Duration,
) -> Result<()> {
    let confirmation = async {
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::ChannelJoined { .. } => return Ok(()),
                RealtimeEvent::ChannelError { message, .. } => {
                    return Err(VoiceError::Relay(format!("join of {topic} failed: {message}")))
                }
                other => debug!(topic = %topic, event = ?other, "Event before join confirmation"),
            }
        }
        Err(VoiceError::Relay(format!("channel {topic} closed before confirmation")))
    };
    tokio::time::timeout(timeout, confirmation)
        .await
        .map_err(|_| VoiceError::SubscribeTimeout(topic.to_string()))?
}
