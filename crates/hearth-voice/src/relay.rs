//! Room-scoped broadcast of signaling messages.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{signal_topic, SignalMessage, VOICE_SIGNAL_EVENT};
use crate::realtime::{wait_for_join, ChannelConfig, RealtimeClient, RealtimeEvent};

/// A confirmed signaling subscription.
///
/// Only a [`SignalRelay`] hands these out, and only after the room's
/// channel is live. Joining presence requires one, so no participant can
/// be announced before its signaling path is able to receive offers.
#[derive(Debug)]
pub struct SignalSubscription {
    room_id: String,
    messages: mpsc::Receiver<SignalMessage>,
}

impl SignalSubscription {
    /// Wrap a receiver whose channel the relay has confirmed.
    pub fn confirmed(room_id: &str, messages: mpsc::Receiver<SignalMessage>) -> Self {
        Self {
            room_id: room_id.to_string(),
            messages,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next signal for the room, or `None` once the relay stopped.
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        self.messages.recv().await
    }
}

#[async_trait]
pub trait SignalRelay: Send + Sync {
    /// Subscribe to the room's signaling channel. Resolves only once the
    /// channel is confirmed; fails on timeout.
    async fn subscribe(&self, room_id: &str) -> Result<SignalSubscription>;

    /// Broadcast a message to every other subscriber of the room.
    async fn publish(&self, room_id: &str, message: &SignalMessage) -> Result<()>;

    /// Stop receiving the room's signals.
    async fn unsubscribe(&self, room_id: &str);
}

/// [`SignalRelay`] over a Supabase Realtime broadcast channel.
pub struct RealtimeSignalRelay {
    client: RealtimeClient,
    confirm_timeout: Duration,
}

impl RealtimeSignalRelay {
    pub fn new(client: RealtimeClient, confirm_timeout: Duration) -> Self {
        Self {
            client,
            confirm_timeout,
        }
    }
}

#[async_trait]
impl SignalRelay for RealtimeSignalRelay {
    async fn subscribe(&self, room_id: &str) -> Result<SignalSubscription> {
        let topic = signal_topic(room_id);
        let mut events = self
            .client
            .join_channel(&topic, ChannelConfig::broadcast_only())
            .await?;

        if let Err(e) = wait_for_join(&mut events, &topic, self.confirm_timeout).await {
            warn!(topic = %topic, error = %e, "Signaling channel not confirmed");
            let _ = self.client.leave_channel(&topic).await;
            return Err(e);
        }
        info!(topic = %topic, "Signaling channel confirmed");

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(forward_signals(topic, events, tx));
        Ok(SignalSubscription::confirmed(room_id, rx))
    }

    async fn publish(&self, room_id: &str, message: &SignalMessage) -> Result<()> {
        let payload = serde_json::to_value(message)?;
        self.client
            .broadcast(&signal_topic(room_id), VOICE_SIGNAL_EVENT, payload)
            .await
    }

    async fn unsubscribe(&self, room_id: &str) {
        let topic = signal_topic(room_id);
        if let Err(e) = self.client.leave_channel(&topic).await {
            debug!(topic = %topic, error = %e, "Leave after realtime shutdown");
        }
    }
}

/// Turn the channel's broadcast events into [`SignalMessage`]s until the
/// subscriber or the channel goes away.
async fn forward_signals(
    topic: String,
    mut events: mpsc::Receiver<RealtimeEvent>,
    tx: mpsc::Sender<SignalMessage>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RealtimeEvent::Broadcast { event, payload, .. } if event == VOICE_SIGNAL_EVENT => {
                match serde_json::from_value::<SignalMessage>(payload) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "Dropping malformed voice signal"),
                }
            }
            RealtimeEvent::Broadcast { event, .. } => {
                debug!(topic = %topic, event = %event, "Ignoring unrelated broadcast")
            }
            RealtimeEvent::ChannelJoined { .. } => info!(topic = %topic, "Signaling channel rejoined"),
            RealtimeEvent::ChannelError { message, .. } => {
                warn!(topic = %topic, message = %message, "Signaling channel error")
            }
            other => debug!(topic = %topic, event = ?other, "Ignoring realtime event"),
        }
    }
    debug!(topic = %topic, "Signal forwarder stopped");
}
