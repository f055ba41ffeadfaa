//! The socket task: connect, keep alive, rejoin, reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::router::Router;
use super::types::{
    ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

static NEXT_REF: AtomicU64 = AtomicU64::new(1);

/// Fresh `ref` for an outgoing Phoenix frame.
pub(crate) fn next_ref() -> String {
    NEXT_REF.fetch_add(1, Ordering::Relaxed).to_string()
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Joined channels by topic, replayed after every reconnect.
type JoinedChannels = Arc<RwLock<HashMap<String, ChannelConfig>>>;

/// Reconnect delay, doubled after each attempt up to a ceiling.
struct Backoff {
    base: u64,
    max: u64,
    current: u64,
}

impl Backoff {
    fn new(base_secs: u64, max_secs: u64) -> Self {
        Self {
            base: base_secs,
            max: max_secs.max(base_secs),
            current: base_secs,
        }
    }

    fn reset(&mut self) {
        self.current = self.base;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current.saturating_mul(2)).min(self.max);
        Duration::from_secs(delay)
    }
}

enum SocketEnd {
    /// The server or the network dropped us; reconnect.
    Dropped,
    /// `disconnect()` was called or every client handle is gone.
    Shutdown,
}

/// State that outlives any single socket.
struct Connection {
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    router: Arc<Router>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    commands: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    channels: JoinedChannels,
}

pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    router: Arc<Router>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let mut backoff = Backoff::new(config.reconnect_delay_secs, config.max_reconnect_delay_secs);
    let conn = Connection {
        config,
        connected,
        router,
        event_tx,
        commands: Arc::new(Mutex::new(command_rx)),
        channels: Arc::new(RwLock::new(HashMap::new())),
    };

    loop {
        match conn.open().await {
            Ok(socket) => {
                backoff.reset();
                if let SocketEnd::Shutdown = conn.run(socket).await {
                    info!("Realtime client shut down");
                    return;
                }
            }
            Err(message) => {
                error!(error = %message, "Supabase Realtime unreachable");
                let _ = conn.event_tx.send(RealtimeEvent::Error(message)).await;
            }
        }

        let delay = backoff.next_delay();
        info!(delay_secs = delay.as_secs(), "Reconnecting to Supabase Realtime");
        tokio::time::sleep(delay).await;
    }
}

impl Connection {
    async fn open(&self) -> Result<Socket, String> {
        let url = self.config.ws_url();
        info!(project_ref = %self.config.project_ref, "Connecting to Supabase Realtime");
        match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await {
            Ok(Ok((socket, _))) => Ok(socket),
            Ok(Err(e)) => Err(format!("connection failed: {e}")),
            Err(_) => Err(format!(
                "connection timed out after {}s",
                CONNECT_TIMEOUT.as_secs()
            )),
        }
    }

    /// Serve one socket until it drops or the client shuts down.
    async fn run(&self, socket: Socket) -> SocketEnd {
        *self.connected.write().await = true;
        let _ = self.event_tx.send(RealtimeEvent::Connected).await;

        let (writer, mut reader) = socket.split();
        let writer = Arc::new(Mutex::new(writer));
        let token = self.config.access_token.clone();

        for (topic, channel) in self.channels.read().await.iter() {
            info!(topic = %topic, "Rejoining channel");
            send_join(&writer, &self.router, topic, channel, token.as_deref()).await;
        }

        let heartbeat = tokio::spawn(heartbeat_task(
            Arc::clone(&writer),
            self.config.heartbeat_interval_secs,
        ));
        let forwarder = tokio::spawn(command_forwarder(
            Arc::clone(&self.commands),
            Arc::clone(&writer),
            Arc::clone(&self.channels),
            Arc::clone(&self.router),
            token,
            self.event_tx.clone(),
        ));

        while let Some(frame) = reader.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<PhoenixMessage>(&text) {
                    Ok(msg) => handle_phoenix_message(&msg, &self.router, &self.event_tx).await,
                    Err(e) => debug!(error = %e, "Skipping non-Phoenix frame"),
                },
                Ok(WsMessage::Close(frame)) => {
                    info!(?frame, "Supabase Realtime closed the socket");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Realtime socket error");
                    break;
                }
            }
        }

        heartbeat.abort();
        // The forwarder ends by itself only on shutdown.
        let shutdown = forwarder.is_finished();
        forwarder.abort();
        *self.connected.write().await = false;
        let _ = self.event_tx.send(RealtimeEvent::Disconnected).await;

        if shutdown {
            SocketEnd::Shutdown
        } else {
            SocketEnd::Dropped
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

async fn send_frame<S>(writer: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    let Ok(json) = serde_json::to_string(msg) else {
        return false;
    };
    writer
        .lock()
        .await
        .send(WsMessage::Text(json.into()))
        .await
        .is_ok()
}

fn frame(topic: &str, event: &str, payload: serde_json::Value) -> PhoenixMessage {
    PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: event.to_string(),
        payload,
        msg_ref: Some(next_ref()),
    }
}

/// Send `phx_join` and register its ref so the reply confirms the topic.
async fn send_join<S>(
    writer: &Mutex<S>,
    router: &Router,
    topic: &str,
    config: &ChannelConfig,
    access_token: Option<&str>,
) where
    S: Sink<WsMessage> + Unpin,
{
    let msg = frame(topic, "phx_join", config.to_join_payload(access_token));
    if let Some(msg_ref) = &msg.msg_ref {
        router.expect_join(msg_ref, topic).await;
    }
    if !send_frame(writer, &msg).await {
        warn!(topic = %topic, "Failed to send phx_join");
    }
}

fn leave_message(topic: &str) -> PhoenixMessage {
    frame(topic, "phx_leave", serde_json::json!({}))
}

fn broadcast_message(topic: &str, event: &str, payload: serde_json::Value) -> PhoenixMessage {
    frame(
        topic,
        "broadcast",
        serde_json::json!({
            "type": "broadcast",
            "event": event,
            "payload": payload,
        }),
    )
}

async fn heartbeat_task<S>(writer: Arc<Mutex<S>>, interval_secs: u64)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        let beat = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if !send_frame(&writer, &beat).await {
            debug!("Heartbeat stopped, socket gone");
            break;
        }
    }
}

/// Write client commands to the current socket. Returns when the client
/// asks to disconnect or every client handle is dropped.
async fn command_forwarder<S>(
    commands: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    writer: Arc<Mutex<S>>,
    channels: JoinedChannels,
    router: Arc<Router>,
    access_token: Option<String>,
    event_tx: mpsc::Sender<RealtimeEvent>,
) where
    S: Sink<WsMessage> + Unpin,
{
    let mut commands = commands.lock().await;
    while let Some(command) = commands.recv().await {
        match command {
            RealtimeCommand::JoinChannel { topic, config } => {
                send_join(&writer, &router, &topic, &config, access_token.as_deref()).await;
                channels.write().await.insert(topic, config);
            }
            RealtimeCommand::LeaveChannel { topic } => {
                send_frame(&writer, &leave_message(&topic)).await;
                channels.write().await.remove(&topic);
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
            } => {
                if !send_frame(&writer, &broadcast_message(&topic, &event, payload)).await {
                    warn!(topic = %topic, event = %event, "Failed to send broadcast");
                }
            }
            RealtimeCommand::Disconnect => {
                let topics: Vec<String> = channels.write().await.drain().map(|(t, _)| t).collect();
                for topic in &topics {
                    send_frame(&writer, &leave_message(topic)).await;
                }
                let _ = writer.lock().await.send(WsMessage::Close(None)).await;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
                return;
            }
        }
    }
}
