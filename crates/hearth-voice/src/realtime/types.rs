//! Configuration, protocol types, and event/command enums for the realtime client.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where and how to reach a project's Realtime socket.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub project_ref: String,
    /// Publishable anon key, sent as `apikey` on every request.
    pub api_key: String,
    /// User JWT. Channels and PostgREST calls fall back to the anon key.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    /// First reconnect delay; doubled per failed attempt.
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl RealtimeConfig {
    pub(crate) fn ws_url(&self) -> String {
        format!(
            "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.project_ref, self.api_key
        )
    }

    /// Base URL of the project's PostgREST endpoint.
    pub fn rest_url(&self) -> String {
        format!("https://{}.supabase.co/rest/v1", self.project_ref)
    }

    /// Bearer token for HTTP and channel auth: the user's JWT when present,
    /// otherwise the anon key.
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }
}

// ---------------------------------------------------------------------------
// Phoenix frames
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

/// `phx_join` options for one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub postgres_changes: Vec<PostgresChangesFilter>,
}

/// The channel's `broadcast` join options.
#[derive(Debug, Clone, Default)]
pub struct BroadcastConfig {
    /// Echo our own broadcasts back to us (`self`).
    pub self_send: bool,
    /// Ask the server to acknowledge each broadcast.
    pub ack: bool,
}

/// A row-change subscription on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresChangesFilter {
    /// `"*"`, `"INSERT"`, `"UPDATE"` or `"DELETE"`.
    pub event: String,
    pub schema: String,
    pub table: String,
    /// PostgREST-style filter, e.g. `room_id=eq.general`.
    pub filter: Option<String>,
}

impl PostgresChangesFilter {
    /// Every change on `public.<table>` matching `filter`.
    pub fn all(table: &str, filter: Option<String>) -> Self {
        Self {
            event: "*".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
            filter,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "event": self.event,
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            value["filter"] = serde_json::Value::String(filter.clone());
        }
        value
    }
}

impl ChannelConfig {
    /// A broadcast-only channel that does not echo our own messages.
    pub fn broadcast_only() -> Self {
        Self::default()
    }

    /// A channel carrying only the given table change feed.
    pub fn postgres_changes(filter: PostgresChangesFilter) -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            postgres_changes: vec![filter],
        }
    }

    /// Payload of the `phx_join` frame.
    pub(crate) fn to_join_payload(&self, access_token: Option<&str>) -> serde_json::Value {
        let changes: Vec<serde_json::Value> =
            self.postgres_changes.iter().map(|f| f.to_json()).collect();
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": {
                    "key": ""
                },
                "postgres_changes": changes
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::Value::String(token.to_string());
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INSERT" => Some(ChangeType::Insert),
            "UPDATE" => Some(ChangeType::Update),
            "DELETE" => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

/// One row change delivered on a `postgres_changes` subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresChange {
    pub change_type: ChangeType,
    pub schema: String,
    pub table: String,
    /// New row for inserts and updates; empty object for deletes.
    pub record: serde_json::Value,
    /// Previous row for updates and deletes. Only the primary key columns
    /// are present unless the table has `REPLICA IDENTITY FULL`.
    pub old_record: serde_json::Value,
}

/// What the socket task reports. Channel-scoped events go to the channel's
/// subscriber; the rest to the client-wide receiver.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    /// The server accepted our `phx_join` for this topic.
    ChannelJoined { topic: String },
    /// `phx_error`, `phx_close` or an error `system` message.
    ChannelError { topic: String, message: String },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    PostgresChange {
        topic: String,
        change: PostgresChange,
    },
    Error(String),
}

/// Requests from [`RealtimeClient`](super::RealtimeClient) handles to the socket task.
#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
    },
    LeaveChannel {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Disconnect,
}
