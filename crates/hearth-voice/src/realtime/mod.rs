//! Thin Supabase Realtime client over the Phoenix Channels v1 protocol.
//!
//! One WebSocket connection carries every channel a session needs: the
//! room's signaling broadcasts and the presence table's change feed.
//! Events for a joined topic are routed to the receiver returned by
//! [`RealtimeClient::join_channel`]; connection-level events go to the
//! receiver returned by [`RealtimeClient::connect`].

mod client;
mod connection;
mod handler;
mod router;
mod types;

pub use client::{wait_for_join, RealtimeClient};
pub use types::{
    BroadcastConfig, ChangeType, ChannelConfig, PhoenixMessage, PostgresChange,
    PostgresChangesFilter, RealtimeConfig, RealtimeEvent,
};
