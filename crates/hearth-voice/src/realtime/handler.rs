//! Incoming Phoenix message handler.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::router::Router;
use super::types::{ChangeType, PhoenixMessage, PostgresChange, RealtimeEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Parse the `data` object of a `postgres_changes` message.
pub(crate) fn parse_postgres_change(payload: &serde_json::Value) -> Option<PostgresChange> {
    let data = payload.get("data")?;
    let change_type = ChangeType::parse(data.get("type")?.as_str()?)?;
    let text = |key: &str| {
        data.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let object = |key: &str| {
        data.get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    };
    Some(PostgresChange {
        change_type,
        schema: text("schema"),
        table: text("table"),
        record: object("record"),
        old_record: object("old_record"),
    })
}

fn reply_reason(payload: &serde_json::Value) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error")
        .to_string()
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    router: &Router,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");
            let joined = match &msg.msg_ref {
                Some(msg_ref) => router.take_join(msg_ref).await,
                None => None,
            };
            match (joined, status) {
                (Some(joined), "ok") => {
                    info!(topic = %joined, "Channel joined");
                    let event = RealtimeEvent::ChannelJoined {
                        topic: joined.clone(),
                    };
                    router.dispatch(&joined, event, event_tx).await;
                }
                (Some(joined), _) => {
                    let message = reply_reason(&msg.payload);
                    warn!(topic = %joined, status = %status, reason = %message, "Channel join rejected");
                    let event = RealtimeEvent::ChannelError {
                        topic: joined.clone(),
                        message,
                    };
                    router.dispatch(&joined, event, event_tx).await;
                }
                (None, "ok") => debug!(topic = %topic, "Reply: ok"),
                (None, _) => {
                    let message = reply_reason(&msg.payload);
                    warn!(topic = %topic, status = %status, reason = %message, "Reply error");
                    let event = RealtimeEvent::ChannelError {
                        topic: topic.to_string(),
                        message,
                    };
                    router.dispatch(topic, event, event_tx).await;
                }
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            let event = RealtimeEvent::ChannelError {
                topic: topic.to_string(),
                message: "Channel error".to_string(),
            };
            router.dispatch(topic, event, event_tx).await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            let event = RealtimeEvent::ChannelError {
                topic: topic.to_string(),
                message: "Channel closed".to_string(),
            };
            router.dispatch(topic, event, event_tx).await;
        }
        "system" => {
            let status = msg.payload.get("status").and_then(|s| s.as_str());
            let message = msg
                .payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            if status == Some("error") {
                warn!(topic = %topic, message = %message, "System error on channel");
                let event = RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message,
                };
                router.dispatch(topic, event, event_tx).await;
            } else {
                debug!(topic = %topic, message = %message, "System message");
            }
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            let event = RealtimeEvent::Broadcast {
                topic: topic.to_string(),
                event: inner_event,
                payload: inner_payload,
            };
            router.dispatch(topic, event, event_tx).await;
        }
        "postgres_changes" => match parse_postgres_change(&msg.payload) {
            Some(change) => {
                debug!(topic = %topic, table = %change.table, kind = ?change.change_type, "Row change received");
                let event = RealtimeEvent::PostgresChange {
                    topic: topic.to_string(),
                    change,
                };
                router.dispatch(topic, event, event_tx).await;
            }
            None => warn!(topic = %topic, "Unparseable postgres_changes payload"),
        },
        _ => {
            debug!(
                topic = %topic,
                event = %msg.event,
                "Unhandled Phoenix event"
            );
        }
    }
}
