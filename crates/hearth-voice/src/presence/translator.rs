//! Background task that turns table change events into `PresenceChange`s.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::Participant;
use crate::realtime::{ChangeType, PostgresChange, RealtimeEvent};

use super::PresenceChange;

/// Map one row change to a presence change. Rows missing a `user_id`
/// are dropped.
pub fn translate_change(change: &PostgresChange) -> Option<PresenceChange> {
    match change.change_type {
        ChangeType::Insert | ChangeType::Update => {
            let participant: Participant = match serde_json::from_value(change.record.clone()) {
                Ok(participant) => participant,
                Err(e) => {
                    warn!(error = %e, "Unparseable participant row");
                    return None;
                }
            };
            if change.change_type == ChangeType::Insert {
                Some(PresenceChange::Inserted(participant))
            } else {
                Some(PresenceChange::Updated(participant))
            }
        }
        ChangeType::Delete => {
            let user_id = change.old_record.get("user_id")?.as_str()?.to_string();
            Some(PresenceChange::Deleted { user_id })
        }
    }
}

/// Whether the change concerns `room_id`. Delete events bypass the
/// server-side filter, so the key in `old_record` is checked here.
fn in_room(change: &PostgresChange, room_id: &str) -> bool {
    let row = match change.change_type {
        ChangeType::Delete => &change.old_record,
        ChangeType::Insert | ChangeType::Update => &change.record,
    };
    row.get("room_id")
        .and_then(|v| v.as_str())
        .map_or(true, |room| room == room_id)
}

pub(crate) async fn change_translator(
    topic: String,
    room_id: String,
    mut rt_rx: mpsc::Receiver<RealtimeEvent>,
    change_tx: mpsc::Sender<PresenceChange>,
) {
    while let Some(rt_event) = rt_rx.recv().await {
        match rt_event {
            RealtimeEvent::PostgresChange { change, .. } => {
                if !in_room(&change, &room_id) {
                    continue;
                }
                let Some(presence_change) = translate_change(&change) else {
                    debug!(topic = %topic, "Ignoring row change without participant");
                    continue;
                };
                if change_tx.send(presence_change).await.is_err() {
                    break;
                }
            }
            RealtimeEvent::ChannelJoined { .. } => info!(topic = %topic, "Presence feed rejoined"),
            RealtimeEvent::ChannelError { message, .. } => {
                warn!(topic = %topic, message = %message, "Presence feed error")
            }
            other => debug!(topic = %topic, event = ?other, "Ignoring realtime event"),
        }
    }
    debug!(topic = %topic, "Presence translator stopped");
}
