//! Per-topic delivery of realtime events.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use super::types::RealtimeEvent;

/// Maps joined topics to their subscribers and outstanding `phx_join`
/// refs to their topics.
#[derive(Default)]
pub(crate) struct Router {
    routes: RwLock<HashMap<String, mpsc::Sender<RealtimeEvent>>>,
    pending_joins: Mutex<HashMap<String, String>>,
}

impl Router {
    pub(crate) async fn register(&self, topic: &str, tx: mpsc::Sender<RealtimeEvent>) {
        self.routes.write().await.insert(topic.to_string(), tx);
    }

    pub(crate) async fn unregister(&self, topic: &str) {
        self.routes.write().await.remove(topic);
    }

    /// Remember that the reply to `msg_ref` confirms a join of `topic`.
    pub(crate) async fn expect_join(&self, msg_ref: &str, topic: &str) {
        self.pending_joins
            .lock()
            .await
            .insert(msg_ref.to_string(), topic.to_string());
    }

    pub(crate) async fn take_join(&self, msg_ref: &str) -> Option<String> {
        self.pending_joins.lock().await.remove(msg_ref)
    }

    /// Deliver `event` to the subscriber of `topic`, or to `fallback`
    /// when nobody joined it through [`super::RealtimeClient::join_channel`].
    pub(crate) async fn dispatch(
        &self,
        topic: &str,
        event: RealtimeEvent,
        fallback: &mpsc::Sender<RealtimeEvent>,
    ) {
        let route = self.routes.read().await.get(topic).cloned();
        match route {
            Some(tx) => {
                if tx.send(event).await.is_err() {
                    debug!(topic = %topic, "Subscriber dropped, removing route");
                    self.unregister(topic).await;
                }
            }
            None => {
                let _ = fallback.send(event).await;
            }
        }
    }
}
