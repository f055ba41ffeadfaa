//! [`PresenceStore`] over PostgREST with a Realtime change feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, VoiceError};
use crate::protocol::{presence_topic, Participant};
use crate::realtime::{wait_for_join, ChannelConfig, PostgresChangesFilter, RealtimeClient, RealtimeConfig};
use crate::relay::SignalSubscription;

use super::translator::change_translator;
use super::{PresenceChange, PresenceStore};

/// Presence rows live in `public.<table>` keyed by `(room_id, user_id)`.
/// The table needs `REPLICA IDENTITY FULL` for delete events to carry the
/// room of the removed row.
pub struct SupabasePresenceStore {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    bearer: String,
    table: String,
    realtime: RealtimeClient,
    confirm_timeout: Duration,
}

impl SupabasePresenceStore {
    pub fn new(realtime: RealtimeClient, config: &RealtimeConfig, table: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_url: config.rest_url(),
            api_key: config.api_key.clone(),
            bearer: config.bearer_token().to_string(),
            table: table.to_string(),
            realtime,
            confirm_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, self.table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let text = text.chars().take(200).collect::<String>();
    Err(VoiceError::Presence(format!("{action}: HTTP {status}: {text}")))
}

#[async_trait]
impl PresenceStore for SupabasePresenceStore {
    async fn join(&self, participant: &Participant, signaling: &SignalSubscription) -> Result<()> {
        if signaling.room_id() != participant.room_id {
            return Err(VoiceError::Presence(format!(
                "signaling is subscribed to {}, not {}",
                signaling.room_id(),
                participant.room_id
            )));
        }
        let response = self
            .request(Method::POST)
            .query(&[("on_conflict", "room_id,user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(participant)
            .send()
            .await?;
        check_status(response, "presence upsert").await?;
        debug!(room_id = %participant.room_id, user_id = %participant.user_id, "Presence row written");
        Ok(())
    }

    async fn leave(&self, room_id: &str, user_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE)
            .query(&[
                ("room_id", format!("eq.{room_id}")),
                ("user_id", format!("eq.{user_id}")),
            ])
            .send()
            .await?;
        check_status(response, "presence delete").await?;
        debug!(room_id = %room_id, user_id = %user_id, "Presence row deleted");
        Ok(())
    }

    async fn list(&self, room_id: &str) -> Result<Vec<Participant>> {
        let response = self
            .request(Method::GET)
            .query(&[("select", "*".to_string()), ("room_id", format!("eq.{room_id}"))])
            .send()
            .await?;
        let rows = check_status(response, "presence list")
            .await?
            .json::<Vec<Participant>>()
            .await?;
        Ok(rows)
    }

    async fn watch(&self, room_id: &str) -> Result<mpsc::Receiver<PresenceChange>> {
        let topic = presence_topic(room_id);
        let filter = PostgresChangesFilter::all(&self.table, Some(format!("room_id=eq.{room_id}")));
        let mut events = self
            .realtime
            .join_channel(&topic, ChannelConfig::postgres_changes(filter))
            .await?;

        // Changes made before the feed is live would never be seen.
        if let Err(e) = wait_for_join(&mut events, &topic, self.confirm_timeout).await {
            warn!(topic = %topic, error = %e, "Presence feed not confirmed");
            let _ = self.realtime.leave_channel(&topic).await;
            return Err(e);
        }
        info!(topic = %topic, "Presence feed confirmed");

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(change_translator(topic, room_id.to_string(), events, tx));
        Ok(rx)
    }

    async fn unwatch(&self, room_id: &str) {
        let topic = presence_topic(room_id);
        if let Err(e) = self.realtime.leave_channel(&topic).await {
            debug!(topic = %topic, error = %e, "Leave after realtime shutdown");
        }
    }
}
