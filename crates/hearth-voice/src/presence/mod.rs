//! Room membership backed by a shared table.
//!
//! A participant is "in" a room while its row exists. Row changes are
//! pushed to every watcher, including the session that made them.

mod supabase;
mod translator;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::Participant;
use crate::relay::SignalSubscription;

pub use supabase::SupabasePresenceStore;
pub use translator::translate_change;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Inserted(Participant),
    Updated(Participant),
    Deleted { user_id: String },
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Insert or update the participant's row.
    ///
    /// Takes the room's confirmed signaling subscription so a row can never
    /// be written while offers addressed to it would be lost.
    async fn join(&self, participant: &Participant, signaling: &SignalSubscription) -> Result<()>;

    /// Delete the participant's row.
    async fn leave(&self, room_id: &str, user_id: &str) -> Result<()>;

    /// Current rows for the room.
    async fn list(&self, room_id: &str) -> Result<Vec<Participant>>;

    /// Stream of row changes for the room.
    async fn watch(&self, room_id: &str) -> Result<mpsc::Receiver<PresenceChange>>;

    /// Stop the change stream opened by [`PresenceStore::watch`].
    async fn unwatch(&self, room_id: &str);
}
