use std::sync::Arc;

use crate::transport::{ConnectionState, PeerTransport};

/// One peer connection to one remote participant.
pub struct PeerLink {
    pub(crate) remote_id: String,
    /// Our id for this link, sent with every signal so the remote can tell
    /// a restarted link apart from a renegotiation.
    pub(crate) connection_id: String,
    /// The remote's link id, learned from its first description.
    pub(crate) remote_connection_id: Option<String>,
    pub(crate) generation: u64,
    pub(crate) transport: Arc<dyn PeerTransport>,
    pub(crate) is_initiator: bool,
    pub(crate) remote_description_set: bool,
    pub(crate) state: ConnectionState,
}

impl PeerLink {
    pub(crate) fn new(
        remote_id: &str,
        generation: u64,
        transport: Arc<dyn PeerTransport>,
        is_initiator: bool,
    ) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            connection_id: hearth_common::new_connection_id(),
            remote_connection_id: None,
            generation,
            transport,
            is_initiator,
            remote_description_set: false,
            state: ConnectionState::New,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn remote_connection_id(&self) -> Option<&str> {
        self.remote_connection_id.as_deref()
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("remote_id", &self.remote_id)
            .field("connection_id", &self.connection_id)
            .field("remote_connection_id", &self.remote_connection_id)
            .field("generation", &self.generation)
            .field("is_initiator", &self.is_initiator)
            .field("remote_description_set", &self.remote_description_set)
            .field("state", &self.state)
            .finish()
    }
}
