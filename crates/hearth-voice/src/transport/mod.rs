//! The peer transport seam.
//!
//! [`PeerTransport`] is one WebRTC peer connection; a [`TransportFactory`]
//! builds them. Everything a transport reports asynchronously (local ICE
//! candidates, negotiation-needed, remote tracks, state changes) arrives as
//! a [`PeerEvent`] tagged with the link generation it was created for, so
//! late events from a replaced link can be recognised and dropped.

mod rtc;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::LocalTrack;
use crate::protocol::{IceCandidate, SessionDescription};

pub use rtc::{WebRtcTransport, WebRtcTransportFactory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl std::fmt::Display for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Incoming audio from a remote participant.
#[async_trait]
pub trait RemoteAudioTrack: Send + Sync {
    fn id(&self) -> String;

    /// Next encoded payload, or `None` once the track has ended.
    async fn read_packet(&self) -> Option<Vec<u8>>;
}

pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    NegotiationNeeded,
    RemoteTrack(Arc<dyn RemoteAudioTrack>),
    StateChanged(ConnectionState),
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            TransportEvent::NegotiationNeeded => f.write_str("NegotiationNeeded"),
            TransportEvent::RemoteTrack(t) => f.debug_tuple("RemoteTrack").field(&t.id()).finish(),
            TransportEvent::StateChanged(s) => f.debug_tuple("StateChanged").field(s).finish(),
        }
    }
}

#[derive(Debug)]
pub struct PeerEvent {
    pub remote_id: String,
    pub generation: u64,
    pub event: TransportEvent,
}

/// Where a transport reports its events. Cloned into every callback.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    remote_id: String,
    generation: u64,
    tx: mpsc::Sender<PeerEvent>,
}

impl PeerEventSink {
    pub fn new(remote_id: &str, generation: u64, tx: mpsc::Sender<PeerEvent>) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            generation,
            tx,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event; dropped silently once the session is gone.
    pub async fn send(&self, event: TransportEvent) {
        let _ = self
            .tx
            .send(PeerEvent {
                remote_id: self.remote_id.clone(),
                generation: self.generation,
                event,
            })
            .await;
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Start sending `track`.
    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    /// Swap the outgoing audio track in place, without renegotiation.
    /// Returns `false` when nothing is being sent yet.
    async fn replace_track(&self, track: &LocalTrack) -> Result<bool>;

    fn signaling_state(&self) -> SignalingState;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerTransport>>;
}
