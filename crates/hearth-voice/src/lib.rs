//! Peer-to-peer voice rooms.
//!
//! A [`VoiceRoomSession`] joins a room's signaling channel and presence
//! table, then keeps one WebRTC peer link per remote participant:
//! offer/answer exchange, ICE candidate buffering, renegotiation and
//! connection-state tracking. Storage, signaling transport and media
//! devices are reached through the traits in [`relay`], [`presence`],
//! [`transport`] and [`media`]; Supabase and `webrtc` implementations are
//! provided.

pub mod error;
pub mod event;
pub mod ice_queue;
pub mod identity;
pub mod media;
pub mod peer;
pub mod presence;
pub mod protocol;
pub mod realtime;
pub mod relay;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, VoiceError};
pub use event::VoiceEvent;
pub use ice_queue::IceCandidateQueue;
pub use identity::Identity;
pub use media::{AudioDevice, AudioOutput, LocalCapture, MediaDevices};
pub use peer::{GlareResolution, PeerConnectionManager, PeerLink};
pub use presence::{PresenceChange, PresenceStore, SupabasePresenceStore};
pub use protocol::{IceCandidate, Participant, Room, SessionDescription, SignalKind, SignalMessage};
pub use realtime::{RealtimeClient, RealtimeConfig};
pub use relay::{RealtimeSignalRelay, SignalRelay, SignalSubscription};
pub use session::{Collaborators, SessionConfig, VoiceRoomSession};
pub use transport::{
    ConnectionState, IceServer, PeerTransport, SignalingState, TransportFactory,
    WebRtcTransportFactory,
};
