use crate::protocol::Participant;
use crate::transport::ConnectionState;

/// Events emitted by a voice session for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// Presence joined and the initial participant list loaded.
    Joined { room_id: String },
    /// The session closed.
    Left { room_id: String },
    ParticipantJoined(Participant),
    ParticipantUpdated(Participant),
    ParticipantLeft { user_id: String },
    PeerStateChanged {
        user_id: String,
        state: ConnectionState,
    },
    RemoteAudioAttached { user_id: String },
    RemoteAudioRemoved { user_id: String },
    MuteChanged { muted: bool },
    DeafenChanged { deafened: bool },
    /// No microphone could be opened; the session continues receive-only.
    CaptureUnavailable(String),
    InputDeviceChanged { device_id: String },
    Error(String),
}
