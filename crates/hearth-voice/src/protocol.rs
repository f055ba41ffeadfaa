//! Wire types shared by the signaling relay and the presence table.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};

/// Broadcast event name carrying [`SignalMessage`]s.
pub const VOICE_SIGNAL_EVENT: &str = "voice_signal";

/// Realtime topic used for a room's signaling broadcasts.
pub fn signal_topic(room_id: &str) -> String {
    format!("voice:{room_id}")
}

/// Realtime topic used for a room's presence-table change feed.
pub fn presence_topic(room_id: &str) -> String {
    format!("presence:{room_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }
}

/// One row of the presence table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: String,
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub deafened: bool,
}

impl Participant {
    pub fn new(room_id: &str, user_id: &str, display_name: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            muted: false,
            deafened: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob as carried inside offer and answer signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled ICE candidate, in the browser's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Envelope for every signaling message.
///
/// `connection_id` names the sender's link, so a receiver can tell a
/// restarted remote apart from a renegotiation on the same link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub sender_id: String,
    pub target_id: String,
    pub connection_id: String,
    pub payload: serde_json::Value,
}

impl SignalMessage {
    pub fn description(
        sender_id: &str,
        target_id: &str,
        connection_id: &str,
        description: &SessionDescription,
    ) -> Result<Self> {
        let kind = match description.kind {
            SdpKind::Offer => SignalKind::Offer,
            SdpKind::Answer => SignalKind::Answer,
        };
        Ok(Self {
            kind,
            sender_id: sender_id.to_string(),
            target_id: target_id.to_string(),
            connection_id: connection_id.to_string(),
            payload: serde_json::to_value(description)?,
        })
    }

    pub fn candidate(
        sender_id: &str,
        target_id: &str,
        connection_id: &str,
        candidate: &IceCandidate,
    ) -> Result<Self> {
        Ok(Self {
            kind: SignalKind::Candidate,
            sender_id: sender_id.to_string(),
            target_id: target_id.to_string(),
            connection_id: connection_id.to_string(),
            payload: serde_json::to_value(candidate)?,
        })
    }

    pub fn session_description(&self) -> Result<SessionDescription> {
        let description: SessionDescription = serde_json::from_value(self.payload.clone())
            .map_err(|e| VoiceError::MalformedSignal(format!("{} payload: {e}", self.kind)))?;
        let expected = match self.kind {
            SignalKind::Offer => SdpKind::Offer,
            SignalKind::Answer => SdpKind::Answer,
            SignalKind::Candidate => {
                return Err(VoiceError::MalformedSignal(
                    "candidate signal carries no session description".into(),
                ))
            }
        };
        if description.kind != expected {
            return Err(VoiceError::MalformedSignal(format!(
                "{} signal carries a {:?} description",
                self.kind, description.kind
            )));
        }
        Ok(description)
    }

    pub fn ice_candidate(&self) -> Result<IceCandidate> {
        if self.kind != SignalKind::Candidate {
            return Err(VoiceError::MalformedSignal(format!(
                "{} signal carries no candidate",
                self.kind
            )));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| VoiceError::MalformedSignal(format!("candidate payload: {e}")))
    }
}
