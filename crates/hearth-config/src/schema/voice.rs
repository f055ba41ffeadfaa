//! Voice room configuration types.

use serde::{Deserialize, Serialize};

/// A STUN/TURN server handed to every peer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            urls: vec!["stun:stun.l.google.com:19302".into()],
            username: None,
            credential: None,
        }
    }
}

/// How colliding offers between two peers are settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlareResolution {
    /// The peer with the greater user id yields and answers the other's offer.
    #[default]
    PolitePeer,
    /// Colliding offers are logged and dropped on both sides; the pair stays
    /// stuck until a forced reconnect.
    None,
}

/// Voice room settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Microphone device id; `None` selects the system default.
    pub input_device: Option<String>,
    /// Speaker device id; `None` selects the system default.
    pub output_device: Option<String>,
    /// How long to wait for the signaling channel join to be confirmed.
    pub subscribe_timeout_secs: u64,
    pub glare_resolution: GlareResolution,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::default()],
            input_device: None,
            output_device: None,
            subscribe_timeout_secs: 10,
            glare_resolution: GlareResolution::PolitePeer,
        }
    }
}
