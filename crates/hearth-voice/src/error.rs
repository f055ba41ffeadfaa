use hearth_common::HearthError;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("relay error: {0}")]
    Relay(String),

    #[error("channel {0} was not confirmed in time")]
    SubscribeTimeout(String),

    #[error("presence error: {0}")]
    Presence(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("malformed signal: {0}")]
    MalformedSignal(String),

    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    #[error("session is closed")]
    Closed,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<webrtc::Error> for VoiceError {
    fn from(err: webrtc::Error) -> Self {
        VoiceError::Transport(err.to_string())
    }
}

impl From<VoiceError> for HearthError {
    fn from(err: VoiceError) -> Self {
        HearthError::Voice(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;
