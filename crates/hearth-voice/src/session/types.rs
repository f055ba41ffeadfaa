use std::sync::Arc;

use crate::media::{AudioOutput, MediaDevices};
use crate::peer::GlareResolution;
use crate::presence::PresenceStore;
use crate::relay::SignalRelay;
use crate::transport::{IceServer, TransportFactory};

/// Public STUN server used when nothing else is configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ice_servers: Vec<IceServer>,
    /// Input device to open on join; the platform default when `None`.
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub glare_resolution: GlareResolution,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            input_device: None,
            output_device: None,
            glare_resolution: GlareResolution::default(),
        }
    }
}

/// The outside world a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub relay: Arc<dyn SignalRelay>,
    pub presence: Arc<dyn PresenceStore>,
    pub transports: Arc<dyn TransportFactory>,
    pub media: Arc<dyn MediaDevices>,
    pub output: Arc<dyn AudioOutput>,
}
