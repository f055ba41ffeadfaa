//! Local capture and remote playback.
//!
//! Device access is platform territory and sits behind [`MediaDevices`]
//! and [`AudioOutput`]. The voice core only needs an outgoing track it can
//! enable, disable and swap, and somewhere to hand incoming tracks.

mod headless;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::Result;
use crate::transport::RemoteAudioTrack;

pub use headless::{HeadlessMedia, HeadlessOutput, SILENCE_DEVICE_ID};

/// Outgoing audio as handed to peer transports.
pub type LocalTrack = Arc<TrackLocalStaticSample>;

/// Stream id shared by every track this client sends.
const STREAM_ID: &str = "hearth-voice";

/// An Opus track ready to be fed 20 ms samples.
pub fn opus_track(track_id: &str) -> LocalTrack {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
        track_id.to_owned(),
        STREAM_ID.to_owned(),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// An acquired input device and the track its samples are written to.
///
/// Disabling the capture keeps the track attached to every link but stops
/// samples from being sent.
pub struct LocalCapture {
    track: LocalTrack,
    device_id: String,
    enabled: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl LocalCapture {
    pub fn new(track: LocalTrack, device_id: &str) -> Self {
        Self {
            track,
            device_id: device_id.to_string(),
            enabled: Arc::new(AtomicBool::new(true)),
            pump: None,
        }
    }

    /// Attach the task that feeds the track; aborted on [`LocalCapture::stop`].
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    pub fn track(&self) -> &LocalTrack {
        &self.track
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flag shared with the pump so it can skip writes while disabled.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    pub fn stop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for LocalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LocalCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCapture")
            .field("device_id", &self.device_id)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    fn input_devices(&self) -> Result<Vec<AudioDevice>>;
    fn output_devices(&self) -> Result<Vec<AudioDevice>>;

    /// Open an input device, or the default one when `device_id` is `None`.
    async fn acquire_microphone(&self, device_id: Option<&str>) -> Result<LocalCapture>;
}

/// Playback sinks, one per remote participant.
pub trait AudioOutput: Send + Sync {
    fn attach(&self, remote_id: &str, track: Arc<dyn RemoteAudioTrack>);
    fn set_muted(&self, remote_id: &str, muted: bool);
    fn remove(&self, remote_id: &str);
    fn set_output_device(&self, device_id: &str) -> Result<()>;
}
