//! Device-less media for servers, bots and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::media::Sample;

use super::{opus_track, AudioDevice, AudioOutput, LocalCapture, MediaDevices};
use crate::error::{Result, VoiceError};
use crate::transport::RemoteAudioTrack;

pub const SILENCE_DEVICE_ID: &str = "silence";

/// A single Opus frame that decodes to 20 ms of silence.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const FRAME: Duration = Duration::from_millis(20);

/// Offers one synthetic input that sends Opus silence, which keeps links
/// exercising the media path without a sound card.
#[derive(Debug, Default)]
pub struct HeadlessMedia {
    capture_enabled: bool,
}

impl HeadlessMedia {
    /// No inputs at all: sessions join receive-only.
    pub fn receive_only() -> Self {
        Self {
            capture_enabled: false,
        }
    }

    pub fn with_silence() -> Self {
        Self {
            capture_enabled: true,
        }
    }
}

#[async_trait]
impl MediaDevices for HeadlessMedia {
    fn input_devices(&self) -> Result<Vec<AudioDevice>> {
        if !self.capture_enabled {
            return Ok(Vec::new());
        }
        Ok(vec![AudioDevice {
            id: SILENCE_DEVICE_ID.to_string(),
            name: "Silence".to_string(),
            is_default: true,
        }])
    }

    fn output_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(vec![AudioDevice {
            id: "null".to_string(),
            name: "Discard".to_string(),
            is_default: true,
        }])
    }

    async fn acquire_microphone(&self, device_id: Option<&str>) -> Result<LocalCapture> {
        if !self.capture_enabled {
            return Err(VoiceError::Media("no input devices available".into()));
        }
        let device_id = device_id.unwrap_or(SILENCE_DEVICE_ID);
        if device_id != SILENCE_DEVICE_ID {
            return Err(VoiceError::Media(format!("unknown input device: {device_id}")));
        }

        let track = opus_track(&format!("mic-{}", hearth_common::new_correlation_id()));
        let capture = LocalCapture::new(Arc::clone(&track), device_id);
        let enabled = capture.enabled_flag();
        let pump = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME);
            loop {
                interval.tick().await;
                if !enabled.load(Ordering::Relaxed) {
                    continue;
                }
                let sample = Sample {
                    data: OPUS_SILENCE.to_vec().into(),
                    duration: FRAME,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    debug!(error = %e, "Silence pump stopped");
                    break;
                }
            }
        });
        info!(device = %device_id, "Capture started");
        Ok(capture.with_pump(pump))
    }
}

struct Sink {
    muted: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// Drains remote tracks and counts what would have been played.
#[derive(Default)]
pub struct HeadlessOutput {
    sinks: Mutex<HashMap<String, Sink>>,
    /// Outlives the sinks so counts survive teardown and re-attach.
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
    device: Mutex<Option<String>>,
}

impl HeadlessOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets played per remote participant since this output was created,
    /// including participants whose sink has been removed. Muted packets are
    /// not counted.
    pub fn packet_counts(&self) -> HashMap<String, u64> {
        match self.counters.lock() {
            Ok(counters) => counters
                .iter()
                .map(|(id, packets)| (id.clone(), packets.load(Ordering::Relaxed)))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }

    fn counter(&self, remote_id: &str) -> Arc<AtomicU64> {
        match self.counters.lock() {
            Ok(mut counters) => Arc::clone(counters.entry(remote_id.to_string()).or_default()),
            Err(_) => Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn output_device(&self) -> Option<String> {
        self.device.lock().ok().and_then(|d| d.clone())
    }
}

impl AudioOutput for HeadlessOutput {
    fn attach(&self, remote_id: &str, track: Arc<dyn RemoteAudioTrack>) {
        let muted = Arc::new(AtomicBool::new(false));
        let packets = self.counter(remote_id);
        let reader = {
            let muted = Arc::clone(&muted);
            let packets = Arc::clone(&packets);
            let remote_id = remote_id.to_string();
            tokio::spawn(async move {
                while track.read_packet().await.is_some() {
                    if !muted.load(Ordering::Relaxed) {
                        packets.fetch_add(1, Ordering::Relaxed);
                    }
                }
                debug!(remote_id = %remote_id, "Remote track ended");
            })
        };
        let Ok(mut sinks) = self.sinks.lock() else {
            warn!("Output sink table poisoned");
            reader.abort();
            return;
        };
        if let Some(previous) = sinks.insert(
            remote_id.to_string(),
            Sink { muted, reader },
        ) {
            previous.reader.abort();
        }
    }

    fn set_muted(&self, remote_id: &str, muted: bool) {
        if let Ok(sinks) = self.sinks.lock() {
            if let Some(sink) = sinks.get(remote_id) {
                sink.muted.store(muted, Ordering::Relaxed);
            }
        }
    }

    fn remove(&self, remote_id: &str) {
        if let Ok(mut sinks) = self.sinks.lock() {
            if let Some(sink) = sinks.remove(remote_id) {
                sink.reader.abort();
            }
        }
    }

    fn set_output_device(&self, device_id: &str) -> Result<()> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| VoiceError::Media("output state poisoned".into()))?;
        *device = Some(device_id.to_string());
        info!(device = %device_id, "Output device selected");
        Ok(())
    }
}
