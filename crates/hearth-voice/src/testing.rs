//! In-memory collaborators for driving peers and sessions without a
//! network or sound card.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

use crate::error::{Result, VoiceError};
use crate::media::{opus_track, AudioDevice, AudioOutput, LocalCapture, LocalTrack, MediaDevices};
use crate::presence::{PresenceChange, PresenceStore};
use crate::protocol::{
    signal_topic, IceCandidate, Participant, SdpKind, SessionDescription, SignalMessage,
};
use crate::relay::{SignalRelay, SignalSubscription};
use crate::transport::{
    ConnectionState, IceServer, PeerEventSink, PeerTransport, RemoteAudioTrack, SignalingState,
    TransportEvent, TransportFactory,
};

pub(crate) fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

/// Ordered record of relay and presence calls across sessions.
#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct MockState {
    signaling: SignalingState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    tracks: Vec<String>,
    replaced: Vec<String>,
    offers: usize,
    answers: usize,
    closed: bool,
    connected_reported: bool,
}

/// A transport that follows the offer/answer state machine and reports
/// one host candidate per local description. With auto-connect it turns
/// `connected` once both descriptions and a remote candidate are in.
pub(crate) struct MockTransport {
    sink: PeerEventSink,
    state: Mutex<MockState>,
    supports_replace: bool,
    auto_connect: bool,
}

impl MockTransport {
    fn new(sink: PeerEventSink, supports_replace: bool, auto_connect: bool) -> Self {
        Self {
            sink,
            state: Mutex::new(MockState {
                signaling: SignalingState::Stable,
                local: None,
                remote: None,
                remote_candidates: Vec::new(),
                tracks: Vec::new(),
                replaced: Vec::new(),
                offers: 0,
                answers: 0,
                closed: false,
                connected_reported: false,
            }),
            supports_replace,
            auto_connect,
        }
    }

    pub(crate) fn sink(&self) -> PeerEventSink {
        self.sink.clone()
    }

    pub(crate) fn offers(&self) -> usize {
        self.state.lock().unwrap().offers
    }

    pub(crate) fn answers(&self) -> usize {
        self.state.lock().unwrap().answers
    }

    pub(crate) fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote.clone()
    }

    pub(crate) fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().unwrap().remote_candidates.clone()
    }

    pub(crate) fn tracks(&self) -> Vec<String> {
        self.state.lock().unwrap().tracks.clone()
    }

    pub(crate) fn replaced(&self) -> Vec<String> {
        self.state.lock().unwrap().replaced.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    async fn maybe_connect(&self) {
        let connect = {
            let mut state = self.state.lock().unwrap();
            let ready = self.auto_connect
                && !state.closed
                && !state.connected_reported
                && state.local.is_some()
                && state.remote.is_some()
                && !state.remote_candidates.is_empty();
            if ready {
                state.connected_reported = true;
            }
            ready
        };
        if connect {
            self.sink
                .send(TransportEvent::StateChanged(ConnectionState::Connecting))
                .await;
            self.sink
                .send(TransportEvent::StateChanged(ConnectionState::Connected))
                .await;
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(VoiceError::Transport("closed".into()));
        }
        state.offers += 1;
        Ok(SessionDescription::offer(format!(
            "v=0 offer-{} to {}",
            state.offers,
            self.sink.remote_id()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut state = self.state.lock().unwrap();
        if state.signaling != SignalingState::HaveRemoteOffer {
            return Err(VoiceError::Transport(format!(
                "cannot answer in {}",
                state.signaling
            )));
        }
        state.answers += 1;
        Ok(SessionDescription::answer(format!(
            "v=0 answer-{} to {}",
            state.answers,
            self.sink.remote_id()
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.signaling = match (description.kind, state.signaling) {
                (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveLocalOffer,
                (SdpKind::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
                (kind, current) => {
                    return Err(VoiceError::Transport(format!(
                        "cannot apply local {kind:?} in {current}"
                    )))
                }
            };
            state.local = Some(description);
        }
        self.sink
            .send(TransportEvent::LocalCandidate(candidate(1)))
            .await;
        self.maybe_connect().await;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.signaling = match (description.kind, state.signaling) {
                (SdpKind::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
                (SdpKind::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
                (kind, current) => {
                    return Err(VoiceError::Transport(format!(
                        "cannot apply remote {kind:?} in {current}"
                    )))
                }
            };
            state.remote = Some(description);
        }
        self.maybe_connect().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.remote.is_none() {
                return Err(VoiceError::Transport("no remote description".into()));
            }
            state.remote_candidates.push(candidate);
        }
        self.maybe_connect().await;
        Ok(())
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let renegotiate = {
            let mut state = self.state.lock().unwrap();
            state.tracks.push(track.id().to_string());
            state.remote.is_some()
        };
        if renegotiate {
            self.sink.send(TransportEvent::NegotiationNeeded).await;
        }
        Ok(())
    }

    async fn replace_track(&self, track: &LocalTrack) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if !self.supports_replace || state.tracks.is_empty() {
            return Ok(false);
        }
        state.replaced.push(track.id().to_string());
        Ok(true)
    }

    fn signaling_state(&self) -> SignalingState {
        self.state.lock().unwrap().signaling
    }

    async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            state.signaling = SignalingState::Closed;
        }
        self.sink
            .send(TransportEvent::StateChanged(ConnectionState::Closed))
            .await;
        Ok(())
    }
}

pub(crate) struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
    supports_replace: bool,
    auto_connect: bool,
}

impl MockTransportFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            supports_replace: true,
            auto_connect: true,
        })
    }

    /// Transports that never report state changes on their own.
    pub(crate) fn manual() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            supports_replace: true,
            auto_connect: false,
        })
    }

    pub(crate) fn without_replace() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            supports_replace: false,
            auto_connect: true,
        })
    }

    pub(crate) fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Every transport built for `remote_id`, oldest first.
    pub(crate) fn transports_for(&self, remote_id: &str) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.sink.remote_id() == remote_id)
            .cloned()
            .collect()
    }

    pub(crate) fn latest(&self, remote_id: &str) -> Arc<MockTransport> {
        self.transports_for(remote_id)
            .pop()
            .unwrap_or_else(|| panic!("no transport for {remote_id}"))
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServer],
        events: PeerEventSink,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = Arc::new(MockTransport::new(
            events,
            self.supports_replace,
            self.auto_connect,
        ));
        self.created.lock().unwrap().push(Arc::clone(&transport));
        let transport: Arc<dyn PeerTransport> = transport;
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// A broadcast bus shared by every [`MemoryRelay`] handle.
#[derive(Default)]
pub(crate) struct MemoryRelayHub {
    subscribers: Mutex<HashMap<String, Vec<(usize, mpsc::Sender<SignalMessage>)>>>,
    published: Mutex<Vec<SignalMessage>>,
    next_id: AtomicUsize,
}

impl MemoryRelayHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn relay(self: &Arc<Self>, log: CallLog) -> Arc<MemoryRelay> {
        Arc::new(MemoryRelay {
            hub: Arc::clone(self),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            log,
            confirms: true,
        })
    }

    /// A relay whose subscriptions are never confirmed.
    pub(crate) fn silent_relay(self: &Arc<Self>, log: CallLog) -> Arc<MemoryRelay> {
        Arc::new(MemoryRelay {
            hub: Arc::clone(self),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            log,
            confirms: false,
        })
    }

    pub(crate) fn published(&self) -> Vec<SignalMessage> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn subscriber_count(&self, room_id: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(room_id)
            .map_or(0, Vec::len)
    }
}

pub(crate) struct MemoryRelay {
    hub: Arc<MemoryRelayHub>,
    id: usize,
    log: CallLog,
    confirms: bool,
}

#[async_trait]
impl SignalRelay for MemoryRelay {
    async fn subscribe(&self, room_id: &str) -> Result<SignalSubscription> {
        if !self.confirms {
            self.log.record(format!("subscribe-timeout:{room_id}"));
            return Err(VoiceError::SubscribeTimeout(signal_topic(room_id)));
        }
        let (tx, rx) = mpsc::channel(256);
        self.hub
            .subscribers
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .push((self.id, tx));
        self.log.record(format!("subscribe:{room_id}"));
        Ok(SignalSubscription::confirmed(room_id, rx))
    }

    async fn publish(&self, room_id: &str, message: &SignalMessage) -> Result<()> {
        self.hub.published.lock().unwrap().push(message.clone());
        let targets: Vec<mpsc::Sender<SignalMessage>> = self
            .hub
            .subscribers
            .lock()
            .unwrap()
            .get(room_id)
            .map(|subs| {
                subs.iter()
                    .filter(|(id, _)| *id != self.id)
                    .map(|(_, tx)| tx.clone())
                    .collect()
            })
            .unwrap_or_default();
        for tx in targets {
            let _ = tx.send(message.clone()).await;
        }
        Ok(())
    }

    async fn unsubscribe(&self, room_id: &str) {
        if let Some(subs) = self.hub.subscribers.lock().unwrap().get_mut(room_id) {
            subs.retain(|(id, _)| *id != self.id);
        }
        self.log.record(format!("unsubscribe:{room_id}"));
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// The shared presence table behind every [`MemoryPresence`] handle.
#[derive(Default)]
pub(crate) struct PresenceTable {
    rows: Mutex<Vec<Participant>>,
    watchers: Mutex<Vec<(usize, String, mpsc::Sender<PresenceChange>)>>,
    next_id: AtomicUsize,
}

impl PresenceTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn handle(self: &Arc<Self>, log: CallLog) -> Arc<MemoryPresence> {
        Arc::new(MemoryPresence {
            table: Arc::clone(self),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            log,
        })
    }

    pub(crate) fn rows(&self) -> Vec<Participant> {
        self.rows.lock().unwrap().clone()
    }

    async fn notify(&self, room_id: &str, change: PresenceChange) {
        let targets: Vec<mpsc::Sender<PresenceChange>> = self
            .watchers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, room, _)| room == room_id)
            .map(|(_, _, tx)| tx.clone())
            .collect();
        for tx in targets {
            let _ = tx.send(change.clone()).await;
        }
    }
}

pub(crate) struct MemoryPresence {
    table: Arc<PresenceTable>,
    id: usize,
    log: CallLog,
}

#[async_trait]
impl PresenceStore for MemoryPresence {
    async fn join(&self, participant: &Participant, signaling: &SignalSubscription) -> Result<()> {
        if signaling.room_id() != participant.room_id {
            return Err(VoiceError::Presence("signaling is for another room".into()));
        }
        self.log.record(format!("join:{}", participant.user_id));
        let change = {
            let mut rows = self.table.rows.lock().unwrap();
            let existing = rows.iter_mut().find(|row| {
                row.room_id == participant.room_id && row.user_id == participant.user_id
            });
            match existing {
                Some(row) => {
                    *row = participant.clone();
                    PresenceChange::Updated(participant.clone())
                }
                None => {
                    rows.push(participant.clone());
                    PresenceChange::Inserted(participant.clone())
                }
            }
        };
        self.table.notify(&participant.room_id, change).await;
        Ok(())
    }

    async fn leave(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.log.record(format!("leave:{user_id}"));
        let removed = {
            let mut rows = self.table.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| !(row.room_id == room_id && row.user_id == user_id));
            rows.len() != before
        };
        if removed {
            self.table
                .notify(
                    room_id,
                    PresenceChange::Deleted {
                        user_id: user_id.to_string(),
                    },
                )
                .await;
        }
        Ok(())
    }

    async fn list(&self, room_id: &str) -> Result<Vec<Participant>> {
        Ok(self
            .table
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn watch(&self, room_id: &str) -> Result<mpsc::Receiver<PresenceChange>> {
        let (tx, rx) = mpsc::channel(256);
        self.table
            .watchers
            .lock()
            .unwrap()
            .push((self.id, room_id.to_string(), tx));
        self.log.record(format!("watch:{room_id}"));
        Ok(rx)
    }

    async fn unwatch(&self, room_id: &str) {
        self.table
            .watchers
            .lock()
            .unwrap()
            .retain(|(id, room, _)| !(*id == self.id && room == room_id));
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub(crate) struct FakeMedia {
    inputs: Vec<String>,
}

impl FakeMedia {
    pub(crate) fn with_inputs(inputs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub(crate) fn none() -> Arc<Self> {
        Self::with_inputs(&[])
    }
}

#[async_trait]
impl MediaDevices for FakeMedia {
    fn input_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, id)| AudioDevice {
                id: id.clone(),
                name: id.clone(),
                is_default: i == 0,
            })
            .collect())
    }

    fn output_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(Vec::new())
    }

    async fn acquire_microphone(&self, device_id: Option<&str>) -> Result<LocalCapture> {
        let id = match device_id {
            Some(id) => id.to_string(),
            None => self
                .inputs
                .first()
                .cloned()
                .ok_or_else(|| VoiceError::Media("permission denied".into()))?,
        };
        if !self.inputs.contains(&id) {
            return Err(VoiceError::Media(format!("no such device: {id}")));
        }
        Ok(LocalCapture::new(opus_track(&format!("mic-{id}")), &id))
    }
}

#[derive(Default)]
pub(crate) struct RecordingOutput {
    attached: Mutex<HashMap<String, bool>>,
    removed: Mutex<Vec<String>>,
    device: Mutex<Option<String>>,
}

impl RecordingOutput {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn is_attached(&self, remote_id: &str) -> bool {
        self.attached.lock().unwrap().contains_key(remote_id)
    }

    pub(crate) fn is_muted(&self, remote_id: &str) -> Option<bool> {
        self.attached.lock().unwrap().get(remote_id).copied()
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub(crate) fn device(&self) -> Option<String> {
        self.device.lock().unwrap().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn attach(&self, remote_id: &str, _track: Arc<dyn RemoteAudioTrack>) {
        self.attached
            .lock()
            .unwrap()
            .insert(remote_id.to_string(), false);
    }

    fn set_muted(&self, remote_id: &str, muted: bool) {
        if let Some(state) = self.attached.lock().unwrap().get_mut(remote_id) {
            *state = muted;
        }
    }

    fn remove(&self, remote_id: &str) {
        self.attached.lock().unwrap().remove(remote_id);
        self.removed.lock().unwrap().push(remote_id.to_string());
    }

    fn set_output_device(&self, device_id: &str) -> Result<()> {
        *self.device.lock().unwrap() = Some(device_id.to_string());
        Ok(())
    }
}

/// A remote track that yields a fixed number of packets, then ends.
pub(crate) struct FakeRemoteTrack {
    id: String,
    remaining: AtomicUsize,
}

impl FakeRemoteTrack {
    pub(crate) fn with_packets(id: &str, packets: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            remaining: AtomicUsize::new(packets),
        })
    }
}

#[async_trait]
impl RemoteAudioTrack for FakeRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn read_packet(&self) -> Option<Vec<u8>> {
        self.remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .ok()
            .map(|_| vec![0xf8, 0xff, 0xfe])
    }
}
