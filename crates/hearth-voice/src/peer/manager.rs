//! Peer connection manager: one link per remote participant.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::link::PeerLink;
use super::GlareResolution;
use crate::error::{Result, VoiceError};
use crate::event::VoiceEvent;
use crate::ice_queue::IceCandidateQueue;
use crate::media::{AudioOutput, LocalTrack};
use crate::protocol::{SignalKind, SignalMessage};
use crate::relay::SignalRelay;
use crate::transport::{
    ConnectionState, IceServer, PeerEvent, PeerEventSink, SignalingState, TransportEvent,
    TransportFactory,
};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub local_id: String,
    pub room_id: String,
    pub ice_servers: Vec<IceServer>,
    pub glare_resolution: GlareResolution,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns every peer link of a session and drives its negotiation.
///
/// Transport errors are logged and leave the link in place; only a
/// `failed` connection state abandons a link.
pub struct PeerConnectionManager {
    config: ManagerConfig,
    factory: Arc<dyn TransportFactory>,
    relay: Arc<dyn SignalRelay>,
    output: Arc<dyn AudioOutput>,
    links: HashMap<String, PeerLink>,
    /// Last reported state per remote. Outlives the link when it failed.
    states: HashMap<String, ConnectionState>,
    candidates: IceCandidateQueue,
    /// Remotes with an attached playback sink.
    sinks: HashSet<String>,
    local_track: Option<LocalTrack>,
    remote_audio_muted: bool,
    next_generation: u64,
    peer_tx: mpsc::Sender<PeerEvent>,
    event_tx: mpsc::Sender<VoiceEvent>,
}

impl PeerConnectionManager {
    /// Returns the manager and the receiver its transports report to. The
    /// owner feeds those events back through [`Self::handle_peer_event`].
    pub fn new(
        config: ManagerConfig,
        factory: Arc<dyn TransportFactory>,
        relay: Arc<dyn SignalRelay>,
        output: Arc<dyn AudioOutput>,
        event_tx: mpsc::Sender<VoiceEvent>,
    ) -> (Self, mpsc::Receiver<PeerEvent>) {
        let (peer_tx, peer_rx) = mpsc::channel(256);
        let mgr = Self {
            config,
            factory,
            relay,
            output,
            links: HashMap::new(),
            states: HashMap::new(),
            candidates: IceCandidateQueue::new(),
            sinks: HashSet::new(),
            local_track: None,
            remote_audio_muted: false,
            next_generation: 0,
            peer_tx,
            event_tx,
        };
        (mgr, peer_rx)
    }

    pub fn local_id(&self) -> &str {
        &self.config.local_id
    }

    // -- Links -------------------------------------------------------------

    /// Create the link to `remote_id`, or return the existing one.
    /// An initiator link sends its offer right away.
    pub async fn create(&mut self, remote_id: &str, is_initiator: bool) -> Result<&PeerLink> {
        if remote_id == self.config.local_id {
            return Err(VoiceError::InvalidPeer(format!(
                "{remote_id} is the local participant"
            )));
        }
        if self.links.contains_key(remote_id) {
            debug!(remote_id, "Link already exists");
            return self.link_or_err(remote_id);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let sink = PeerEventSink::new(remote_id, generation, self.peer_tx.clone());
        let transport = self.factory.create(&self.config.ice_servers, sink).await?;
        if let Some(track) = &self.local_track {
            if let Err(e) = transport.add_track(track).await {
                warn!(remote_id, error = %e, "Failed to attach local audio");
            }
        }

        let link = PeerLink::new(remote_id, generation, transport, is_initiator);
        info!(remote_id, is_initiator, connection_id = %link.connection_id, "Peer link created");
        self.links.insert(remote_id.to_string(), link);
        self.set_state(remote_id, ConnectionState::New).await;

        if is_initiator {
            self.send_offer(remote_id).await;
        }
        self.link_or_err(remote_id)
    }

    fn link_or_err(&self, remote_id: &str) -> Result<&PeerLink> {
        self.links
            .get(remote_id)
            .ok_or_else(|| VoiceError::InvalidPeer(format!("no link to {remote_id}")))
    }

    /// Close the link to `remote_id` and forget everything about it.
    /// Returns whether anything was known about the remote.
    pub async fn close(&mut self, remote_id: &str) -> bool {
        let known = self.links.contains_key(remote_id) || self.states.contains_key(remote_id);
        self.teardown(remote_id, false).await;
        if self.states.remove(remote_id).is_some() {
            self.emit(VoiceEvent::PeerStateChanged {
                user_id: remote_id.to_string(),
                state: ConnectionState::Closed,
            })
            .await;
        }
        known
    }

    pub async fn close_all(&mut self) {
        let mut remotes: Vec<String> = self
            .links
            .keys()
            .chain(self.states.keys())
            .cloned()
            .collect();
        remotes.sort();
        remotes.dedup();
        for remote_id in remotes {
            self.close(&remote_id).await;
        }
        self.candidates.clear();
    }

    /// Drop the link's transport and sink. The state label is left alone.
    async fn teardown(&mut self, remote_id: &str, keep_candidates: bool) {
        if let Some(link) = self.links.remove(remote_id) {
            if let Err(e) = link.transport.close().await {
                debug!(remote_id, error = %e, "Transport close failed");
            }
            info!(remote_id, connection_id = %link.connection_id, "Peer link closed");
        }
        if !keep_candidates {
            let dropped = self.candidates.discard(remote_id);
            if dropped > 0 {
                debug!(remote_id, dropped, "Discarded queued ICE candidates");
            }
        }
        if self.sinks.remove(remote_id) {
            self.output.remove(remote_id);
            self.emit(VoiceEvent::RemoteAudioRemoved {
                user_id: remote_id.to_string(),
            })
            .await;
        }
    }

    // -- Signaling ---------------------------------------------------------

    /// Apply a signal from the room. Messages addressed to someone else
    /// are discarded.
    pub async fn handle_signal(&mut self, message: SignalMessage) {
        if message.target_id != self.config.local_id {
            return;
        }
        if message.sender_id == self.config.local_id {
            debug!("Ignoring signal from ourselves");
            return;
        }
        match message.kind {
            SignalKind::Offer => self.handle_offer(message).await,
            SignalKind::Answer => self.handle_answer(message).await,
            SignalKind::Candidate => self.handle_candidate(message).await,
        }
    }

    async fn handle_offer(&mut self, message: SignalMessage) {
        let sender = message.sender_id.as_str();
        let offer = match message.session_description() {
            Ok(offer) => offer,
            Err(e) => {
                warn!(remote_id = sender, error = %e, "Dropping offer");
                return;
            }
        };

        let (restarted, colliding) = match self.links.get(sender) {
            Some(link) => (
                link.remote_connection_id
                    .as_deref()
                    .is_some_and(|id| id != message.connection_id),
                link.transport.signaling_state() == SignalingState::HaveLocalOffer,
            ),
            None => (false, false),
        };
        if restarted {
            info!(remote_id = sender, "Remote restarted its link, replacing ours");
            self.teardown(sender, true).await;
        } else if colliding {
            if !self.yields_to(sender) {
                info!(remote_id = sender, "Ignoring colliding offer");
                return;
            }
            info!(remote_id = sender, "Colliding offers, yielding to the remote one");
            self.teardown(sender, true).await;
        }

        if !self.links.contains_key(sender) {
            if let Err(e) = self.create(sender, false).await {
                warn!(remote_id = sender, error = %e, "Failed to create link for offer");
                return;
            }
        }
        let Some(link) = self.links.get_mut(sender) else {
            return;
        };
        link.remote_connection_id = Some(message.connection_id.clone());
        let transport = Arc::clone(&link.transport);
        let connection_id = link.connection_id.clone();

        if let Err(e) = transport.set_remote_description(offer).await {
            warn!(remote_id = sender, error = %e, "Failed to apply offer");
            return;
        }
        if let Some(link) = self.links.get_mut(sender) {
            link.remote_description_set = true;
        }
        self.flush_candidates(sender).await;

        let answer = match transport.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(remote_id = sender, error = %e, "Failed to create answer");
                return;
            }
        };
        if let Err(e) = transport.set_local_description(answer.clone()).await {
            warn!(remote_id = sender, error = %e, "Failed to apply local answer");
            return;
        }
        debug!(remote_id = sender, "Sending answer");
        self.publish(SignalMessage::description(
            &self.config.local_id,
            sender,
            &connection_id,
            &answer,
        ))
        .await;
    }

    async fn handle_answer(&mut self, message: SignalMessage) {
        let sender = message.sender_id.as_str();
        let Some(link) = self.links.get(sender) else {
            debug!(remote_id = sender, "Answer from a participant without a link");
            return;
        };
        let state = link.transport.signaling_state();
        if state != SignalingState::HaveLocalOffer {
            debug!(remote_id = sender, %state, "Ignoring answer without an outstanding offer");
            return;
        }
        let answer = match message.session_description() {
            Ok(answer) => answer,
            Err(e) => {
                warn!(remote_id = sender, error = %e, "Dropping answer");
                return;
            }
        };
        let transport = Arc::clone(&link.transport);
        if let Err(e) = transport.set_remote_description(answer).await {
            warn!(remote_id = sender, error = %e, "Failed to apply answer");
            return;
        }
        if let Some(link) = self.links.get_mut(sender) {
            link.remote_description_set = true;
            link.remote_connection_id = Some(message.connection_id.clone());
        }
        self.flush_candidates(sender).await;
    }

    async fn handle_candidate(&mut self, message: SignalMessage) {
        let sender = message.sender_id.as_str();
        let candidate = match message.ice_candidate() {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(remote_id = sender, error = %e, "Dropping candidate");
                return;
            }
        };
        let ready = self
            .links
            .get(sender)
            .filter(|link| {
                link.remote_description_set
                    && link.remote_connection_id.as_deref() == Some(message.connection_id.as_str())
            })
            .map(|link| Arc::clone(&link.transport));

        match ready {
            Some(transport) => {
                if let Err(e) = transport.add_ice_candidate(candidate).await {
                    warn!(remote_id = sender, error = %e, "Failed to add ICE candidate");
                }
            }
            None => {
                self.candidates
                    .push(sender, &message.connection_id, candidate);
                debug!(remote_id = sender, queued = self.candidates.len(sender), "Queued ICE candidate");
            }
        }
    }

    /// Apply everything queued for `remote_id` that belongs to the remote
    /// connection the link now talks to.
    async fn flush_candidates(&mut self, remote_id: &str) {
        let Some(link) = self.links.get(remote_id) else {
            return;
        };
        let transport = Arc::clone(&link.transport);
        let expected = link.remote_connection_id.clone();
        let queued = self.candidates.drain(remote_id);
        if queued.is_empty() {
            return;
        }
        debug!(remote_id, count = queued.len(), "Applying queued ICE candidates");
        for entry in queued {
            if expected.as_deref() != Some(entry.connection_id.as_str()) {
                debug!(remote_id, "Dropping candidate for a superseded connection");
                continue;
            }
            if let Err(e) = transport.add_ice_candidate(entry.candidate).await {
                warn!(remote_id, error = %e, "Failed to add queued ICE candidate");
            }
        }
    }

    fn yields_to(&self, remote_id: &str) -> bool {
        self.config.glare_resolution == GlareResolution::PolitePeer
            && self.config.local_id.as_str() > remote_id
    }

    async fn send_offer(&self, remote_id: &str) {
        let Some(link) = self.links.get(remote_id) else {
            return;
        };
        let transport = Arc::clone(&link.transport);
        let offer = match transport.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(remote_id, error = %e, "Failed to create offer");
                return;
            }
        };
        if let Err(e) = transport.set_local_description(offer.clone()).await {
            warn!(remote_id, error = %e, "Failed to apply local offer");
            return;
        }
        debug!(remote_id, "Sending offer");
        self.publish(SignalMessage::description(
            &self.config.local_id,
            remote_id,
            &link.connection_id,
            &offer,
        ))
        .await;
    }

    async fn renegotiate(&self, remote_id: &str) {
        let Some(link) = self.links.get(remote_id) else {
            return;
        };
        if !link.is_initiator && !link.remote_description_set {
            debug!(remote_id, "Negotiation needed before the remote offer arrived, waiting");
            return;
        }
        let state = link.transport.signaling_state();
        if state != SignalingState::Stable {
            debug!(remote_id, %state, "Negotiation needed while another is in flight, skipping");
            return;
        }
        info!(remote_id, "Renegotiating");
        self.send_offer(remote_id).await;
    }

    async fn publish(&self, message: Result<SignalMessage>) {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode signal");
                return;
            }
        };
        if let Err(e) = self.relay.publish(&self.config.room_id, &message).await {
            warn!(
                target_id = %message.target_id,
                kind = %message.kind,
                error = %e,
                "Failed to publish signal"
            );
        }
    }

    // -- Transport events --------------------------------------------------

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent {
            remote_id,
            generation,
            event,
        } = event;
        let current = self.links.get(&remote_id).map(|link| link.generation);
        if current != Some(generation) {
            debug!(remote_id = %remote_id, generation, ?event, "Dropping event from a replaced link");
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let Some(link) = self.links.get(&remote_id) else {
                    return;
                };
                let message = SignalMessage::candidate(
                    &self.config.local_id,
                    &remote_id,
                    &link.connection_id,
                    &candidate,
                );
                self.publish(message).await;
            }
            TransportEvent::NegotiationNeeded => self.renegotiate(&remote_id).await,
            TransportEvent::RemoteTrack(track) => {
                info!(remote_id = %remote_id, track = %track.id(), "Attaching remote audio");
                self.output.attach(&remote_id, track);
                if self.remote_audio_muted {
                    self.output.set_muted(&remote_id, true);
                }
                self.sinks.insert(remote_id.clone());
                self.emit(VoiceEvent::RemoteAudioAttached { user_id: remote_id })
                    .await;
            }
            TransportEvent::StateChanged(state) => {
                if let Some(link) = self.links.get_mut(&remote_id) {
                    link.state = state;
                }
                self.set_state(&remote_id, state).await;
                if state == ConnectionState::Failed {
                    warn!(remote_id = %remote_id, "Peer link failed, abandoning it");
                    self.teardown(&remote_id, false).await;
                }
            }
        }
    }

    // -- Media -------------------------------------------------------------

    /// Send `track` on every current and future link. Links already
    /// sending swap it in place; others get it added, which renegotiates.
    /// Returns how many links were updated.
    pub async fn replace_local_track(&mut self, track: LocalTrack) -> usize {
        let mut updated = 0;
        for (remote_id, link) in &self.links {
            let result = match link.transport.replace_track(&track).await {
                Ok(true) => Ok(()),
                Ok(false) => link.transport.add_track(&track).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => updated += 1,
                Err(e) => warn!(remote_id = %remote_id, error = %e, "Failed to switch local audio"),
            }
        }
        self.local_track = Some(track);
        updated
    }

    /// Stop attaching a local track to new links.
    pub fn clear_local_track(&mut self) {
        self.local_track = None;
    }

    pub fn set_remote_audio_muted(&mut self, muted: bool) {
        self.remote_audio_muted = muted;
        for remote_id in &self.sinks {
            self.output.set_muted(remote_id, muted);
        }
    }

    pub fn remote_audio_muted(&self) -> bool {
        self.remote_audio_muted
    }

    // -- Queries -----------------------------------------------------------

    pub fn link(&self, remote_id: &str) -> Option<&PeerLink> {
        self.links.get(remote_id)
    }

    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.links.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connection_state(&self, remote_id: &str) -> Option<ConnectionState> {
        self.states.get(remote_id).copied()
    }

    pub fn connection_states(&self) -> HashMap<String, ConnectionState> {
        self.states.clone()
    }

    pub fn queued_candidates(&self, remote_id: &str) -> usize {
        self.candidates.len(remote_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    // -- Helpers -----------------------------------------------------------

    async fn set_state(&mut self, remote_id: &str, state: ConnectionState) {
        let previous = self.states.insert(remote_id.to_string(), state);
        if previous != Some(state) {
            debug!(remote_id, %state, "Peer state changed");
            self.emit(VoiceEvent::PeerStateChanged {
                user_id: remote_id.to_string(),
                state,
            })
            .await;
        }
    }

    async fn emit(&self, event: VoiceEvent) {
        let _ = self.event_tx.send(event).await;
    }
}
