//! Voice room session: join, event loop, local controls, leave.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{Collaborators, SessionConfig};
use crate::error::{Result, VoiceError};
use crate::event::VoiceEvent;
use crate::identity::Identity;
use crate::media::{AudioOutput, LocalCapture, MediaDevices};
use crate::peer::{ManagerConfig, PeerConnectionManager};
use crate::presence::{PresenceChange, PresenceStore};
use crate::protocol::{Participant, Room, SignalMessage};
use crate::relay::{SignalRelay, SignalSubscription};
use crate::transport::{ConnectionState, PeerEvent};

/// One input of the session loop.
enum Input {
    Signal(SignalMessage),
    SignalsEnded,
    Presence(PresenceChange),
    PresenceEnded,
    Peer(PeerEvent),
}

/// The local participant's membership in a voice room.
///
/// Created by [`VoiceRoomSession::open`] and driven by [`step`](Self::step)
/// or [`run_until`](Self::run_until). Links are only ever created from the
/// loop or from [`force_reconnect`](Self::force_reconnect), and neither
/// runs once [`close`](Self::close) has started.
pub struct VoiceRoomSession {
    room: Room,
    identity: Identity,
    relay: Arc<dyn SignalRelay>,
    presence: Arc<dyn PresenceStore>,
    media: Arc<dyn MediaDevices>,
    output: Arc<dyn AudioOutput>,
    peers: PeerConnectionManager,
    peer_events: mpsc::Receiver<PeerEvent>,
    signals: Option<SignalSubscription>,
    presence_feed: Option<mpsc::Receiver<PresenceChange>>,
    capture: Option<LocalCapture>,
    /// Everyone with a presence row, the local participant included.
    participants: HashMap<String, Participant>,
    joined: bool,
    muted: bool,
    deafened: bool,
    closed: bool,
    event_tx: mpsc::Sender<VoiceEvent>,
}

impl VoiceRoomSession {
    /// Join `room` as `identity`.
    ///
    /// The signaling subscription is confirmed before anything else happens;
    /// only then is the presence feed opened and the presence row written.
    /// A missing microphone leaves the session receive-only. Participants
    /// already in the room are listed but not dialed: they see our row
    /// appear and offer to us.
    pub async fn open(
        room: Room,
        identity: Identity,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<VoiceEvent>)> {
        let Collaborators {
            relay,
            presence,
            transports,
            media,
            output,
        } = collaborators;

        let signals = relay.subscribe(&room.id).await?;
        info!(room_id = %room.id, "Signaling channel confirmed");

        let (event_tx, event_rx) = mpsc::channel(256);
        let (peers, peer_events) = PeerConnectionManager::new(
            ManagerConfig {
                local_id: identity.user_id.clone(),
                room_id: room.id.clone(),
                ice_servers: config.ice_servers.clone(),
                glare_resolution: config.glare_resolution,
            },
            transports,
            Arc::clone(&relay),
            Arc::clone(&output),
            event_tx.clone(),
        );

        let mut session = Self {
            room,
            identity,
            relay,
            presence,
            media,
            output,
            peers,
            peer_events,
            signals: Some(signals),
            presence_feed: None,
            capture: None,
            participants: HashMap::new(),
            joined: false,
            muted: false,
            deafened: false,
            closed: false,
            event_tx,
        };

        if let Err(e) = session.enter(&config).await {
            warn!(room_id = %session.room.id, error = %e, "Failed to join voice room");
            session.release().await;
            return Err(e);
        }
        Ok((session, event_rx))
    }

    async fn enter(&mut self, config: &SessionConfig) -> Result<()> {
        let room_id = self.room.id.clone();

        self.presence_feed = Some(self.presence.watch(&room_id).await?);
        let local = self.local_participant();
        let Some(signals) = &self.signals else {
            return Err(VoiceError::Closed);
        };
        self.presence.join(&local, signals).await?;
        self.joined = true;
        self.participants.insert(local.user_id.clone(), local);
        info!(room_id = %room_id, user_id = %self.identity.user_id, "Joined presence");

        match self
            .media
            .acquire_microphone(config.input_device.as_deref())
            .await
        {
            Ok(capture) => {
                info!(device = %capture.device_id(), "Microphone opened");
                self.peers
                    .replace_local_track(Arc::clone(capture.track()))
                    .await;
                self.capture = Some(capture);
            }
            Err(e) => {
                warn!(error = %e, "No microphone, continuing receive-only");
                self.emit(VoiceEvent::CaptureUnavailable(e.to_string()))
                    .await;
            }
        }

        if let Some(device_id) = &config.output_device {
            if let Err(e) = self.output.set_output_device(device_id) {
                warn!(device = %device_id, error = %e, "Failed to select output device");
            }
        }

        // Not dialed: they see our insert and offer first.
        for participant in self.presence.list(&room_id).await? {
            self.remember(participant).await;
        }
        debug!(room_id = %room_id, count = self.participants.len(), "Loaded participants");

        self.emit(VoiceEvent::Joined { room_id }).await;
        Ok(())
    }

    // -- Event loop --------------------------------------------------------

    /// Wait for the next input and process it to completion.
    ///
    /// Returns `false` once the session is closed or has nothing left to
    /// listen to.
    pub async fn step(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let input = tokio::select! {
            message = next_signal(&mut self.signals) => match message {
                Some(message) => Input::Signal(message),
                None => Input::SignalsEnded,
            },
            change = next_change(&mut self.presence_feed) => match change {
                Some(change) => Input::Presence(change),
                None => Input::PresenceEnded,
            },
            Some(event) = self.peer_events.recv() => Input::Peer(event),
            else => return false,
        };

        match input {
            Input::Signal(message) => self.peers.handle_signal(message).await,
            Input::Presence(change) => self.handle_presence(change).await,
            Input::Peer(event) => self.peers.handle_peer_event(event).await,
            Input::SignalsEnded => {
                warn!(room_id = %self.room.id, "Signaling channel closed");
                self.signals = None;
                self.emit(VoiceEvent::Error("signaling channel closed".into()))
                    .await;
            }
            Input::PresenceEnded => {
                warn!(room_id = %self.room.id, "Presence feed closed");
                self.presence_feed = None;
                self.emit(VoiceEvent::Error("presence feed closed".into()))
                    .await;
            }
        }
        true
    }

    /// Run the loop until `shutdown` resolves or the session stops.
    /// Does not close the session.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                more = self.step() => {
                    if !more {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_presence(&mut self, change: PresenceChange) {
        match change {
            PresenceChange::Inserted(participant) => {
                let user_id = participant.user_id.clone();
                let is_remote = user_id != self.identity.user_id;
                self.remember(participant).await;
                if is_remote {
                    if let Err(e) = self.peers.create(&user_id, true).await {
                        warn!(remote_id = %user_id, error = %e, "Failed to dial participant");
                    }
                }
            }
            PresenceChange::Updated(participant) => {
                self.remember(participant).await;
            }
            PresenceChange::Deleted { user_id } => {
                if user_id == self.identity.user_id {
                    warn!(room_id = %self.room.id, "Our presence row was removed");
                    return;
                }
                self.participants.remove(&user_id);
                self.peers.close(&user_id).await;
                info!(remote_id = %user_id, "Participant left");
                self.emit(VoiceEvent::ParticipantLeft { user_id }).await;
            }
        }
    }

    /// Record a participant row and tell the UI about remote ones.
    async fn remember(&mut self, participant: Participant) {
        if participant.room_id != self.room.id {
            return;
        }
        let is_remote = participant.user_id != self.identity.user_id;
        let previous = self
            .participants
            .insert(participant.user_id.clone(), participant.clone());
        if !is_remote {
            return;
        }
        match previous {
            None => {
                info!(remote_id = %participant.user_id, "Participant joined");
                self.emit(VoiceEvent::ParticipantJoined(participant)).await;
            }
            Some(previous) if previous != participant => {
                self.emit(VoiceEvent::ParticipantUpdated(participant)).await;
            }
            Some(_) => {}
        }
    }

    // -- Leaving -----------------------------------------------------------

    /// Leave the room. The relay is unsubscribed before anything else so no
    /// new link can start; then the presence row is deleted, every link
    /// closed and the capture stopped. Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.release().await;
        info!(room_id = %self.room.id, "Left voice room");
        self.emit(VoiceEvent::Left {
            room_id: self.room.id.clone(),
        })
        .await;
    }

    async fn release(&mut self) {
        self.closed = true;
        self.relay.unsubscribe(&self.room.id).await;
        self.signals = None;

        if self.joined {
            if let Err(e) = self
                .presence
                .leave(&self.room.id, &self.identity.user_id)
                .await
            {
                warn!(room_id = %self.room.id, error = %e, "Failed to delete presence row");
            }
            self.joined = false;
        }
        self.presence.unwatch(&self.room.id).await;
        self.presence_feed = None;

        self.peers.close_all().await;
        self.peers.clear_local_track();
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.participants.clear();
    }

    // -- Local controls ----------------------------------------------------

    /// Flip the microphone. The track stays attached to every link.
    /// Returns the new mute state.
    pub async fn toggle_mute(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.muted = !self.muted;
        if let Some(capture) = &self.capture {
            capture.set_enabled(!self.muted);
        }
        info!(muted = self.muted, "Mute toggled");
        self.emit(VoiceEvent::MuteChanged { muted: self.muted })
            .await;
        self.publish_local_state().await?;
        Ok(self.muted)
    }

    /// Flip playback of every remote participant. Links are untouched.
    /// Returns the new deafen state.
    pub async fn toggle_deafen(&mut self) -> Result<bool> {
        self.ensure_open()?;
        self.deafened = !self.deafened;
        self.peers.set_remote_audio_muted(self.deafened);
        info!(deafened = self.deafened, "Deafen toggled");
        self.emit(VoiceEvent::DeafenChanged {
            deafened: self.deafened,
        })
        .await;
        self.publish_local_state().await?;
        Ok(self.deafened)
    }

    /// Switch to another microphone. Every link gets the new track in
    /// place; on failure the current capture is kept.
    pub async fn set_input_device(&mut self, device_id: &str) -> Result<()> {
        self.ensure_open()?;
        let capture = self.media.acquire_microphone(Some(device_id)).await?;
        capture.set_enabled(!self.muted);
        let updated = self
            .peers
            .replace_local_track(Arc::clone(capture.track()))
            .await;
        if let Some(mut previous) = self.capture.replace(capture) {
            previous.stop();
        }
        info!(device = %device_id, links = updated, "Input device switched");
        self.emit(VoiceEvent::InputDeviceChanged {
            device_id: device_id.to_string(),
        })
        .await;
        Ok(())
    }

    pub fn set_output_device(&self, device_id: &str) -> Result<()> {
        self.output.set_output_device(device_id)
    }

    /// Drop every link and dial everyone currently in the room.
    /// Returns how many links were started.
    pub async fn force_reconnect(&mut self) -> Result<usize> {
        self.ensure_open()?;
        info!(room_id = %self.room.id, "Reconnecting to every participant");
        self.peers.close_all().await;

        let listed = self.presence.list(&self.room.id).await?;
        let mut remotes = Vec::new();
        for participant in listed {
            if participant.user_id != self.identity.user_id {
                remotes.push(participant.user_id.clone());
            }
            self.remember(participant).await;
        }

        let mut started = 0;
        for remote_id in remotes {
            match self.peers.create(&remote_id, true).await {
                Ok(_) => started += 1,
                Err(e) => warn!(remote_id = %remote_id, error = %e, "Failed to redial participant"),
            }
        }
        Ok(started)
    }

    async fn publish_local_state(&mut self) -> Result<()> {
        let local = self.local_participant();
        let Some(signals) = &self.signals else {
            return Err(VoiceError::Closed);
        };
        self.presence.join(&local, signals).await?;
        self.participants.insert(local.user_id.clone(), local);
        Ok(())
    }

    fn local_participant(&self) -> Participant {
        let mut participant = Participant::new(
            &self.room.id,
            &self.identity.user_id,
            &self.identity.display_name,
        );
        participant.muted = self.muted;
        participant.deafened = self.deafened;
        participant
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(VoiceError::Closed)
        } else {
            Ok(())
        }
    }

    async fn emit(&self, event: VoiceEvent) {
        let _ = self.event_tx.send(event).await;
    }

    // -- Queries -----------------------------------------------------------

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Remote participants with a live link, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.peer_ids()
    }

    pub fn connection_state(&self, remote_id: &str) -> Option<ConnectionState> {
        self.peers.connection_state(remote_id)
    }

    pub fn connection_states(&self) -> HashMap<String, ConnectionState> {
        self.peers.connection_states()
    }

    /// Everyone in the room, the local participant included, by user id.
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self.participants.values().cloned().collect();
        participants.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        participants
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_deafened(&self) -> bool {
        self.deafened
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    pub fn input_device(&self) -> Option<&str> {
        self.capture.as_ref().map(LocalCapture::device_id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

async fn next_signal(signals: &mut Option<SignalSubscription>) -> Option<SignalMessage> {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_change(feed: &mut Option<mpsc::Receiver<PresenceChange>>) -> Option<PresenceChange> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}
