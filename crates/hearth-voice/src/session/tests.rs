use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::error::VoiceError;
use crate::event::VoiceEvent;
use crate::identity::Identity;
use crate::protocol::{Room, SignalKind};
use crate::testing::{
    CallLog, FakeMedia, FakeRemoteTrack, MemoryRelayHub, MockTransportFactory, PresenceTable,
    RecordingOutput,
};
use crate::transport::{ConnectionState, TransportEvent};

const ROOM: &str = "general";

/// Shared relay and presence table for every member of a test room.
struct World {
    hub: Arc<MemoryRelayHub>,
    table: Arc<PresenceTable>,
    log: CallLog,
}

struct Member {
    session: VoiceRoomSession,
    events: mpsc::Receiver<VoiceEvent>,
    factory: Arc<MockTransportFactory>,
    output: Arc<RecordingOutput>,
}

impl World {
    fn new() -> Self {
        Self {
            hub: MemoryRelayHub::new(),
            table: PresenceTable::new(),
            log: CallLog::default(),
        }
    }

    async fn join(&self, user_id: &str) -> Member {
        self.join_with(user_id, FakeMedia::with_inputs(&["default", "usb"]))
            .await
    }

    async fn join_with(&self, user_id: &str, media: Arc<FakeMedia>) -> Member {
        let factory = MockTransportFactory::new();
        let output = RecordingOutput::new();
        let collaborators = Collaborators {
            relay: self.hub.relay(self.log.clone()),
            presence: self.table.handle(self.log.clone()),
            transports: factory.clone(),
            media,
            output: output.clone(),
        };
        let (session, events) = VoiceRoomSession::open(
            Room::new(ROOM),
            Identity::new(user_id, user_id.to_uppercase()),
            collaborators,
            SessionConfig::default(),
        )
        .await
        .unwrap();
        Member {
            session,
            events,
            factory,
            output,
        }
    }

    fn offers(&self) -> usize {
        self.hub
            .published()
            .iter()
            .filter(|m| m.kind == SignalKind::Offer)
            .count()
    }
}

impl Member {
    fn drain(&mut self) -> Vec<VoiceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn state_of(&self, remote_id: &str) -> Option<ConnectionState> {
        self.session.connection_state(remote_id)
    }
}

/// Step every member until none of them has anything left to process.
async fn settle(members: &mut [&mut Member]) {
    loop {
        let mut progressed = false;
        for member in members.iter_mut() {
            while let Ok(true) =
                tokio::time::timeout(Duration::from_millis(20), member.session.step()).await
            {
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

// -- Joining ------------------------------------------------------------------

#[tokio::test]
async fn two_participants_connect_with_a_single_offer() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(world.offers(), 1);
    assert_eq!(alice.session.peer_ids(), vec!["bob".to_string()]);
    assert_eq!(bob.session.peer_ids(), vec!["alice".to_string()]);
    assert_eq!(alice.state_of("bob"), Some(ConnectionState::Connected));
    assert_eq!(bob.state_of("alice"), Some(ConnectionState::Connected));
    assert_eq!(alice.factory.created(), 1);
    assert_eq!(bob.factory.created(), 1);

    let ids: Vec<String> = bob
        .session
        .participants()
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn join_announces_existing_participants() {
    let world = World::new();
    let _alice = world.join("alice").await;
    let mut bob = world.join("bob").await;

    let events = bob.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::ParticipantJoined(p) if p.user_id == "alice" && p.display_name == "ALICE"
    )));
    assert_eq!(
        events.last(),
        Some(&VoiceEvent::Joined {
            room_id: ROOM.into()
        })
    );
}

#[tokio::test]
async fn signaling_is_confirmed_before_presence() {
    let world = World::new();
    let _alice = world.join("alice").await;
    assert_eq!(
        world.log.entries(),
        vec![
            "subscribe:general".to_string(),
            "watch:general".to_string(),
            "join:alice".to_string(),
        ]
    );
}

#[tokio::test]
async fn unconfirmed_signaling_never_joins_presence() {
    let world = World::new();
    let collaborators = Collaborators {
        relay: world.hub.silent_relay(world.log.clone()),
        presence: world.table.handle(world.log.clone()),
        transports: MockTransportFactory::new(),
        media: FakeMedia::with_inputs(&["default"]),
        output: RecordingOutput::new(),
    };
    let result = VoiceRoomSession::open(
        Room::new(ROOM),
        Identity::new("alice", "Alice"),
        collaborators,
        SessionConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(VoiceError::SubscribeTimeout(_))));
    assert_eq!(world.log.entries(), vec!["subscribe-timeout:general".to_string()]);
    assert!(world.table.rows().is_empty());
}

#[tokio::test]
async fn three_participants_form_a_full_mesh() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    let mut carol = world.join("carol").await;
    settle(&mut [&mut alice, &mut bob, &mut carol]).await;

    assert_eq!(world.offers(), 3);
    for (member, remotes) in [
        (&alice, ["bob", "carol"]),
        (&bob, ["alice", "carol"]),
        (&carol, ["alice", "bob"]),
    ] {
        for remote in remotes {
            assert_eq!(member.state_of(remote), Some(ConnectionState::Connected));
        }
    }
}

#[tokio::test]
async fn missing_microphone_stays_receive_only() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join_with("bob", FakeMedia::none()).await;
    settle(&mut [&mut alice, &mut bob]).await;

    assert!(!bob.session.has_capture());
    assert!(bob
        .drain()
        .iter()
        .any(|e| matches!(e, VoiceEvent::CaptureUnavailable(_))));
    assert!(bob.factory.latest("alice").tracks().is_empty());
    assert_eq!(
        alice.factory.latest("bob").tracks(),
        vec!["mic-default".to_string()]
    );
    assert_eq!(bob.state_of("alice"), Some(ConnectionState::Connected));
}

// -- Leaving ------------------------------------------------------------------

#[tokio::test]
async fn closing_tears_down_the_remote_side() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;

    bob.factory
        .latest("alice")
        .sink()
        .send(TransportEvent::RemoteTrack(FakeRemoteTrack::with_packets("a", 0)))
        .await;
    settle(&mut [&mut bob]).await;
    assert!(bob.output.is_attached("alice"));
    bob.drain();

    alice.session.close().await;
    settle(&mut [&mut alice, &mut bob]).await;

    assert!(alice.session.is_closed());
    assert!(alice.session.peer_ids().is_empty());
    assert!(alice.factory.latest("bob").is_closed());
    assert_eq!(world.hub.subscriber_count(ROOM), 1);
    let rows: Vec<String> = world.table.rows().into_iter().map(|p| p.user_id).collect();
    assert_eq!(rows, vec!["bob".to_string()]);

    assert!(bob.session.peer_ids().is_empty());
    assert_eq!(bob.state_of("alice"), None);
    assert!(!bob.output.is_attached("alice"));
    assert_eq!(bob.output.removed(), vec!["alice".to_string()]);
    assert!(bob.drain().contains(&VoiceEvent::ParticipantLeft {
        user_id: "alice".into()
    }));
}

#[tokio::test]
async fn close_unsubscribes_before_leaving_presence() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    alice.session.close().await;

    let entries = world.log.entries();
    assert_eq!(
        &entries[3..],
        &["unsubscribe:general".to_string(), "leave:alice".to_string()]
    );
}

#[tokio::test]
async fn close_is_idempotent() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    alice.drain();

    alice.session.close().await;
    alice.session.close().await;

    let left: Vec<VoiceEvent> = alice
        .drain()
        .into_iter()
        .filter(|e| matches!(e, VoiceEvent::Left { .. }))
        .collect();
    assert_eq!(left.len(), 1);
    assert!(!alice.session.step().await);
    assert!(matches!(
        alice.session.toggle_mute().await,
        Err(VoiceError::Closed)
    ));
    assert!(matches!(
        alice.session.force_reconnect().await,
        Err(VoiceError::Closed)
    ));
}

#[tokio::test]
async fn run_until_stops_on_shutdown() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    alice.session.run_until(async {}).await;
    assert!(!alice.session.is_closed());
}

// -- Local controls -----------------------------------------------------------

#[tokio::test]
async fn mute_keeps_links_and_updates_presence() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;
    bob.drain();

    assert!(alice.session.toggle_mute().await.unwrap());
    settle(&mut [&mut alice, &mut bob]).await;

    assert!(alice.session.is_muted());
    assert!(!alice.factory.latest("bob").is_closed());
    assert_eq!(alice.state_of("bob"), Some(ConnectionState::Connected));
    assert!(world
        .table
        .rows()
        .iter()
        .any(|p| p.user_id == "alice" && p.muted));
    assert!(bob.drain().iter().any(|e| matches!(
        e,
        VoiceEvent::ParticipantUpdated(p) if p.user_id == "alice" && p.muted
    )));

    assert!(!alice.session.toggle_mute().await.unwrap());
    assert!(alice.drain().contains(&VoiceEvent::MuteChanged { muted: false }));
}

#[tokio::test]
async fn deafen_mutes_sinks_without_touching_links() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;
    alice
        .factory
        .latest("bob")
        .sink()
        .send(TransportEvent::RemoteTrack(FakeRemoteTrack::with_packets("b", 0)))
        .await;
    settle(&mut [&mut alice]).await;

    assert!(alice.session.toggle_deafen().await.unwrap());
    assert_eq!(alice.output.is_muted("bob"), Some(true));
    assert_eq!(alice.state_of("bob"), Some(ConnectionState::Connected));
    assert_eq!(alice.factory.created(), 1);
    assert!(world
        .table
        .rows()
        .iter()
        .any(|p| p.user_id == "alice" && p.deafened));

    assert!(!alice.session.toggle_deafen().await.unwrap());
    assert_eq!(alice.output.is_muted("bob"), Some(false));
}

#[tokio::test]
async fn input_switch_replaces_tracks_in_place() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    let mut carol = world.join("carol").await;
    settle(&mut [&mut alice, &mut bob, &mut carol]).await;
    alice.drain();

    alice.session.set_input_device("usb").await.unwrap();

    for remote in ["bob", "carol"] {
        let transport = alice.factory.latest(remote);
        assert_eq!(transport.tracks(), vec!["mic-default".to_string()]);
        assert_eq!(transport.replaced(), vec!["mic-usb".to_string()]);
        assert!(!transport.is_closed());
    }
    assert_eq!(alice.factory.created(), 2);
    assert_eq!(alice.session.input_device(), Some("usb"));
    assert!(alice.drain().contains(&VoiceEvent::InputDeviceChanged {
        device_id: "usb".into()
    }));
}

#[tokio::test]
async fn failed_input_switch_keeps_current_capture() {
    let world = World::new();
    let mut alice = world.join("alice").await;

    let result = alice.session.set_input_device("missing").await;

    assert!(matches!(result, Err(VoiceError::Media(_))));
    assert_eq!(alice.session.input_device(), Some("default"));
}

#[tokio::test]
async fn output_device_is_forwarded() {
    let world = World::new();
    let alice = world.join("alice").await;
    alice.session.set_output_device("headphones").unwrap();
    assert_eq!(alice.output.device().as_deref(), Some("headphones"));
}

// -- Reconnect ----------------------------------------------------------------

#[tokio::test]
async fn force_reconnect_rebuilds_links() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;
    let old = alice.factory.latest("bob");

    assert_eq!(alice.session.force_reconnect().await.unwrap(), 1);
    settle(&mut [&mut alice, &mut bob]).await;

    assert!(old.is_closed());
    assert_eq!(alice.factory.created(), 2);
    assert_eq!(bob.factory.created(), 2);
    assert!(alice.factory.latest("bob").offers() >= 1);
    assert_eq!(alice.state_of("bob"), Some(ConnectionState::Connected));
    assert_eq!(bob.state_of("alice"), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn simultaneous_reconnects_settle_on_one_link() {
    let world = World::new();
    let mut alice = world.join("alice").await;
    let mut bob = world.join("bob").await;
    settle(&mut [&mut alice, &mut bob]).await;

    alice.session.force_reconnect().await.unwrap();
    bob.session.force_reconnect().await.unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(alice.session.peer_ids(), vec!["bob".to_string()]);
    assert_eq!(bob.session.peer_ids(), vec!["alice".to_string()]);
    assert!(!alice.factory.latest("bob").is_closed());
    assert!(!bob.factory.latest("alice").is_closed());
    assert_eq!(alice.state_of("bob"), Some(ConnectionState::Connected));
    assert_eq!(bob.state_of("alice"), Some(ConnectionState::Connected));
}
