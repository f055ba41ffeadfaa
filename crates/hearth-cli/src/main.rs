//! hearth-voice: headless voice room client.
//!
//! Joins one room over Supabase Realtime with WebRTC peer links, logs every
//! participant and peer state change, and leaves cleanly on Ctrl-C. Useful
//! as a diagnostic peer or a listening bot.

mod cli;
mod setup;

use std::sync::Arc;

use clap::Parser;
use hearth_common::{ConfigError, HearthError};
use hearth_config::HearthConfig;
use hearth_voice::media::{HeadlessMedia, HeadlessOutput};
use hearth_voice::realtime::RealtimeEvent;
use hearth_voice::{
    Collaborators, RealtimeClient, RealtimeSignalRelay, Room, SupabasePresenceStore, VoiceEvent,
    VoiceRoomSession, WebRtcTransportFactory,
};
use tracing::{debug, error, info, warn};

use crate::cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let loaded = hearth_config::load_config(args.config.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(setup::env_filter(
            args.log_level.as_deref(),
            loaded.as_ref().ok().map(|config| config.logging.level),
        ))
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args, config).await {
        error!(error = %e, "hearth-voice stopped");
        std::process::exit(1);
    }
}

async fn run(args: Args, config: HearthConfig) -> Result<(), HearthError> {
    if !config.supabase.is_configured() {
        return Err(ConfigError::ValidationError(
            "supabase.project_ref and supabase.api_key must be set".into(),
        )
        .into());
    }

    let realtime_config = setup::realtime_config(&config.supabase);
    let (realtime, mut realtime_events) = RealtimeClient::connect(realtime_config.clone());
    tokio::spawn(async move {
        while let Some(event) = realtime_events.recv().await {
            match event {
                RealtimeEvent::Connected => info!("Realtime connected"),
                RealtimeEvent::Disconnected => warn!("Realtime disconnected"),
                RealtimeEvent::Error(message) => warn!(%message, "Realtime error"),
                other => debug!(event = ?other, "Unrouted realtime event"),
            }
        }
    });

    let timeout = setup::subscribe_timeout(&config.voice);
    let output = Arc::new(HeadlessOutput::new());
    let media = if args.silence {
        HeadlessMedia::with_silence()
    } else {
        HeadlessMedia::receive_only()
    };
    let presence = SupabasePresenceStore::new(
        realtime.clone(),
        &realtime_config,
        &config.supabase.participants_table,
    )
    .with_confirm_timeout(timeout);
    let collaborators = Collaborators {
        relay: Arc::new(RealtimeSignalRelay::new(realtime.clone(), timeout)),
        presence: Arc::new(presence),
        transports: Arc::new(WebRtcTransportFactory::new()?),
        media: Arc::new(media),
        output: output.clone(),
    };

    let identity = setup::identity(args.user_id.as_deref(), &args.name, &config.supabase);
    info!(room_id = %args.room, user_id = %identity.user_id, "Joining voice room");
    let (mut session, mut events) = VoiceRoomSession::open(
        Room::new(args.room.clone()),
        identity,
        collaborators,
        setup::session_config(&config.voice),
    )
    .await?;

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            report(&event);
        }
    });

    session.run_until(shutdown_signal()).await;
    info!("Shutting down");
    session.close().await;
    drop(session);
    let _ = reporter.await;

    for (remote_id, packets) in output.packet_counts() {
        info!(remote_id = %remote_id, packets, "Audio received");
    }
    realtime.disconnect().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, running until the session stops");
        std::future::pending::<()>().await;
    }
}

fn report(event: &VoiceEvent) {
    match event {
        VoiceEvent::Joined { room_id } => info!(room_id = %room_id, "Joined"),
        VoiceEvent::Left { room_id } => info!(room_id = %room_id, "Left"),
        VoiceEvent::ParticipantJoined(p) => {
            info!(user_id = %p.user_id, name = %p.display_name, "Participant joined")
        }
        VoiceEvent::ParticipantUpdated(p) => info!(
            user_id = %p.user_id,
            muted = p.muted,
            deafened = p.deafened,
            "Participant updated"
        ),
        VoiceEvent::ParticipantLeft { user_id } => info!(user_id = %user_id, "Participant left"),
        VoiceEvent::PeerStateChanged { user_id, state } => {
            info!(remote_id = %user_id, state = %state, "Peer state")
        }
        VoiceEvent::CaptureUnavailable(reason) => warn!(%reason, "Receive-only"),
        VoiceEvent::Error(message) => error!(%message, "Voice error"),
        other => debug!(event = ?other, "Voice event"),
    }
}
