//! Translation from the on-disk config to the voice core's types.

use std::time::Duration;

use hearth_config::schema::{
    GlareResolution as ConfiguredGlare, LogLevel, SupabaseConfig, VoiceConfig,
};
use hearth_voice::{GlareResolution, IceServer, Identity, RealtimeConfig, SessionConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "hearth=info";

/// Filter from the `--log-level` flag, then `RUST_LOG`, then the config
/// file. An unparsable flag is skipped.
pub fn env_filter(flag: Option<&str>, configured: Option<LogLevel>) -> EnvFilter {
    if let Some(filter) = flag.and_then(|directive| EnvFilter::try_new(directive).ok()) {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(
        configured
            .map(LogLevel::directive)
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string()),
    )
}

pub fn realtime_config(supabase: &SupabaseConfig) -> RealtimeConfig {
    RealtimeConfig {
        project_ref: supabase.project_ref.clone(),
        api_key: supabase.api_key.clone(),
        access_token: supabase.access_token.clone(),
        heartbeat_interval_secs: supabase.heartbeat_interval_secs,
        reconnect_delay_secs: supabase.reconnect_delay_secs,
        max_reconnect_delay_secs: supabase.max_reconnect_delay_secs,
    }
}

pub fn session_config(voice: &VoiceConfig) -> SessionConfig {
    SessionConfig {
        ice_servers: voice
            .ice_servers
            .iter()
            .map(|server| IceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
            })
            .collect(),
        input_device: voice.input_device.clone(),
        output_device: voice.output_device.clone(),
        glare_resolution: match voice.glare_resolution {
            ConfiguredGlare::PolitePeer => GlareResolution::PolitePeer,
            ConfiguredGlare::None => GlareResolution::Ignore,
        },
    }
}

pub fn subscribe_timeout(voice: &VoiceConfig) -> Duration {
    Duration::from_secs(voice.subscribe_timeout_secs)
}

pub fn identity(user_id: Option<&str>, display_name: &str, supabase: &SupabaseConfig) -> Identity {
    let mut identity = match user_id {
        Some(user_id) => Identity::new(user_id, display_name),
        None => Identity::generate(display_name),
    };
    identity.access_token = supabase.access_token.clone();
    identity
}
