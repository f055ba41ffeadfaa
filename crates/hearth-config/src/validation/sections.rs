//! Per-section validators.

use crate::schema::HearthConfig;

use super::helpers::{validate_ice_url, validate_range};

/// Validate backend connection timings.
pub(crate) fn validate_supabase(errors: &mut Vec<String>, config: &HearthConfig) {
    let supabase = &config.supabase;
    validate_range(
        errors,
        "supabase.heartbeat_interval_secs",
        supabase.heartbeat_interval_secs,
        5,
        60,
    );
    validate_range(
        errors,
        "supabase.reconnect_delay_secs",
        supabase.reconnect_delay_secs,
        1,
        60,
    );
    if supabase.max_reconnect_delay_secs < supabase.reconnect_delay_secs {
        errors.push(format!(
            "supabase.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            supabase.max_reconnect_delay_secs, supabase.reconnect_delay_secs
        ));
    }
    if supabase.participants_table.trim().is_empty() {
        errors.push("supabase.participants_table must not be empty".into());
    }
}

/// Validate ICE servers and signaling timings.
pub(crate) fn validate_voice(errors: &mut Vec<String>, config: &HearthConfig) {
    let voice = &config.voice;
    validate_range(
        errors,
        "voice.subscribe_timeout_secs",
        voice.subscribe_timeout_secs,
        1,
        120,
    );
    for (i, server) in voice.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("voice.ice_servers[{i}].urls must not be empty"));
        }
        for url in &server.urls {
            validate_ice_url(errors, &format!("voice.ice_servers[{i}].urls"), url);
        }
        let is_turn = server.urls.iter().any(|u| u.starts_with("turn"));
        if is_turn && (server.username.is_none() || server.credential.is_none()) {
            errors.push(format!(
                "voice.ice_servers[{i}] is a TURN server and needs username and credential"
            ));
        }
    }
}
