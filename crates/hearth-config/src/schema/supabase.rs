//! Hosted backend connection settings.

use serde::{Deserialize, Serialize};

/// Supabase project settings used by the realtime relay and the presence table.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project reference (the subdomain of `<ref>.supabase.co`).
    pub project_ref: String,
    /// Anon (publishable) key.
    pub api_key: String,
    /// Optional user JWT for row-level security.
    pub access_token: Option<String>,
    /// Table holding one row per (room, user) voice participant.
    pub participants_table: String,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("participants_table", &self.participants_table)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            participants_table: "voice_participants".into(),
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

impl SupabaseConfig {
    /// Apply `HEARTH_SUPABASE_REF`, `HEARTH_SUPABASE_KEY` and
    /// `HEARTH_ACCESS_TOKEN` when set.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("HEARTH_SUPABASE_REF") {
            self.project_ref = v;
        }
        if let Ok(v) = std::env::var("HEARTH_SUPABASE_KEY") {
            self.api_key = v;
        }
        if let Ok(v) = std::env::var("HEARTH_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.project_ref.is_empty() && !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let config = SupabaseConfig {
            project_ref: "abcd".into(),
            api_key: "super-secret".into(),
            access_token: Some("jwt-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{config:?}");
        assert!(dbg.contains("abcd"));
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("jwt-secret"));
    }

    #[test]
    fn is_configured_requires_ref_and_key() {
        let mut config = SupabaseConfig::default();
        assert!(!config.is_configured());
        config.project_ref = "abcd".into();
        assert!(!config.is_configured());
        config.api_key = "key".into();
        assert!(config.is_configured());
    }
}
