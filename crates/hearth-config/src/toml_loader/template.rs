//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Hearth Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[supabase]
# project_ref = "abcdefghijklmnop"     # or HEARTH_SUPABASE_REF
# api_key = "anon-key"                 # or HEARTH_SUPABASE_KEY
# participants_table = "voice_participants"
# heartbeat_interval_secs = 25
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30

[voice]
# input_device = "default"
# output_device = "default"
# subscribe_timeout_secs = 10
# glare_resolution = "polite_peer"     # polite_peer, none (no tie-break, collisions stall)

[[voice.ice_servers]]
urls = ["stun:stun.l.google.com:19302"]
# username = ""
# credential = ""

[logging]
# level = "info"                       # trace, debug, info, warn, error
"##
    .to_string()
}
