//! `config.toml` sections. Every struct is `serde(default)`, so a file only
//! needs the keys it changes.

mod supabase;
mod system;
mod voice;

pub use supabase::*;
pub use system::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub supabase: SupabaseConfig,
    pub voice: VoiceConfig,
    pub logging: LoggingConfig,
}
