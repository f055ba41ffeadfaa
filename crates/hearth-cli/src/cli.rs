use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "hearth-voice",
    about = "Join a Hearth voice room headlessly and report peer states"
)]
pub struct Args {
    /// Room to join.
    #[arg(short, long)]
    pub room: String,

    /// Display name shown to other participants.
    #[arg(short, long, default_value = "hearth-voice")]
    pub name: String,

    /// User id to join as. A random one is generated when omitted.
    #[arg(long)]
    pub user_id: Option<String>,

    /// Path to config.toml instead of the platform default.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// tracing filter directive, e.g. `hearth=debug`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Send Opus silence instead of joining receive-only.
    #[arg(long)]
    pub silence: bool,
}
