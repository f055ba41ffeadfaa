use std::path::PathBuf;

/// Failures while locating, parsing or checking `hearth.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Top-level error for binaries that drive a voice session.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("voice error: {0}")]
    Voice(String),
}
