use std::path::{Path, PathBuf};

use hearth_common::ConfigError;
use tracing::{debug, info};

use super::template::default_config_toml;
use crate::schema::HearthConfig;

/// `<platform config dir>/hearth/config.toml`, e.g. `~/.config/hearth/config.toml`
/// on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("hearth").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Parse one TOML file. Absent keys take their serde defaults; nothing is
/// validated here.
pub fn load_from_path(path: &Path) -> Result<HearthConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };

    let config = toml::from_str::<HearthConfig>(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), "Config parsed");
    Ok(config)
}

/// Load the default path, writing the commented template there first if
/// the file does not exist yet.
pub fn load_default() -> Result<HearthConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            write_default(&path)?;
            Ok(HearthConfig::default())
        }
        other => other,
    }
}

/// Write the commented template to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    let io_err = |e: std::io::Error| ConfigError::ParseError(format!("{}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, default_config_toml()).map_err(io_err)?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
