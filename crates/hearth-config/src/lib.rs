//! Hearth configuration system.
//!
//! TOML-based configuration with validation and environment overrides.
//! All config sections use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! let config = hearth_config::load_config(None).expect("failed to load config");
//! println!("{:?}", config.voice.ice_servers);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{HearthConfig, CONFIG_SCHEMA_VERSION};

use hearth_common::ConfigError;
use std::path::Path;

/// Load config from `path` (or the platform default path), apply
/// environment overrides and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<HearthConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    config.supabase.apply_env();
    validation::validate(&config)?;
    Ok(config)
}
