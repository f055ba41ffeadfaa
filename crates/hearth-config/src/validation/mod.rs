//! Range and format checks run after parsing and env overrides.

mod helpers;
mod sections;


use crate::schema::HearthConfig;
use hearth_common::ConfigError;

/// Check every section. All problems are reported together, `; `-separated.
pub fn validate(config: &HearthConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_supabase(&mut errors, config);
    sections::validate_voice(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
