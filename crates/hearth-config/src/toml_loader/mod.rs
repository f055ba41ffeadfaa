//! Reading `config.toml`, writing the commented default on first run.

mod loader;
mod template;


pub use loader::{default_config_path, load_default, load_from_path, write_default};
