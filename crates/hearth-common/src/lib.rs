pub mod errors;
pub mod id;

pub use errors::{ConfigError, HearthError};
pub use id::{new_connection_id, new_correlation_id};

pub type Result<T> = std::result::Result<T, HearthError>;
