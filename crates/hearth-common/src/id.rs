use uuid::Uuid;

/// Eight hex characters, enough to tell apart tracks and log lines within
/// one session.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Identifier for one peer connection attempt. Minted whenever a link to a
/// remote participant is created, so the far side can tell a restart from
/// a renegotiation.
pub fn new_connection_id() -> String {
    Uuid::new_v4().simple().to_string()
}
