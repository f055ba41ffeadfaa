//! Per-participant peer links and their negotiation.

mod link;
mod manager;


pub use link::PeerLink;
pub use manager::{ManagerConfig, PeerConnectionManager};

/// How a colliding offer is settled when both sides offered at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlareResolution {
    /// The participant with the greater user id yields: it drops its own
    /// offer and answers the remote one.
    #[default]
    PolitePeer,
    /// No tie-break: each side keeps its own offer and drops the remote one.
    /// A real collision leaves both links in `have-local-offer` until one
    /// side calls `force_reconnect` or the remote leaves.
    Ignore,
}
