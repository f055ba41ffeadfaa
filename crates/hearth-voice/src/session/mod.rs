//! A participant's presence in one voice room.
//!
//! The session owns the signaling subscription, the presence row, the
//! local capture and the [`PeerConnectionManager`](crate::PeerConnectionManager)
//! for the room. All inputs are processed on one loop, one at a time.

mod room;
mod types;

#[cfg(test)]
mod tests;

pub use room::VoiceRoomSession;
pub use types::{Collaborators, SessionConfig};
