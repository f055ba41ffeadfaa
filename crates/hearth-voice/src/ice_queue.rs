//! Buffer for ICE candidates that arrive before their link can take them.

use std::collections::{HashMap, VecDeque};

use crate::protocol::IceCandidate;

/// A candidate together with the remote connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCandidate {
    pub connection_id: String,
    pub candidate: IceCandidate,
}

/// Candidates held per remote participant until the matching remote
/// description is applied.
///
/// Queues exist independently of links: a candidate may arrive before
/// the offer that creates the link it belongs to.
#[derive(Debug, Default)]
pub struct IceCandidateQueue {
    pending: HashMap<String, VecDeque<QueuedCandidate>>,
}

impl IceCandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, remote_id: &str, connection_id: &str, candidate: IceCandidate) {
        self.pending
            .entry(remote_id.to_string())
            .or_default()
            .push_back(QueuedCandidate {
                connection_id: connection_id.to_string(),
                candidate,
            });
    }

    /// Remove and return everything queued for `remote_id`, oldest first.
    pub fn drain(&mut self, remote_id: &str) -> Vec<QueuedCandidate> {
        self.pending
            .remove(remote_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop everything queued for `remote_id`.
    pub fn discard(&mut self, remote_id: &str) -> usize {
        self.pending.remove(remote_id).map_or(0, |q| q.len())
    }

    pub fn len(&self, remote_id: &str) -> usize {
        self.pending.get(remote_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(VecDeque::is_empty)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
