//! Cluster Module
//!
//! Membership, replication, and leader election.
//!
//! ## Responsibilities
//! - Node roles and terms (simplified Raft)
//! - Durable `(current_term, voted_for)` metadata
//! - Log shipping from the primary to each follower
//! - Heartbeats, failure detection, elections
//!
//! ## Protocol
//! Peer messages share the client listener and are framed identically;
//! their payload tags start at 0x80. Replication is asynchronous: the
//! primary acknowledges clients on local durability and ships entries in
//! the background, so followers may lag. A follower that cannot be
//! caught up by streaming (gap, queue overflow) is resynced with a full
//! snapshot.

mod election;
mod message;
mod meta;
mod replication;

pub use election::{run_election_timer, run_heartbeat_loop, ElectionOutcome};
pub use message::{is_peer_tag, PeerMessage};
pub use meta::NodeMeta;
pub use replication::{dial, ReplicationSet, SNAPSHOT_CHUNK_PAIRS};

/// Replication role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts writes, ships the log, emits heartbeats
    Primary,
    /// Applies shipped entries, rejects client writes
    Follower,
    /// Running an election after a heartbeat timeout
    Candidate,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
        }
    }
}
