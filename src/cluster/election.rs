//! Heartbeat and election timers
//!
//! Two kinds of background loops drive membership:
//! - one heartbeat loop per peer, active while this node is primary
//! - one election timer, active while this node is a follower
//!
//! The election timeout is jittered ±20% per node so peers do not all
//! become candidates in the same instant. A candidate that fails to win
//! waits a randomized interval in `[T, 2T]` before the next round; any
//! valid heartbeat in the meantime demotes it back to follower.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::node::Node;

use super::Role;

/// Granularity of the election timer's deadline checks
const TIMER_TICK: Duration = Duration::from_millis(20);

/// Heartbeat loop for one peer. Sends a heartbeat every configured
/// interval while this node is primary; otherwise idles.
pub fn run_heartbeat_loop(node: Arc<Node>, peer: String) {
    let interval = node.config().heartbeat_interval;

    while !node.is_shutdown() {
        thread::sleep(interval);
        if node.is_shutdown() {
            break;
        }
        if node.role() != Role::Primary {
            continue;
        }
        node.send_heartbeat(&peer);
    }
}

/// Election timer. Watches for heartbeat silence and runs election
/// rounds until this node wins, or a leader shows up.
pub fn run_election_timer(node: Arc<Node>) {
    let base = node.config().election_timeout;
    let timeout = jittered(base);
    tracing::debug!(timeout_ms = timeout.as_millis() as u64, "election timeout armed");

    while !node.is_shutdown() {
        thread::sleep(TIMER_TICK);

        if node.role() != Role::Follower {
            continue;
        }
        if node.heartbeat_elapsed() < timeout {
            continue;
        }

        tracing::info!(
            elapsed_ms = node.heartbeat_elapsed().as_millis() as u64,
            "heartbeat timeout; starting election"
        );
        run_election_rounds(&node, base);
    }
}

/// Run election rounds until the candidacy resolves: this node becomes
/// primary, observes a leader or higher term, or shuts down.
fn run_election_rounds(node: &Arc<Node>, base_timeout: Duration) {
    loop {
        if node.is_shutdown() {
            return;
        }

        match node.run_election_round() {
            ElectionOutcome::Won | ElectionOutcome::SteppedDown => return,
            ElectionOutcome::NoMajority => {}
        }

        // Lost the round: wait a randomized [T, 2T] before trying again,
        // bailing out as soon as a leader demotes us.
        let wait = rand::thread_rng().gen_range(base_timeout..base_timeout * 2);
        let deadline = std::time::Instant::now() + wait;
        while std::time::Instant::now() < deadline {
            thread::sleep(TIMER_TICK);
            if node.is_shutdown() || node.role() != Role::Candidate {
                return;
            }
        }
    }
}

/// Result of a single election round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Majority reached; this node is now primary
    Won,
    /// Lost the candidacy to a leader or a higher term
    SteppedDown,
    /// Round ended without a majority; try again after a random wait
    NoMajority,
}

/// Election timeout with ±20% per-node jitter.
fn jittered(base: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.8..1.2);
    base.mul_f64(factor)
}
