//! Node runtime
//!
//! Ties the engine, cluster state, replication, and network server into
//! one process. The node routes client requests by role, answers peer
//! messages, and owns the background workers (heartbeats, election
//! timer, replication senders, periodic checkpoints).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cluster::{
    dial, run_election_timer, run_heartbeat_loop, ElectionOutcome, NodeMeta, PeerMessage,
    ReplicationSet, Role,
};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{QuartzError, Result};
use crate::network::ServerHandle;
use crate::protocol::{read_frame, write_frame, Request, Response, StatusCode};
use crate::wal::WalEntry;

/// Volatile cluster state, guarded by one mutex
struct ClusterState {
    role: Role,
    term: u64,
    voted_for: Option<u32>,
    leader_hint: Option<String>,
    last_heartbeat: Instant,
}

/// A running QuartzKV node
pub struct Node {
    config: Config,
    engine: Arc<Engine>,

    /// Back-reference handed to background workers
    self_ref: Weak<Node>,

    cluster: Mutex<ClusterState>,

    /// Mirror of the current term for lock-free reads on hot paths
    term_cell: AtomicU64,

    /// Senders exist only while this node is primary
    replication: Mutex<Option<ReplicationSet>>,

    server: Mutex<Option<ServerHandle>>,

    shutdown: AtomicBool,

    meta_path: PathBuf,
}

impl Node {
    /// Open the engine, load election metadata, and derive the initial
    /// role. Does not open the listener; call `start` for that.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let engine = Arc::new(Engine::open(&config)?);

        std::fs::create_dir_all(&config.data_dir)?;
        let meta_path = config.meta_path();
        let mut meta = NodeMeta::load_or_init(&meta_path, config.node_id)?;

        let (role, term, leader_hint) = if config.start_as_primary {
            let term = meta.current_term.max(1);
            (Role::Primary, term, Some(config.listen_addr.clone()))
        } else {
            (Role::Follower, meta.current_term, None)
        };

        if term != meta.current_term {
            meta.current_term = term;
            meta.persist(&meta_path)?;
        }

        tracing::info!(
            node_id = config.node_id,
            %role,
            term,
            last_applied = engine.last_applied(),
            "node initialized"
        );

        Ok(Arc::new_cyclic(|self_ref| Node {
            self_ref: self_ref.clone(),
            term_cell: AtomicU64::new(term),
            cluster: Mutex::new(ClusterState {
                role,
                term,
                voted_for: meta.voted_for,
                leader_hint,
                last_heartbeat: Instant::now(),
            }),
            engine,
            replication: Mutex::new(None),
            server: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            meta_path,
            config,
        }))
    }

    /// Strong handle for background workers. The node outlives every
    /// worker it spawns, so the weak reference always upgrades.
    fn arc(&self) -> Arc<Node> {
        self.self_ref.upgrade().expect("node dropped while running")
    }

    /// Open the listener and spawn the background workers.
    pub fn start(&self) -> Result<()> {
        let server = ServerHandle::start(self.arc())?;
        tracing::info!(addr = %server.local_addr(), "node listening");
        *self.server.lock() = Some(server);

        if self.role() == Role::Primary {
            *self.replication.lock() = Some(ReplicationSet::start(&self.arc()));
        }

        for peer in &self.config.peers {
            let node = self.arc();
            let peer = peer.clone();
            thread::Builder::new()
                .name(format!("quartzkv-heartbeat-{}", peer))
                .spawn(move || run_heartbeat_loop(node, peer))
                .map_err(|e| QuartzError::Network(format!("spawn heartbeat: {}", e)))?;
        }

        if !self.config.peers.is_empty() {
            let node = self.arc();
            thread::Builder::new()
                .name("quartzkv-election".to_string())
                .spawn(move || run_election_timer(node))
                .map_err(|e| QuartzError::Network(format!("spawn election timer: {}", e)))?;
        }

        if let Some(interval) = self.config.checkpoint_interval {
            let node = self.arc();
            thread::Builder::new()
                .name("quartzkv-checkpoint".to_string())
                .spawn(move || run_checkpoint_loop(node, interval))
                .map_err(|e| QuartzError::Network(format!("spawn checkpoint timer: {}", e)))?;
        }

        Ok(())
    }

    /// Graceful shutdown: close the listener, stop workers, checkpoint.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("shutting down node");

        if let Some(server) = self.server.lock().take() {
            server.stop();
        }
        *self.replication.lock() = None;

        if let Err(e) = self.engine.close() {
            tracing::error!(error = %e, "shutdown checkpoint failed");
        }
        tracing::info!("node shutdown complete");
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn role(&self) -> Role {
        self.cluster.lock().role
    }

    pub fn term(&self) -> u64 {
        self.term_cell.load(Ordering::SeqCst)
    }

    pub fn leader_hint(&self) -> Option<String> {
        self.cluster.lock().leader_hint.clone()
    }

    /// Time since the last valid leader contact
    pub fn heartbeat_elapsed(&self) -> Duration {
        self.cluster.lock().last_heartbeat.elapsed()
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.lock().as_ref().map(|s| s.local_addr())
    }

    // -------------------------------------------------------------------------
    // Request router
    // -------------------------------------------------------------------------

    /// Dispatch a client request. Writes are accepted only on the
    /// primary; reads serve locally on any role.
    pub fn handle_request(&self, request: Request) -> Response {
        if request.is_write() {
            if let Some(rejection) = self.reject_if_not_primary(&request) {
                return rejection;
            }
        }

        match request {
            Request::Get { key } => Response::Value {
                value: self.engine.get(&key),
            },
            Request::Search { mode, query } => Response::Keys {
                keys: self.engine.search_text(&query, mode),
            },
            Request::SemSearch {
                k,
                threshold,
                query,
            } => Response::Scored {
                hits: self.engine.search_semantic(&query, k as usize, threshold),
            },
            Request::Set { key, value } => match self.engine.set(key, value) {
                Ok(entry) => {
                    self.replicate(&entry);
                    Response::ok()
                }
                Err(e) => error_response(&e),
            },
            Request::Delete { key } => match self.engine.delete(key) {
                Ok((entry, existed)) => {
                    self.replicate(&entry);
                    Response::DeleteStatus {
                        code: StatusCode::Ok,
                        existed,
                        leader_hint: None,
                    }
                }
                Err(e) => Response::DeleteStatus {
                    code: match error_response(&e) {
                        Response::Status { code, .. } => code,
                        _ => StatusCode::IoError,
                    },
                    existed: false,
                    leader_hint: None,
                },
            },
            Request::BulkSet { pairs } => match self.engine.bulk_set(pairs) {
                Ok(entry) => {
                    self.replicate(&entry);
                    Response::ok()
                }
                Err(e) => error_response(&e),
            },
        }
    }

    fn reject_if_not_primary(&self, request: &Request) -> Option<Response> {
        let state = self.cluster.lock();
        if state.role == Role::Primary {
            return None;
        }
        let hint = state.leader_hint.clone();
        drop(state);

        Some(match request {
            Request::Delete { .. } => Response::DeleteStatus {
                code: StatusCode::NotPrimary,
                existed: false,
                leader_hint: hint,
            },
            _ => Response::not_primary(hint),
        })
    }

    /// Hand an entry to every follower queue. Never blocks on the
    /// network; the write gate has already been released.
    fn replicate(&self, entry: &WalEntry) {
        if let Some(set) = self.replication.lock().as_ref() {
            set.enqueue(entry);
        }
    }

    /// Trigger a checkpoint and replicate its marker (primary only).
    pub fn checkpoint(&self) -> Result<()> {
        let marker = self.engine.checkpoint()?;
        self.replicate(&marker);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Peer message handlers
    // -------------------------------------------------------------------------

    /// Apply a replicated entry from the primary.
    pub fn handle_append(&self, term: u64, entry: WalEntry) -> PeerMessage {
        let seq = entry.seq;
        {
            let mut state = self.cluster.lock();
            if term < state.term {
                return PeerMessage::AppendAck {
                    term: state.term,
                    seq,
                    ok: false,
                };
            }
            self.accept_leader_locked(&mut state, term, None);
        }

        let ok = match self.engine.apply_replicated(entry) {
            Ok(()) => true,
            Err(QuartzError::ReplicationLag { expected, got }) => {
                tracing::warn!(expected, got, "out-of-order append; requesting resync");
                false
            }
            Err(e) => {
                tracing::error!(seq, error = %e, "failed to apply replicated entry");
                false
            }
        };

        PeerMessage::AppendAck {
            term: self.term(),
            seq,
            ok,
        }
    }

    /// Grant or refuse a vote. The `(term, voted_for)` pair is fsynced
    /// before the response leaves this node.
    pub fn handle_vote_request(
        &self,
        term: u64,
        candidate_id: u32,
        candidate_last_applied: u64,
    ) -> PeerMessage {
        let mut state = self.cluster.lock();
        let mut dirty = false;

        if term > state.term {
            state.term = term;
            state.voted_for = None;
            self.term_cell.store(term, Ordering::SeqCst);
            if state.role != Role::Follower {
                tracing::info!(term, "higher term in vote request; stepping down");
                self.step_down_locked(&mut state);
            }
            dirty = true;
        }

        // Log-freshness rule: never elect a primary that would lose
        // acknowledged writes we already hold.
        let granted = term == state.term
            && state.voted_for.map_or(true, |v| v == candidate_id)
            && candidate_last_applied >= self.engine.last_applied();

        if granted {
            state.voted_for = Some(candidate_id);
            state.last_heartbeat = Instant::now();
            dirty = true;
        }

        if dirty {
            if let Err(e) = self.persist_meta_locked(&state) {
                tracing::error!(error = %e, "failed to persist vote; refusing to grant");
                return PeerMessage::VoteResponse {
                    term: state.term,
                    granted: false,
                };
            }
        }

        tracing::debug!(term, candidate_id, granted, "vote request handled");
        PeerMessage::VoteResponse {
            term: state.term,
            granted,
        }
    }

    /// Record a leader heartbeat.
    pub fn handle_heartbeat(
        &self,
        term: u64,
        leader_id: u32,
        _commit_seq: u64,
        leader_addr: String,
    ) -> PeerMessage {
        let mut state = self.cluster.lock();
        if term < state.term {
            return PeerMessage::HeartbeatAck { term: state.term };
        }

        if term == state.term && state.role == Role::Primary {
            // Two primaries in one term violates election safety.
            tracing::error!(term, leader_id, "received heartbeat from another primary in my term");
            return PeerMessage::HeartbeatAck { term: state.term };
        }

        self.accept_leader_locked(&mut state, term, Some(leader_addr));
        PeerMessage::HeartbeatAck { term: state.term }
    }

    /// Gate for an incoming snapshot stream: treat it as leader contact.
    pub fn accept_snapshot(&self, term: u64) -> bool {
        let mut state = self.cluster.lock();
        if term < state.term {
            return false;
        }
        self.accept_leader_locked(&mut state, term, None);
        true
    }

    /// Install a fully received snapshot stream.
    pub fn finish_snapshot_install(
        &self,
        checkpoint_seq: u64,
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> bool {
        match self.engine.install_snapshot(checkpoint_seq, pairs) {
            Ok(()) => {
                self.cluster.lock().last_heartbeat = Instant::now();
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "snapshot install failed");
                false
            }
        }
    }

    /// A higher term was observed outside the handlers (replication ack
    /// or heartbeat ack). Steps down if currently leading.
    pub fn observe_higher_term(&self, term: u64, leader_hint: Option<String>) {
        let mut state = self.cluster.lock();
        if term <= state.term {
            return;
        }
        tracing::info!(term, old_term = state.term, "observed higher term; stepping down");
        state.term = term;
        state.voted_for = None;
        self.term_cell.store(term, Ordering::SeqCst);
        if leader_hint.is_some() {
            state.leader_hint = leader_hint;
        }
        self.step_down_locked(&mut state);
        if let Err(e) = self.persist_meta_locked(&state) {
            tracing::error!(error = %e, "failed to persist term");
        }
    }

    // -------------------------------------------------------------------------
    // Election & heartbeat internals
    // -------------------------------------------------------------------------

    /// One election round: become candidate in a fresh term, solicit
    /// votes, and take the primary role on a strict majority of the
    /// full configured cluster.
    pub fn run_election_round(&self) -> ElectionOutcome {
        let (term, last_applied) = {
            let mut state = self.cluster.lock();
            if state.role == Role::Primary {
                return ElectionOutcome::SteppedDown;
            }
            state.role = Role::Candidate;
            state.term += 1;
            state.voted_for = Some(self.config.node_id);
            state.leader_hint = None;
            self.term_cell.store(state.term, Ordering::SeqCst);
            if let Err(e) = self.persist_meta_locked(&state) {
                tracing::error!(error = %e, "cannot persist candidacy; aborting election");
                state.role = Role::Follower;
                return ElectionOutcome::SteppedDown;
            }
            (state.term, self.engine.last_applied())
        };

        tracing::info!(term, "running for primary");

        let request = PeerMessage::VoteRequest {
            term,
            candidate_id: self.config.node_id,
            last_applied_seq: last_applied,
        };

        let mut votes = 1usize; // our own
        for peer in &self.config.peers {
            match self.peer_roundtrip(peer, &request) {
                Ok(PeerMessage::VoteResponse {
                    term: peer_term,
                    granted,
                }) => {
                    if peer_term > term {
                        self.observe_higher_term(peer_term, None);
                        return ElectionOutcome::SteppedDown;
                    }
                    if granted {
                        votes += 1;
                    }
                }
                Ok(other) => {
                    tracing::warn!(peer = %peer, tag = other.tag(), "unexpected vote reply");
                }
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "vote request failed");
                }
            }
        }

        let cluster_size = self.config.cluster_size();
        let majority = votes * 2 > cluster_size;
        tracing::info!(term, votes, cluster_size, majority, "election round finished");

        let mut state = self.cluster.lock();
        if state.term != term || state.role != Role::Candidate {
            // A leader emerged while we were counting.
            return ElectionOutcome::SteppedDown;
        }
        if !majority {
            return ElectionOutcome::NoMajority;
        }

        state.role = Role::Primary;
        state.leader_hint = Some(self.config.listen_addr.clone());
        state.last_heartbeat = Instant::now();
        // Install the senders before releasing the lock, so a concurrent
        // demotion cannot interleave and leave stale senders behind.
        *self.replication.lock() = Some(ReplicationSet::start(&self.arc()));
        drop(state);

        tracing::info!(term, "won election; now primary");

        // Announce immediately instead of waiting a heartbeat interval.
        for peer in self.config.peers.clone() {
            self.send_heartbeat(&peer);
        }
        ElectionOutcome::Won
    }

    /// Send one heartbeat to one peer, stepping down if the reply
    /// carries a higher term.
    pub fn send_heartbeat(&self, peer: &str) {
        let message = PeerMessage::Heartbeat {
            term: self.term(),
            leader_id: self.config.node_id,
            commit_seq: self.engine.last_applied(),
            leader_addr: self.config.listen_addr.clone(),
        };

        match self.peer_roundtrip(peer, &message) {
            Ok(PeerMessage::HeartbeatAck { term }) => {
                if term > self.term() {
                    self.observe_higher_term(term, None);
                }
            }
            Ok(other) => {
                tracing::warn!(peer, tag = other.tag(), "unexpected heartbeat reply");
            }
            Err(e) => {
                tracing::trace!(peer, error = %e, "heartbeat failed");
            }
        }
    }

    fn peer_roundtrip(&self, peer: &str, message: &PeerMessage) -> Result<PeerMessage> {
        let mut stream = dial(peer, self.config.peer_timeout)?;
        write_frame(&mut stream, &message.encode())?;
        let payload = read_frame(&mut stream)?
            .ok_or_else(|| QuartzError::Network("peer closed connection".to_string()))?;
        PeerMessage::decode(&payload)
    }

    /// Common transition for any valid leader contact at `term >= ours`:
    /// adopt the term, drop to follower, reset the election timer.
    fn accept_leader_locked(&self, state: &mut ClusterState, term: u64, leader_addr: Option<String>) {
        let mut dirty = false;
        if term > state.term {
            state.term = term;
            state.voted_for = None;
            self.term_cell.store(term, Ordering::SeqCst);
            dirty = true;
        }
        if state.role != Role::Follower {
            tracing::info!(term, "valid leader contact; becoming follower");
            self.step_down_locked(state);
        }
        if let Some(addr) = leader_addr {
            state.leader_hint = Some(addr);
        }
        state.last_heartbeat = Instant::now();
        if dirty {
            if let Err(e) = self.persist_meta_locked(state) {
                tracing::error!(error = %e, "failed to persist term");
            }
        }
    }

    fn step_down_locked(&self, state: &mut ClusterState) {
        state.role = Role::Follower;
        // Closing the queues ends the sender threads.
        *self.replication.lock() = None;
    }

    fn persist_meta_locked(&self, state: &ClusterState) -> Result<()> {
        NodeMeta {
            node_id: self.config.node_id,
            current_term: state.term,
            voted_for: state.voted_for,
        }
        .persist(&self.meta_path)
    }
}

/// Map an engine error to the client-facing status response.
fn error_response(error: &QuartzError) -> Response {
    match error {
        QuartzError::NotPrimary { leader } => Response::not_primary(leader.clone()),
        QuartzError::Protocol(_) => Response::malformed(),
        _ => Response::io_error(),
    }
}

/// Periodic checkpoint driver. Only the primary checkpoints on a timer;
/// followers mirror its CHECKPOINT markers from the replication stream.
fn run_checkpoint_loop(node: Arc<Node>, interval: Duration) {
    loop {
        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
            if node.is_shutdown() {
                return;
            }
        }

        if node.role() != Role::Primary || node.engine().is_degraded() {
            continue;
        }
        if let Err(e) = node.checkpoint() {
            tracing::error!(error = %e, "periodic checkpoint failed");
        }
    }
}
