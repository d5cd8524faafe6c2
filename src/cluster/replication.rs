//! Log shipping
//!
//! One background sender per follower drains a bounded queue of WAL
//! entries and ships them in order over a persistent connection. A
//! follower that rejects an entry, or whose queue overflows, is brought
//! back with a full snapshot transfer, after which streaming resumes.
//!
//! The apply path never blocks on the network: it enqueues and moves on.

use std::io::BufReader;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{QuartzError, Result};
use crate::node::Node;
use crate::protocol::{read_frame, write_frame};
use crate::wal::WalEntry;

use super::PeerMessage;

/// Pairs per snapshot chunk during a resync
pub const SNAPSHOT_CHUNK_PAIRS: usize = 256;

/// Wait on the queue before rechecking the shutdown and resync flags
const QUEUE_POLL: Duration = Duration::from_millis(100);

/// Handle for one follower's queue
struct FollowerQueue {
    addr: String,
    tx: Sender<WalEntry>,
    needs_resync: Arc<AtomicBool>,
}

/// Per-follower senders owned by the primary. Dropping the set closes
/// every queue, which ends the sender threads.
pub struct ReplicationSet {
    followers: Vec<FollowerQueue>,
}

impl ReplicationSet {
    /// Spawn one sender thread per configured peer.
    pub fn start(node: &Arc<Node>) -> Self {
        let config = node.config();
        let mut followers = Vec::with_capacity(config.peers.len());

        for addr in &config.peers {
            let (tx, rx) = bounded(config.replication_queue_depth);
            let needs_resync = Arc::new(AtomicBool::new(false));

            let thread_node = Arc::clone(node);
            let thread_addr = addr.clone();
            let thread_flag = Arc::clone(&needs_resync);
            let name = format!("quartzkv-repl-{}", addr);
            if let Err(e) = thread::Builder::new()
                .name(name)
                .spawn(move || run_sender(thread_node, thread_addr, rx, thread_flag))
            {
                tracing::error!(peer = %addr, error = %e, "failed to spawn replication sender");
                continue;
            }

            followers.push(FollowerQueue {
                addr: addr.clone(),
                tx,
                needs_resync,
            });
        }

        ReplicationSet { followers }
    }

    /// Enqueue an entry for every follower. A full queue forces that
    /// follower into a snapshot resync instead of blocking the writer.
    pub fn enqueue(&self, entry: &WalEntry) {
        for follower in &self.followers {
            match follower.tx.try_send(entry.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        peer = %follower.addr,
                        seq = entry.seq,
                        "replication queue overflow; scheduling snapshot resync"
                    );
                    follower.needs_resync.store(true, Ordering::SeqCst);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

// =============================================================================
// Sender worker
// =============================================================================

/// A sender's persistent connection to its follower
struct PeerConn {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

fn run_sender(node: Arc<Node>, addr: String, rx: Receiver<WalEntry>, resync: Arc<AtomicBool>) {
    tracing::debug!(peer = %addr, "replication sender started");

    let backoff = node.config().replication_backoff;
    let mut conn: Option<PeerConn> = None;

    // Next seq the follower is expected to need.
    let mut cursor = node.engine().last_applied() + 1;

    loop {
        if node.is_shutdown() {
            break;
        }

        if resync.load(Ordering::SeqCst) {
            // Anything still queued predates the snapshot we are about
            // to send.
            while rx.try_recv().is_ok() {}

            match send_snapshot(&node, &addr, &mut conn) {
                Ok(checkpoint_seq) => {
                    cursor = checkpoint_seq + 1;
                    resync.store(false, Ordering::SeqCst);
                    tracing::info!(peer = %addr, checkpoint_seq, "snapshot resync complete");
                }
                Err(e) => {
                    tracing::warn!(peer = %addr, error = %e, "snapshot resync failed; retrying");
                    conn = None;
                    thread::sleep(backoff);
                }
            }
            continue;
        }

        let entry = match rx.recv_timeout(QUEUE_POLL) {
            Ok(entry) => entry,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if entry.seq < cursor {
            // Already covered by a snapshot resync.
            continue;
        }
        if entry.seq > cursor {
            // Entries were dropped during an overflow.
            resync.store(true, Ordering::SeqCst);
            continue;
        }

        loop {
            if node.is_shutdown() {
                return;
            }
            if resync.load(Ordering::SeqCst) {
                // An overflow happened while we were retrying; the
                // snapshot will cover this entry.
                break;
            }
            match ship_entry(&node, &addr, &mut conn, &entry) {
                Ok(ShipOutcome::Acked) => {
                    cursor = entry.seq + 1;
                    break;
                }
                Ok(ShipOutcome::Rejected { term }) => {
                    if term > node.term() {
                        node.observe_higher_term(term, None);
                        return;
                    }
                    // Follower is out of step with the stream.
                    resync.store(true, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    tracing::debug!(peer = %addr, seq = entry.seq, error = %e, "append failed; backing off");
                    conn = None;
                    thread::sleep(backoff);
                }
            }
        }
    }

    tracing::debug!(peer = %addr, "replication sender stopped");
}

enum ShipOutcome {
    Acked,
    Rejected { term: u64 },
}

fn ship_entry(
    node: &Arc<Node>,
    addr: &str,
    conn: &mut Option<PeerConn>,
    entry: &WalEntry,
) -> Result<ShipOutcome> {
    let message = PeerMessage::Append {
        term: node.term(),
        entry: entry.clone(),
    };

    let reply = exchange(node, addr, conn, &message)?;
    match reply {
        PeerMessage::AppendAck { term, ok, .. } => {
            if ok {
                Ok(ShipOutcome::Acked)
            } else {
                Ok(ShipOutcome::Rejected { term })
            }
        }
        other => Err(QuartzError::Protocol(format!(
            "unexpected reply to append: tag 0x{:02x}",
            other.tag()
        ))),
    }
}

/// Stream a full snapshot of the primary's current state, returning the
/// seq it covers.
fn send_snapshot(node: &Arc<Node>, addr: &str, conn: &mut Option<PeerConn>) -> Result<u64> {
    let (checkpoint_seq, pairs) = node.engine().snapshot_pairs();
    let term = node.term();

    tracing::info!(
        peer = %addr,
        checkpoint_seq,
        entries = pairs.len(),
        "starting snapshot resync"
    );

    expect_snapshot_ack(exchange(
        node,
        addr,
        conn,
        &PeerMessage::SnapshotBegin {
            term,
            checkpoint_seq,
        },
    )?)?;

    for chunk in pairs.chunks(SNAPSHOT_CHUNK_PAIRS) {
        expect_snapshot_ack(exchange(
            node,
            addr,
            conn,
            &PeerMessage::SnapshotChunk {
                pairs: chunk.to_vec(),
            },
        )?)?;
    }

    expect_snapshot_ack(exchange(node, addr, conn, &PeerMessage::SnapshotEnd)?)?;
    Ok(checkpoint_seq)
}

fn expect_snapshot_ack(reply: PeerMessage) -> Result<()> {
    match reply {
        PeerMessage::SnapshotAck { ok: true } => Ok(()),
        PeerMessage::SnapshotAck { ok: false } => Err(QuartzError::Network(
            "follower rejected snapshot".to_string(),
        )),
        other => Err(QuartzError::Protocol(format!(
            "unexpected reply during snapshot: tag 0x{:02x}",
            other.tag()
        ))),
    }
}

/// Send one message and read one reply, reconnecting if needed.
fn exchange(
    node: &Arc<Node>,
    addr: &str,
    conn: &mut Option<PeerConn>,
    message: &PeerMessage,
) -> Result<PeerMessage> {
    if conn.is_none() {
        let timeout = node.config().peer_timeout;
        let stream = dial(addr, timeout)?;
        let reader = BufReader::new(stream.try_clone()?);
        *conn = Some(PeerConn { reader, stream });
    }

    let result = (|| {
        let peer = conn.as_mut().unwrap();
        write_frame(&mut peer.stream, &message.encode())?;
        let payload = read_frame(&mut peer.reader)?
            .ok_or_else(|| QuartzError::Network("peer closed connection".to_string()))?;
        PeerMessage::decode(&payload)
    })();

    if result.is_err() {
        *conn = None;
    }
    result
}

/// Connect to a peer with timeouts on connect, read, and write.
pub fn dial(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_err = None;
    for sock_addr in addr
        .to_socket_addrs()
        .map_err(|e| QuartzError::Network(format!("bad peer address {}: {}", addr, e)))?
    {
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(QuartzError::Network(format!(
        "cannot connect to {}: {}",
        addr,
        last_err.map_or_else(|| "no addresses".to_string(), |e| e.to_string())
    )))
}
