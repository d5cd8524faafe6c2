//! Connection Handler
//!
//! Per-connection loop: read one length-prefixed frame, dispatch, write
//! one response frame, repeat. Payload tags below 0x80 are client
//! requests; 0x80 and above are cluster peer messages.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{is_peer_tag, PeerMessage};
use crate::error::{QuartzError, Result};
use crate::node::Node;
use crate::protocol::{decode_request, read_frame, write_frame, Response};

/// Snapshot stream being received on this connection
struct PendingSnapshot {
    checkpoint_seq: u64,
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Handles a single connection (client or cluster peer)
pub struct Connection {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
    node: Arc<Node>,
    peer_addr: String,

    /// In-flight snapshot transfer, if the peer is resyncing us
    pending_snapshot: Option<PendingSnapshot>,
}

impl Connection {
    pub fn new(stream: TcpStream, node: Arc<Node>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Connection {
            reader,
            stream,
            node,
            peer_addr,
            pending_snapshot: None,
        })
    }

    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        self.stream
            .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        Ok(())
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Serve the connection until it closes, idles out, or misbehaves.
    pub fn handle(&mut self) -> Result<()> {
        loop {
            let payload = match read_frame(&mut self.reader) {
                Ok(Some(payload)) => payload,
                Ok(None) => return Ok(()), // clean close
                Err(QuartzError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::trace!(peer = %self.peer_addr, "connection idle timeout");
                    return Ok(());
                }
                Err(QuartzError::Protocol(msg)) => {
                    // Malformed framing: answer once, then drop them.
                    let _ = write_frame(&mut self.stream, &Response::malformed().encode());
                    return Err(QuartzError::Protocol(msg));
                }
                Err(e) => return Err(e),
            };

            let tag = payload[0];
            let reply = if is_peer_tag(tag) {
                self.handle_peer_frame(&payload)?
            } else {
                self.handle_client_frame(&payload)?
            };

            write_frame(&mut self.stream, &reply)?;
        }
    }

    /// Decode and route one client request.
    fn handle_client_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        match decode_request(payload) {
            Ok(request) => Ok(self.node.handle_request(request).encode()),
            Err(e) => {
                // Answer MALFORMED, then close by propagating the error.
                let _ = write_frame(&mut self.stream, &Response::malformed().encode());
                Err(e)
            }
        }
    }

    /// Decode and route one cluster peer message.
    fn handle_peer_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let message = PeerMessage::decode(payload)?;
        let reply = match message {
            PeerMessage::Append { term, entry } => self.node.handle_append(term, entry),
            PeerMessage::VoteRequest {
                term,
                candidate_id,
                last_applied_seq,
            } => self
                .node
                .handle_vote_request(term, candidate_id, last_applied_seq),
            PeerMessage::Heartbeat {
                term,
                leader_id,
                commit_seq,
                leader_addr,
            } => self
                .node
                .handle_heartbeat(term, leader_id, commit_seq, leader_addr),
            PeerMessage::SnapshotBegin {
                term,
                checkpoint_seq,
            } => {
                if self.node.accept_snapshot(term) {
                    self.pending_snapshot = Some(PendingSnapshot {
                        checkpoint_seq,
                        pairs: Vec::new(),
                    });
                    PeerMessage::SnapshotAck { ok: true }
                } else {
                    PeerMessage::SnapshotAck { ok: false }
                }
            }
            PeerMessage::SnapshotChunk { pairs } => match self.pending_snapshot.as_mut() {
                Some(pending) => {
                    pending.pairs.extend(pairs);
                    PeerMessage::SnapshotAck { ok: true }
                }
                None => PeerMessage::SnapshotAck { ok: false },
            },
            PeerMessage::SnapshotEnd => match self.pending_snapshot.take() {
                Some(pending) => PeerMessage::SnapshotAck {
                    ok: self
                        .node
                        .finish_snapshot_install(pending.checkpoint_seq, pending.pairs),
                },
                None => PeerMessage::SnapshotAck { ok: false },
            },
            other => {
                return Err(QuartzError::Protocol(format!(
                    "unexpected peer message tag 0x{:02x}",
                    other.tag()
                )))
            }
        };
        Ok(reply.encode())
    }
}
