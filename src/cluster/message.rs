//! Peer message definitions and codec
//!
//! Cluster traffic shares the client listener; peer payloads are
//! distinguished by tag bytes at 0x80 and above.

use crate::error::{QuartzError, Result};
use crate::protocol::{take_bytes, take_u32, take_u64, take_u8};
use crate::wal::{Operation, WalEntry};

const TAG_APPEND: u8 = 0x81;
const TAG_APPEND_ACK: u8 = 0x82;
const TAG_VOTE_REQUEST: u8 = 0x83;
const TAG_VOTE_RESPONSE: u8 = 0x84;
const TAG_HEARTBEAT: u8 = 0x85;
const TAG_HEARTBEAT_ACK: u8 = 0x86;
const TAG_SNAPSHOT_BEGIN: u8 = 0x87;
const TAG_SNAPSHOT_CHUNK: u8 = 0x88;
const TAG_SNAPSHOT_END: u8 = 0x89;
const TAG_SNAPSHOT_ACK: u8 = 0x8A;

/// Whether a frame payload tag addresses the cluster layer.
pub fn is_peer_tag(tag: u8) -> bool {
    tag >= 0x80
}

/// Messages exchanged between cluster peers
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    /// Ship one WAL entry to a follower
    Append { term: u64, entry: WalEntry },

    /// Follower's reply; `ok = false` requests a snapshot resync
    AppendAck { term: u64, seq: u64, ok: bool },

    /// Candidate requesting a vote
    VoteRequest {
        term: u64,
        candidate_id: u32,
        last_applied_seq: u64,
    },

    VoteResponse { term: u64, granted: bool },

    /// Primary liveness signal; also carries the leader address used as
    /// the client redirect hint
    Heartbeat {
        term: u64,
        leader_id: u32,
        commit_seq: u64,
        leader_addr: String,
    },

    HeartbeatAck { term: u64 },

    /// Start of a full-state transfer
    SnapshotBegin { term: u64, checkpoint_seq: u64 },

    SnapshotChunk { pairs: Vec<(Vec<u8>, Vec<u8>)> },

    SnapshotEnd,

    SnapshotAck { ok: bool },
}

impl PeerMessage {
    pub fn tag(&self) -> u8 {
        match self {
            PeerMessage::Append { .. } => TAG_APPEND,
            PeerMessage::AppendAck { .. } => TAG_APPEND_ACK,
            PeerMessage::VoteRequest { .. } => TAG_VOTE_REQUEST,
            PeerMessage::VoteResponse { .. } => TAG_VOTE_RESPONSE,
            PeerMessage::Heartbeat { .. } => TAG_HEARTBEAT,
            PeerMessage::HeartbeatAck { .. } => TAG_HEARTBEAT_ACK,
            PeerMessage::SnapshotBegin { .. } => TAG_SNAPSHOT_BEGIN,
            PeerMessage::SnapshotChunk { .. } => TAG_SNAPSHOT_CHUNK,
            PeerMessage::SnapshotEnd => TAG_SNAPSHOT_END,
            PeerMessage::SnapshotAck { .. } => TAG_SNAPSHOT_ACK,
        }
    }

    /// Encode as a frame payload (tag byte first)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.tag()];
        match self {
            PeerMessage::Append { term, entry } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.extend_from_slice(&entry.seq.to_be_bytes());
                buf.push(entry.op.kind());
                let payload = entry.op.encode_payload();
                buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                buf.extend_from_slice(&payload);
            }
            PeerMessage::AppendAck { term, seq, ok } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.extend_from_slice(&seq.to_be_bytes());
                buf.push(u8::from(*ok));
            }
            PeerMessage::VoteRequest {
                term,
                candidate_id,
                last_applied_seq,
            } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.extend_from_slice(&candidate_id.to_be_bytes());
                buf.extend_from_slice(&last_applied_seq.to_be_bytes());
            }
            PeerMessage::VoteResponse { term, granted } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.push(u8::from(*granted));
            }
            PeerMessage::Heartbeat {
                term,
                leader_id,
                commit_seq,
                leader_addr,
            } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.extend_from_slice(&leader_id.to_be_bytes());
                buf.extend_from_slice(&commit_seq.to_be_bytes());
                buf.extend_from_slice(&(leader_addr.len() as u32).to_be_bytes());
                buf.extend_from_slice(leader_addr.as_bytes());
            }
            PeerMessage::HeartbeatAck { term } => {
                buf.extend_from_slice(&term.to_be_bytes());
            }
            PeerMessage::SnapshotBegin {
                term,
                checkpoint_seq,
            } => {
                buf.extend_from_slice(&term.to_be_bytes());
                buf.extend_from_slice(&checkpoint_seq.to_be_bytes());
            }
            PeerMessage::SnapshotChunk { pairs } => {
                buf.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
                for (key, value) in pairs {
                    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
                    buf.extend_from_slice(key);
                    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
                    buf.extend_from_slice(value);
                }
            }
            PeerMessage::SnapshotEnd => {}
            PeerMessage::SnapshotAck { ok } => buf.push(u8::from(*ok)),
        }
        buf
    }

    /// Decode a frame payload (tag byte first)
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let tag = take_u8(payload, &mut pos)?;

        let message = match tag {
            TAG_APPEND => {
                let term = take_u64(payload, &mut pos)?;
                let seq = take_u64(payload, &mut pos)?;
                let kind = take_u8(payload, &mut pos)?;
                let op_payload = take_bytes(payload, &mut pos)?;
                let op = Operation::decode_payload(kind, &op_payload)
                    .map_err(|e| QuartzError::Protocol(format!("bad append entry: {}", e)))?;
                PeerMessage::Append {
                    term,
                    entry: WalEntry::new(seq, op),
                }
            }
            TAG_APPEND_ACK => PeerMessage::AppendAck {
                term: take_u64(payload, &mut pos)?,
                seq: take_u64(payload, &mut pos)?,
                ok: take_u8(payload, &mut pos)? != 0,
            },
            TAG_VOTE_REQUEST => PeerMessage::VoteRequest {
                term: take_u64(payload, &mut pos)?,
                candidate_id: take_u32(payload, &mut pos)?,
                last_applied_seq: take_u64(payload, &mut pos)?,
            },
            TAG_VOTE_RESPONSE => PeerMessage::VoteResponse {
                term: take_u64(payload, &mut pos)?,
                granted: take_u8(payload, &mut pos)? != 0,
            },
            TAG_HEARTBEAT => {
                let term = take_u64(payload, &mut pos)?;
                let leader_id = take_u32(payload, &mut pos)?;
                let commit_seq = take_u64(payload, &mut pos)?;
                let addr_bytes = take_bytes(payload, &mut pos)?;
                let leader_addr = String::from_utf8(addr_bytes).map_err(|_| {
                    QuartzError::Protocol("invalid UTF-8 in leader address".to_string())
                })?;
                PeerMessage::Heartbeat {
                    term,
                    leader_id,
                    commit_seq,
                    leader_addr,
                }
            }
            TAG_HEARTBEAT_ACK => PeerMessage::HeartbeatAck {
                term: take_u64(payload, &mut pos)?,
            },
            TAG_SNAPSHOT_BEGIN => PeerMessage::SnapshotBegin {
                term: take_u64(payload, &mut pos)?,
                checkpoint_seq: take_u64(payload, &mut pos)?,
            },
            TAG_SNAPSHOT_CHUNK => {
                let count = take_u32(payload, &mut pos)? as usize;
                let mut pairs = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let key = take_bytes(payload, &mut pos)?;
                    let value = take_bytes(payload, &mut pos)?;
                    pairs.push((key, value));
                }
                PeerMessage::SnapshotChunk { pairs }
            }
            TAG_SNAPSHOT_END => PeerMessage::SnapshotEnd,
            TAG_SNAPSHOT_ACK => PeerMessage::SnapshotAck {
                ok: take_u8(payload, &mut pos)? != 0,
            },
            other => {
                return Err(QuartzError::Protocol(format!(
                    "unknown peer message tag 0x{:02x}",
                    other
                )))
            }
        };

        if pos != payload.len() {
            return Err(QuartzError::Protocol(format!(
                "trailing bytes in peer message: {} of {}",
                payload.len() - pos,
                payload.len()
            )));
        }

        Ok(message)
    }
}
