//! WAL Entry definitions
//!
//! Defines the structure and binary encoding of individual WAL records.

use crate::error::{QuartzError, Result};

/// Size of the fixed record header: len (4) + seq (8) + kind (1)
pub const RECORD_HEADER_SIZE: usize = 13;

/// Largest record body accepted by the reader (64 MB). Anything bigger
/// is treated as a corrupt length prefix.
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

const KIND_SET: u8 = 0x01;
const KIND_DELETE: u8 = 0x02;
const KIND_BULK_SET: u8 = 0x03;
const KIND_CHECKPOINT: u8 = 0x04;

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Set a key-value pair
    Set { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key (logged even when the key is absent, so followers
    /// observe intent uniformly)
    Delete { key: Vec<u8> },

    /// Set many pairs as one atomic batch
    BulkSet { pairs: Vec<(Vec<u8>, Vec<u8>)> },

    /// Marker recording that a snapshot incorporating all entries up to
    /// `checkpoint_seq` has been written
    Checkpoint { checkpoint_seq: u64 },
}

impl Operation {
    /// Wire kind byte for this operation
    pub fn kind(&self) -> u8 {
        match self {
            Operation::Set { .. } => KIND_SET,
            Operation::Delete { .. } => KIND_DELETE,
            Operation::BulkSet { .. } => KIND_BULK_SET,
            Operation::Checkpoint { .. } => KIND_CHECKPOINT,
        }
    }

    /// Encode the operation payload (excludes framing, seq, kind, CRC)
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Operation::Set { key, value } => {
                let mut buf = Vec::with_capacity(8 + key.len() + value.len());
                put_bytes(&mut buf, key);
                put_bytes(&mut buf, value);
                buf
            }
            Operation::Delete { key } => {
                let mut buf = Vec::with_capacity(4 + key.len());
                put_bytes(&mut buf, key);
                buf
            }
            Operation::BulkSet { pairs } => {
                let mut buf = Vec::new();
                buf.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
                for (key, value) in pairs {
                    put_bytes(&mut buf, key);
                    put_bytes(&mut buf, value);
                }
                buf
            }
            Operation::Checkpoint { checkpoint_seq } => checkpoint_seq.to_be_bytes().to_vec(),
        }
    }

    /// Decode an operation payload for the given kind byte
    pub fn decode_payload(kind: u8, payload: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let op = match kind {
            KIND_SET => {
                let key = take_bytes(payload, &mut pos)?;
                let value = take_bytes(payload, &mut pos)?;
                Operation::Set { key, value }
            }
            KIND_DELETE => {
                let key = take_bytes(payload, &mut pos)?;
                Operation::Delete { key }
            }
            KIND_BULK_SET => {
                let count = take_u32(payload, &mut pos)? as usize;
                let mut pairs = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = take_bytes(payload, &mut pos)?;
                    let value = take_bytes(payload, &mut pos)?;
                    pairs.push((key, value));
                }
                Operation::BulkSet { pairs }
            }
            KIND_CHECKPOINT => {
                let checkpoint_seq = take_u64(payload, &mut pos)?;
                Operation::Checkpoint { checkpoint_seq }
            }
            other => {
                return Err(QuartzError::WalCorruption(format!(
                    "unknown record kind 0x{:02x}",
                    other
                )))
            }
        };

        if pos != payload.len() {
            return Err(QuartzError::WalCorruption(format!(
                "trailing bytes in record payload: {} of {}",
                payload.len() - pos,
                payload.len()
            )));
        }

        Ok(op)
    }
}

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Sequence number - monotonically increasing, contiguous
    pub seq: u64,

    /// The operation to perform
    pub op: Operation,
}

impl WalEntry {
    pub fn new(seq: u64, op: Operation) -> Self {
        Self { seq, op }
    }

    /// Encode the full on-disk record: `[len][seq][kind][payload][crc]`
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.op.encode_payload();
        let body_len = 8 + 1 + payload.len();

        let mut record = Vec::with_capacity(4 + body_len + 4);
        record.extend_from_slice(&(body_len as u32).to_be_bytes());
        record.extend_from_slice(&self.seq.to_be_bytes());
        record.push(self.op.kind());
        record.extend_from_slice(&payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&record[4..]);
        record.extend_from_slice(&hasher.finalize().to_be_bytes());

        record
    }

    /// Decode a record body (`seq + kind + payload`, CRC already verified)
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() < 9 {
            return Err(QuartzError::WalCorruption(format!(
                "record body too short: {} bytes",
                body.len()
            )));
        }
        let seq = u64::from_be_bytes(body[0..8].try_into().unwrap());
        let kind = body[8];
        let op = Operation::decode_payload(kind, &body[9..])?;
        Ok(WalEntry { seq, op })
    }
}

// =============================================================================
// Payload encoding helpers
// =============================================================================

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn take_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    if buf.len() < *pos + 4 {
        return Err(QuartzError::WalCorruption("truncated u32 field".into()));
    }
    let v = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

fn take_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    if buf.len() < *pos + 8 {
        return Err(QuartzError::WalCorruption("truncated u64 field".into()));
    }
    let v = u64::from_be_bytes(buf[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok(v)
}

fn take_bytes(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let len = take_u32(buf, pos)? as usize;
    if buf.len() < *pos + len {
        return Err(QuartzError::WalCorruption(format!(
            "truncated byte field: want {}, have {}",
            len,
            buf.len() - *pos
        )));
    }
    let v = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(v)
}
