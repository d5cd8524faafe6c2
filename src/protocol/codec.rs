//! Protocol codec
//!
//! Frame I/O plus request encoding/decoding. Response decoding lives in
//! the client, which knows what request each frame answers.

use std::io::{Read, Write};

use crate::error::{QuartzError, Result};
use crate::index::SearchMode;

use super::Request;

/// Frame header: payload length (4 bytes, big-endian)
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum payload size (32 MB)
pub const MAX_FRAME_SIZE: u32 = 32 * 1024 * 1024;

// =============================================================================
// Frame I/O
// =============================================================================

/// Read one length-prefixed frame from a stream.
///
/// Returns `Ok(None)` on a clean close (EOF before any header byte).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(QuartzError::Protocol(
                    "connection closed mid-frame-header".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header);
    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(QuartzError::Protocol(format!(
            "bad frame length {} (max {})",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame to a stream.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() as u64 > MAX_FRAME_SIZE as u64 {
        return Err(QuartzError::Protocol(format!(
            "frame payload too large: {} bytes",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request payload (tag byte first)
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut buf = vec![request.tag()];
    match request {
        Request::Set { key, value } => {
            put_bytes(&mut buf, key);
            put_bytes(&mut buf, value);
        }
        Request::Get { key } | Request::Delete { key } => {
            put_bytes(&mut buf, key);
        }
        Request::BulkSet { pairs } => {
            buf.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
            for (key, value) in pairs {
                put_bytes(&mut buf, key);
                put_bytes(&mut buf, value);
            }
        }
        Request::Search { mode, query } => {
            buf.push(match mode {
                SearchMode::And => 0,
                SearchMode::Or => 1,
            });
            put_bytes(&mut buf, query.as_bytes());
        }
        Request::SemSearch {
            k,
            threshold,
            query,
        } => {
            buf.extend_from_slice(&k.to_be_bytes());
            buf.extend_from_slice(&threshold.to_be_bytes());
            put_bytes(&mut buf, query.as_bytes());
        }
    }
    buf
}

/// Decode a request payload (tag byte first)
pub fn decode_request(payload: &[u8]) -> Result<Request> {
    let mut pos = 0;
    let tag = take_u8(payload, &mut pos)?;

    let request = match tag {
        0x01 => {
            let key = take_bytes(payload, &mut pos)?;
            let value = take_bytes(payload, &mut pos)?;
            Request::Set { key, value }
        }
        0x02 => Request::Get {
            key: take_bytes(payload, &mut pos)?,
        },
        0x03 => Request::Delete {
            key: take_bytes(payload, &mut pos)?,
        },
        0x04 => {
            let count = take_u32(payload, &mut pos)? as usize;
            let mut pairs = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let key = take_bytes(payload, &mut pos)?;
                let value = take_bytes(payload, &mut pos)?;
                pairs.push((key, value));
            }
            Request::BulkSet { pairs }
        }
        0x05 => {
            let mode = match take_u8(payload, &mut pos)? {
                0 => SearchMode::And,
                1 => SearchMode::Or,
                other => {
                    return Err(QuartzError::Protocol(format!(
                        "unknown search mode {}",
                        other
                    )))
                }
            };
            let query = take_string(payload, &mut pos)?;
            Request::Search { mode, query }
        }
        0x06 => {
            let k = take_u32(payload, &mut pos)?;
            let threshold = take_f32(payload, &mut pos)?;
            let query = take_string(payload, &mut pos)?;
            Request::SemSearch {
                k,
                threshold,
                query,
            }
        }
        other => {
            return Err(QuartzError::Protocol(format!(
                "unknown request tag 0x{:02x}",
                other
            )))
        }
    };

    if pos != payload.len() {
        return Err(QuartzError::Protocol(format!(
            "trailing bytes in request: {} of {}",
            payload.len() - pos,
            payload.len()
        )));
    }

    Ok(request)
}

// =============================================================================
// Field helpers (shared with the cluster message codec)
// =============================================================================

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

pub(crate) fn take_u8(buf: &[u8], pos: &mut usize) -> Result<u8> {
    if buf.len() < *pos + 1 {
        return Err(QuartzError::Protocol("truncated u8 field".to_string()));
    }
    let v = buf[*pos];
    *pos += 1;
    Ok(v)
}

pub(crate) fn take_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    if buf.len() < *pos + 4 {
        return Err(QuartzError::Protocol("truncated u32 field".to_string()));
    }
    let v = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

pub(crate) fn take_u64(buf: &[u8], pos: &mut usize) -> Result<u64> {
    if buf.len() < *pos + 8 {
        return Err(QuartzError::Protocol("truncated u64 field".to_string()));
    }
    let v = u64::from_be_bytes(buf[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok(v)
}

pub(crate) fn take_f32(buf: &[u8], pos: &mut usize) -> Result<f32> {
    if buf.len() < *pos + 4 {
        return Err(QuartzError::Protocol("truncated f32 field".to_string()));
    }
    let v = f32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

pub(crate) fn take_bytes(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let len = take_u32(buf, pos)? as usize;
    if buf.len() < *pos + len {
        return Err(QuartzError::Protocol(format!(
            "truncated byte field: want {}, have {}",
            len,
            buf.len() - *pos
        )));
    }
    let v = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(v)
}

pub(crate) fn take_string(buf: &[u8], pos: &mut usize) -> Result<String> {
    let bytes = take_bytes(buf, pos)?;
    String::from_utf8(bytes)
        .map_err(|_| QuartzError::Protocol("invalid UTF-8 in string field".to_string()))
}
