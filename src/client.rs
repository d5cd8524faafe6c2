//! Client library
//!
//! Synchronous client over a single TCP stream with sequential
//! write-then-read framing, the same pattern the CLI uses. Reconnection
//! and leader-redirect policy are left to the caller: a write that lands
//! on a follower fails with `NotPrimary` carrying the leader hint.

use std::io::BufReader;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{QuartzError, Result};
use crate::index::SearchMode;
use crate::protocol::{
    encode_request, read_frame, take_bytes, take_f32, take_u32, take_u8, write_frame, Request,
    StatusCode,
};

/// Client for a QuartzKV node
pub struct Client {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

impl Client {
    /// Connect to a node.
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| QuartzError::Network(format!("connect {}: {}", addr, e)))?;
        Self::from_stream(stream)
    }

    /// Connect with a timeout on the connection attempt.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let sock_addr = addr
            .to_socket_addrs()
            .map_err(|e| QuartzError::Network(format!("bad address {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| QuartzError::Network(format!("no addresses for {}", addr)))?;
        let stream = TcpStream::connect_timeout(&sock_addr, timeout)
            .map_err(|e| QuartzError::Network(format!("connect {}: {}", addr, e)))?;
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Client { reader, stream })
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Set a key-value pair.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let payload = self.roundtrip(&Request::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        decode_status(&payload)
    }

    /// Get a value.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let payload = self.roundtrip(&Request::Get { key: key.to_vec() })?;
        decode_value(&payload)
    }

    /// Delete a key. Returns whether the key existed.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let payload = self.roundtrip(&Request::Delete { key: key.to_vec() })?;
        decode_delete_status(&payload)
    }

    /// Set many pairs as one atomic batch.
    pub fn bulk_set(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let payload = self.roundtrip(&Request::BulkSet {
            pairs: pairs.to_vec(),
        })?;
        decode_status(&payload)
    }

    /// Full-text search. Results are in ascending key order.
    pub fn search(&mut self, query: &str, mode: SearchMode) -> Result<Vec<Vec<u8>>> {
        let payload = self.roundtrip(&Request::Search {
            mode,
            query: query.to_string(),
        })?;
        decode_keys(&payload)
    }

    /// Similarity search. Results are in descending score order.
    pub fn search_semantic(
        &mut self,
        query: &str,
        k: u32,
        threshold: f32,
    ) -> Result<Vec<(Vec<u8>, f32)>> {
        let payload = self.roundtrip(&Request::SemSearch {
            k,
            threshold,
            query: query.to_string(),
        })?;
        decode_scored(&payload)
    }

    fn roundtrip(&mut self, request: &Request) -> Result<Vec<u8>> {
        write_frame(&mut self.stream, &encode_request(request))?;
        read_frame(&mut self.reader)?
            .ok_or_else(|| QuartzError::Network("connection closed by server".to_string()))
    }
}

// =============================================================================
// Response decoding
// =============================================================================

fn status_error(code: StatusCode, leader_hint: Option<String>) -> QuartzError {
    match code {
        StatusCode::Ok => QuartzError::Protocol("OK status treated as error".to_string()),
        StatusCode::NotPrimary => QuartzError::NotPrimary {
            leader: leader_hint,
        },
        StatusCode::IoError => QuartzError::Network("server reported IO error".to_string()),
        StatusCode::Malformed => {
            QuartzError::Protocol("server reported malformed request".to_string())
        }
    }
}

fn parse_code(payload: &[u8], pos: &mut usize) -> Result<StatusCode> {
    let raw = take_u8(payload, pos)?;
    StatusCode::from_u8(raw)
        .ok_or_else(|| QuartzError::Protocol(format!("unknown status code {}", raw)))
}

fn parse_hint(payload: &[u8], pos: &mut usize) -> Result<Option<String>> {
    if *pos >= payload.len() {
        return Ok(None);
    }
    let bytes = take_bytes(payload, pos)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| QuartzError::Protocol("invalid UTF-8 in leader hint".to_string()))
}

fn decode_status(payload: &[u8]) -> Result<()> {
    let mut pos = 0;
    let code = parse_code(payload, &mut pos)?;
    if code == StatusCode::Ok {
        return Ok(());
    }
    let hint = parse_hint(payload, &mut pos)?;
    Err(status_error(code, hint))
}

fn decode_delete_status(payload: &[u8]) -> Result<bool> {
    let mut pos = 0;
    let code = parse_code(payload, &mut pos)?;
    if code == StatusCode::Ok {
        let existed = take_u8(payload, &mut pos)? != 0;
        return Ok(existed);
    }
    // Skip the existed flag if the server included one.
    if code == StatusCode::NotPrimary && payload.len() > 1 {
        let _ = take_u8(payload, &mut pos)?;
    }
    let hint = parse_hint(payload, &mut pos)?;
    Err(status_error(code, hint))
}

fn decode_value(payload: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut pos = 0;
    match take_u8(payload, &mut pos)? {
        0 => Ok(None),
        1 => Ok(Some(take_bytes(payload, &mut pos)?)),
        code => {
            let code = StatusCode::from_u8(code)
                .ok_or_else(|| QuartzError::Protocol(format!("bad value header {}", code)))?;
            Err(status_error(code, None))
        }
    }
}

fn decode_keys(payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    // A one-byte frame is an error status standing in for the key list.
    if payload.len() == 1 {
        let mut pos = 0;
        let code = parse_code(payload, &mut pos)?;
        return Err(status_error(code, None));
    }

    let mut pos = 0;
    let count = take_u32(payload, &mut pos)? as usize;
    let mut keys = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        keys.push(take_bytes(payload, &mut pos)?);
    }
    Ok(keys)
}

fn decode_scored(payload: &[u8]) -> Result<Vec<(Vec<u8>, f32)>> {
    if payload.len() == 1 {
        let mut pos = 0;
        let code = parse_code(payload, &mut pos)?;
        return Err(status_error(code, None));
    }

    let mut pos = 0;
    let count = take_u32(payload, &mut pos)? as usize;
    let mut hits = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let key = take_bytes(payload, &mut pos)?;
        let score = take_f32(payload, &mut pos)?;
        hits.push((key, score));
    }
    Ok(hits)
}
