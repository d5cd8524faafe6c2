//! Response definitions
//!
//! Represents responses to clients.

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    NotPrimary = 1,
    IoError = 2,
    Malformed = 3,
}

impl StatusCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(StatusCode::Ok),
            1 => Some(StatusCode::NotPrimary),
            2 => Some(StatusCode::IoError),
            3 => Some(StatusCode::Malformed),
            _ => None,
        }
    }
}

/// A response to send to a client.
///
/// The payload layout depends on the request that produced it; clients
/// decode against the request they sent.
#[derive(Debug, Clone)]
pub enum Response {
    /// SET / BULKSET outcome; NOT_PRIMARY carries the leader hint
    Status {
        code: StatusCode,
        leader_hint: Option<String>,
    },

    /// DELETE outcome with the `existed` flag
    DeleteStatus {
        code: StatusCode,
        existed: bool,
        leader_hint: Option<String>,
    },

    /// GET result
    Value { value: Option<Vec<u8>> },

    /// SEARCH result, ascending key order
    Keys { keys: Vec<Vec<u8>> },

    /// SEMSEARCH result, descending score order
    Scored { hits: Vec<(Vec<u8>, f32)> },
}

impl Response {
    pub fn ok() -> Self {
        Response::Status {
            code: StatusCode::Ok,
            leader_hint: None,
        }
    }

    pub fn not_primary(leader_hint: Option<String>) -> Self {
        Response::Status {
            code: StatusCode::NotPrimary,
            leader_hint,
        }
    }

    pub fn io_error() -> Self {
        Response::Status {
            code: StatusCode::IoError,
            leader_hint: None,
        }
    }

    pub fn malformed() -> Self {
        Response::Status {
            code: StatusCode::Malformed,
            leader_hint: None,
        }
    }

    /// Encode the response payload (framing is added by `write_frame`).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Status { code, leader_hint } => {
                let mut buf = vec![*code as u8];
                encode_hint(&mut buf, *code, leader_hint);
                buf
            }
            Response::DeleteStatus {
                code,
                existed,
                leader_hint,
            } => {
                let mut buf = vec![*code as u8, u8::from(*existed)];
                encode_hint(&mut buf, *code, leader_hint);
                buf
            }
            Response::Value { value } => match value {
                Some(v) => {
                    let mut buf = Vec::with_capacity(5 + v.len());
                    buf.push(1);
                    buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
                    buf.extend_from_slice(v);
                    buf
                }
                None => vec![0],
            },
            Response::Keys { keys } => {
                let mut buf = Vec::new();
                buf.extend_from_slice(&(keys.len() as u32).to_be_bytes());
                for key in keys {
                    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
                    buf.extend_from_slice(key);
                }
                buf
            }
            Response::Scored { hits } => {
                let mut buf = Vec::new();
                buf.extend_from_slice(&(hits.len() as u32).to_be_bytes());
                for (key, score) in hits {
                    buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
                    buf.extend_from_slice(key);
                    buf.extend_from_slice(&score.to_be_bytes());
                }
                buf
            }
        }
    }
}

/// NOT_PRIMARY responses carry the last-known leader address in the
/// same frame: `hint_len:u32, hint`. A zero length means no known leader.
fn encode_hint(buf: &mut Vec<u8>, code: StatusCode, leader_hint: &Option<String>) {
    if code != StatusCode::NotPrimary {
        return;
    }
    match leader_hint {
        Some(hint) => {
            buf.extend_from_slice(&(hint.len() as u32).to_be_bytes());
            buf.extend_from_slice(hint.as_bytes());
        }
        None => buf.extend_from_slice(&0u32.to_be_bytes()),
    }
}
