//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Framing
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │         Payload             │
//! └──────────┴─────────────────────────────┘
//! ```
//! All integers are big-endian. Request payloads start with a tag byte:
//!
//! | Tag  | Request  | Response |
//! |------|----------|----------|
//! | 0x01 | SET      | STATUS   |
//! | 0x02 | GET      | VALUE    |
//! | 0x03 | DELETE   | STATUS + existed |
//! | 0x04 | BULKSET  | STATUS   |
//! | 0x05 | SEARCH   | KEYLIST  |
//! | 0x06 | SEMSEARCH| SCOREDLIST |
//!
//! Tags `0x80` and above are cluster peer messages (see the cluster
//! module). Status codes: 0 OK, 1 NOT_PRIMARY (with leader hint in the
//! same frame), 2 IO_ERROR, 3 MALFORMED.

mod codec;
mod request;
mod response;

pub use codec::{
    decode_request, encode_request, read_frame, write_frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use request::Request;
pub use response::{Response, StatusCode};

pub(crate) use codec::{take_bytes, take_f32, take_u32, take_u64, take_u8};
