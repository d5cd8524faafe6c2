//! Snapshot Module
//!
//! Checkpoint snapshots of the full store state.
//!
//! ## Responsibilities
//! - Persist the complete key-value state atomically
//! - Record the sequence number the snapshot incorporates
//! - Detect corruption on load via CRC32
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌─────────┬──────────┬───────┬───────┐ │
//! │ │Magic (4)│Version(2)│Seq (8)│Count(8)│ │
//! │ └─────────┴──────────┴───────┴───────┘ │
//! ├────────────────────────────────────────┤
//! │ Data Block                             │
//! │ ┌────────┬────────┬─────┬───────────┐ │
//! │ │KeyLen  │ValLen  │ Key │   Value   │ │
//! │ └────────┴────────┴─────┴───────────┘ │
//! │ ... (repeated for each entry)         │
//! ├────────────────────────────────────────┤
//! │ Footer                                 │
//! │ ┌─────────────────┐                    │
//! │ │     CRC32       │                    │
//! │ └─────────────────┘                    │
//! └────────────────────────────────────────┘
//! ```
//!
//! The file is written to `<path>.tmp` and atomically renamed into
//! place, so a crash mid-checkpoint leaves the previous snapshot intact.

mod reader;
mod writer;

pub use reader::load_snapshot;
pub use writer::write_snapshot;

/// Magic bytes identifying a QuartzKV snapshot
pub const MAGIC: &[u8; 4] = b"QKVS";

/// Current snapshot format version
pub const VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + checkpoint_seq (8) + count (8)
pub const HEADER_SIZE: u64 = 22;

/// Footer size: crc32 (4)
pub const FOOTER_SIZE: u64 = 4;

/// A loaded snapshot
#[derive(Debug)]
pub struct Snapshot {
    /// Sequence number of the last WAL entry the snapshot incorporates
    pub checkpoint_seq: u64,

    /// All key-value pairs, in key order
    pub pairs: Vec<(Vec<u8>, Vec<u8>)>,
}
