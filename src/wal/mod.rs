//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any mutation
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering and replication
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Entry 1                                          │
//! │ ┌─────────┬─────────┬─────────┬─────────┬──────┐ │
//! │ │ Len (4) │ Seq (8) │ Kind(1) │ Payload │CRC(4)│ │
//! │ └─────────┴─────────┴─────────┴─────────┴──────┘ │
//! ├──────────────────────────────────────────────────┤
//! │ Entry 2                                          │
//! │ ┌─────────┬─────────┬─────────┬─────────┬──────┐ │
//! │ │ Len (4) │ Seq (8) │ Kind(1) │ Payload │CRC(4)│ │
//! │ └─────────┴─────────┴─────────┴─────────┴──────┘ │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. `Len` counts seq + kind + payload. The
//! CRC covers seq, kind, and payload. Sequence numbers start at 1 and
//! are strictly increasing and contiguous; a gap means corruption.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{Operation, WalEntry, RECORD_HEADER_SIZE};
pub use reader::WalReader;
pub use recovery::{recover, RecoveryResult};
pub use writer::WalWriter;
