//! WAL Recovery
//!
//! Replays the WAL after a crash, validating checksums and sequence
//! contiguity. Scanning stops at the first damaged or out-of-order
//! record; everything before it is kept, the tail is truncated by the
//! writer on reopen.

use std::path::Path;

use crate::error::Result;

use super::{WalEntry, WalReader};

/// Result of a recovery scan
#[derive(Debug)]
pub struct RecoveryResult {
    /// Entries to apply, in order, all with `seq > checkpoint_seq`
    pub entries: Vec<WalEntry>,

    /// Highest sequence number recovered (the checkpoint seq if the WAL
    /// held nothing newer)
    pub last_seq: u64,

    /// Byte length of the valid record prefix; the writer truncates the
    /// file to this length before appending
    pub valid_len: u64,

    /// Whether a damaged tail was found (and will be truncated)
    pub tail_truncated: bool,
}

/// Scan the WAL at `path`, returning the entries to replay on top of a
/// snapshot taken at `checkpoint_seq`.
///
/// Records with `seq <= checkpoint_seq` are already incorporated in the
/// snapshot and are skipped (this happens when a crash lands between
/// snapshot rename and WAL reset). Contiguity is enforced across all
/// records in the file, applied or skipped.
pub fn recover(path: &Path, checkpoint_seq: u64) -> Result<RecoveryResult> {
    if !path.exists() {
        return Ok(RecoveryResult {
            entries: Vec::new(),
            last_seq: checkpoint_seq,
            valid_len: 0,
            tail_truncated: false,
        });
    }

    let mut reader = WalReader::open(path)?;
    let mut entries = Vec::new();
    let mut last_seq = checkpoint_seq;
    let mut prev_seq: Option<u64> = None;
    let mut tail_truncated = false;
    let mut valid_len = 0u64;

    loop {
        match reader.next_entry() {
            Ok(Some(entry)) => {
                if let Some(prev) = prev_seq {
                    if entry.seq != prev + 1 {
                        tracing::warn!(
                            expected = prev + 1,
                            got = entry.seq,
                            "sequence gap in WAL, discarding tail"
                        );
                        tail_truncated = true;
                        break;
                    }
                } else if entry.seq > checkpoint_seq + 1 {
                    // The file starts past the snapshot; nothing bridges
                    // the gap, so nothing after it can be trusted.
                    tracing::warn!(
                        checkpoint_seq,
                        first_seq = entry.seq,
                        "WAL starts past checkpoint, discarding tail"
                    );
                    tail_truncated = true;
                    break;
                }
                prev_seq = Some(entry.seq);
                valid_len = reader.valid_len();

                if entry.seq > checkpoint_seq {
                    last_seq = entry.seq;
                    entries.push(entry);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "damaged WAL tail, truncating");
                tail_truncated = true;
                break;
            }
        }
    }

    Ok(RecoveryResult {
        entries,
        last_seq,
        valid_len,
        tail_truncated,
    })
}
