//! WAL Writer
//!
//! Handles appending entries to the WAL file. Every append is fsynced
//! before it returns; an entry that was not synced was not acknowledged.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    file: File,

    path: PathBuf,

    /// Next sequence number to assign
    next_seq: u64,
}

impl WalWriter {
    /// Create a fresh WAL, truncating any existing file. Sequence numbers
    /// start at `next_seq` (1 for a brand-new node).
    pub fn create(path: &Path, next_seq: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(WalWriter {
            file,
            path: path.to_path_buf(),
            next_seq,
        })
    }

    /// Open the WAL for appending after recovery.
    ///
    /// `valid_len` is the byte length of the valid record prefix as
    /// determined by recovery; anything past it (a torn tail) is cut off
    /// here, before the first new append.
    pub fn open_append(path: &Path, next_seq: u64, valid_len: u64) -> Result<Self> {
        let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)?;

        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(WalWriter {
            file,
            path: path.to_path_buf(),
            next_seq,
        })
    }

    /// Append an operation, assigning the next sequence number.
    ///
    /// The record is fsynced before this returns.
    pub fn append(&mut self, op: Operation) -> Result<WalEntry> {
        let seq = self.next_seq;
        self.append_entry(WalEntry::new(seq, op))
    }

    /// Append an entry with an externally assigned sequence number
    /// (replication apply path). The seq must be the next expected one;
    /// the caller validates ordering before handing the entry over.
    pub fn append_entry(&mut self, entry: WalEntry) -> Result<WalEntry> {
        let record = entry.encode();
        self.file.write_all(&record)?;
        self.file.sync_all()?;
        self.next_seq = entry.seq + 1;
        Ok(entry)
    }

    /// Next sequence number to be assigned
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Discard all records and continue numbering from `next_seq`.
    ///
    /// Used after a checkpoint has made the current records redundant,
    /// and after installing a snapshot from the primary. Sequence
    /// numbers never reset; only the file contents do.
    pub fn reset(&mut self, next_seq: u64) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.next_seq = next_seq;
        Ok(())
    }

    /// Path of the underlying WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
