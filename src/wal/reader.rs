//! WAL Reader
//!
//! Sequentially reads records from a WAL file, verifying framing and
//! checksums. The reader stops at the first malformed record and reports
//! the byte offset of the valid prefix so recovery can truncate the tail.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{QuartzError, Result};

use super::entry::MAX_RECORD_SIZE;
use super::WalEntry;

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Byte offset of the end of the last well-formed record
    valid_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(WalReader {
            reader: BufReader::new(file),
            valid_len: 0,
        })
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file. A torn or corrupt
    /// record yields `Err(WalCorruption)`; `valid_len()` then reports
    /// how much of the file precedes the damage.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut len_buf = [0u8; 4];
        match read_exact_or_eof(&mut self.reader, &mut len_buf)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial => {
                return Err(QuartzError::WalCorruption(
                    "torn record length prefix at tail".into(),
                ))
            }
            ReadOutcome::Full => {}
        }

        let body_len = u32::from_be_bytes(len_buf);
        if body_len < 9 || body_len > MAX_RECORD_SIZE {
            return Err(QuartzError::WalCorruption(format!(
                "implausible record length {}",
                body_len
            )));
        }

        let mut body = vec![0u8; body_len as usize + 4];
        match read_exact_or_eof(&mut self.reader, &mut body)? {
            ReadOutcome::Full => {}
            _ => {
                return Err(QuartzError::WalCorruption(
                    "torn record body at tail".into(),
                ))
            }
        }

        let (body, crc_bytes) = body.split_at(body_len as usize);
        let stored_crc = u32::from_be_bytes(crc_bytes.try_into().unwrap());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(QuartzError::WalCorruption(format!(
                "checksum mismatch at offset {}",
                self.valid_len
            )));
        }

        let entry = WalEntry::decode_body(body)?;
        self.valid_len += 4 + body_len as u64 + 4;
        Ok(Some(entry))
    }

    /// Byte length of the well-formed record prefix read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }
}

impl Iterator for WalReader {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

enum ReadOutcome {
    Full,
    Partial,
    Eof,
}

/// Like `read_exact`, but distinguishes a clean EOF (no bytes read) from
/// a torn tail (some bytes read, then EOF).
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Partial
                })
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ReadOutcome::Full)
}
