//! Snapshot Reader
//!
//! Loads and validates a checkpoint snapshot.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{QuartzError, Result};

use super::{Snapshot, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Load the snapshot at `path`.
///
/// Returns `Ok(None)` when no snapshot file exists (a brand-new node).
/// A snapshot that exists but fails validation is an error: the WAL was
/// truncated against it, so the store cannot be rebuilt without it.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    if file_size < HEADER_SIZE + FOOTER_SIZE {
        return Err(QuartzError::Snapshot(format!(
            "snapshot too small: {} bytes",
            file_size
        )));
    }

    let mut reader = BufReader::new(file);

    // Read and validate header
    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;

    if &header[0..4] != MAGIC {
        return Err(QuartzError::Snapshot(format!(
            "invalid snapshot magic: {:?}",
            &header[0..4]
        )));
    }

    let version = u16::from_be_bytes(header[4..6].try_into().unwrap());
    if version != VERSION {
        return Err(QuartzError::Snapshot(format!(
            "unsupported snapshot version: {}",
            version
        )));
    }

    let checkpoint_seq = u64::from_be_bytes(header[6..14].try_into().unwrap());
    let entry_count = u64::from_be_bytes(header[14..22].try_into().unwrap());

    // Read the data block and verify the footer CRC
    let data_len = file_size - HEADER_SIZE - FOOTER_SIZE;
    let mut data = vec![0u8; data_len as usize];
    reader.read_exact(&mut data)?;

    let mut footer = [0u8; FOOTER_SIZE as usize];
    reader.read_exact(&mut footer)?;
    let stored_crc = u32::from_be_bytes(footer);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    if hasher.finalize() != stored_crc {
        return Err(QuartzError::Snapshot(
            "snapshot checksum mismatch".to_string(),
        ));
    }

    // Parse entries: [key_len(4)][val_len(4)][key][value]
    let mut pairs = Vec::with_capacity(entry_count.min(1 << 20) as usize);
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + 8 > data.len() {
            return Err(QuartzError::Snapshot("truncated entry header".to_string()));
        }
        let key_len = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
        let val_len = u32::from_be_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;

        if pos + key_len + val_len > data.len() {
            return Err(QuartzError::Snapshot("truncated entry body".to_string()));
        }
        let key = data[pos..pos + key_len].to_vec();
        pos += key_len;
        let value = data[pos..pos + val_len].to_vec();
        pos += val_len;

        pairs.push((key, value));
    }

    if pairs.len() as u64 != entry_count {
        return Err(QuartzError::Snapshot(format!(
            "entry count mismatch: header says {}, found {}",
            entry_count,
            pairs.len()
        )));
    }

    tracing::debug!(
        path = %path.display(),
        checkpoint_seq,
        entries = pairs.len(),
        "snapshot loaded"
    );

    Ok(Some(Snapshot {
        checkpoint_seq,
        pairs,
    }))
}
