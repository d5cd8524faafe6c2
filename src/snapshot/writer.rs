//! Snapshot Writer
//!
//! Writes a complete store snapshot to a temporary file, fsyncs it, and
//! renames it into place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

use super::{MAGIC, VERSION};

/// Write a snapshot of `pairs` (key order) incorporating all WAL entries
/// up to `checkpoint_seq`, replacing whatever snapshot `path` held.
pub fn write_snapshot(
    path: &Path,
    checkpoint_seq: u64,
    pairs: &[(Vec<u8>, Vec<u8>)],
) -> Result<()> {
    let tmp_path = path.with_extension("snap.tmp");

    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        // Header
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_be_bytes())?;
        writer.write_all(&checkpoint_seq.to_be_bytes())?;
        writer.write_all(&(pairs.len() as u64).to_be_bytes())?;

        // Data block, with a running CRC over everything in it
        let mut hasher = crc32fast::Hasher::new();
        for (key, value) in pairs {
            let key_len = (key.len() as u32).to_be_bytes();
            let val_len = (value.len() as u32).to_be_bytes();

            writer.write_all(&key_len)?;
            writer.write_all(&val_len)?;
            writer.write_all(key)?;
            writer.write_all(value)?;

            hasher.update(&key_len);
            hasher.update(&val_len);
            hasher.update(key);
            hasher.update(value);
        }

        // Footer
        writer.write_all(&hasher.finalize().to_be_bytes())?;

        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    // Make the rename itself durable.
    if let Some(dir) = path.parent() {
        if let Ok(dir_handle) = File::open(dir) {
            let _ = dir_handle.sync_all();
        }
    }

    tracing::debug!(
        path = %path.display(),
        checkpoint_seq,
        entries = pairs.len(),
        "snapshot written"
    );

    Ok(())
}
