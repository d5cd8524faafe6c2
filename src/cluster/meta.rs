//! Node metadata persistence
//!
//! `(node_id, current_term, voted_for)` live in `meta.json`. The file is
//! rewritten and fsynced on every change, and always before a vote
//! response leaves the node, so a restart cannot double-vote in a term.

use std::fs::{self, File};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuartzError, Result};

/// Durable election state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeMeta {
    pub node_id: u32,
    pub current_term: u64,
    pub voted_for: Option<u32>,
}

impl NodeMeta {
    /// Load metadata, or initialize it for a brand-new node.
    pub fn load_or_init(path: &Path, node_id: u32) -> Result<Self> {
        if !path.exists() {
            let meta = NodeMeta {
                node_id,
                current_term: 0,
                voted_for: None,
            };
            meta.persist(path)?;
            return Ok(meta);
        }

        let raw = fs::read(path)?;
        let meta: NodeMeta = serde_json::from_slice(&raw)
            .map_err(|e| QuartzError::Serialization(format!("meta.json: {}", e)))?;

        if meta.node_id != node_id {
            return Err(QuartzError::Config(format!(
                "data dir belongs to node {}, configured as node {}",
                meta.node_id, node_id
            )));
        }

        Ok(meta)
    }

    /// Write and fsync the metadata via a temporary file and rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self)
            .map_err(|e| QuartzError::Serialization(format!("meta.json: {}", e)))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &raw)?;
        File::open(&tmp_path)?.sync_all()?;
        fs::rename(&tmp_path, path)?;
        if let Some(dir) = path.parent() {
            if let Ok(dir_handle) = File::open(dir) {
                let _ = dir_handle.sync_all();
            }
        }
        Ok(())
    }
}
