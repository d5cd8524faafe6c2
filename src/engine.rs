//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, store, indexes, and checkpoint snapshots
//! - Serialize every mutation through a single write gate
//! - Guarantee fsync-before-acknowledge durability
//! - Manage crash recovery on startup
//!
//! ## Locking
//! The WAL mutex *is* the write gate: it is held across the WAL append,
//! the fsync, and the in-memory apply, so acknowledged mutations are
//! durable and no reader ever observes a partial batch. The store and
//! both indexes live behind one RwLock, which keeps them mutually
//! consistent at every observable point. Nothing holds either lock
//! across a network send.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{QuartzError, Result};
use crate::index::{IndexManager, IndexStats, SearchMode};
use crate::snapshot::{load_snapshot, write_snapshot};
use crate::store::Table;
use crate::wal::{recover, Operation, WalEntry, WalWriter};

/// Store and indexes behind one lock, so readers always see them agree.
struct EngineState {
    table: Table,
    indexes: IndexManager,
}

/// Engine statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub keys: usize,
    pub bytes: usize,
    pub last_applied_seq: u64,
    pub degraded: bool,
    pub index: IndexStats,
}

/// The main storage engine
pub struct Engine {
    /// Write gate; held across append + fsync + apply
    wal: Mutex<WalWriter>,

    state: RwLock<EngineState>,

    /// Sequence number of the last applied entry
    last_applied: AtomicU64,

    /// Set when an fsync fails; the engine refuses writes until restart
    degraded: AtomicBool,

    snapshot_path: PathBuf,
}

impl Engine {
    /// Open or recover an engine from the configured data directory.
    ///
    /// Recovery order: load the snapshot, replay the WAL from
    /// `checkpoint_seq + 1` (stopping at the first damaged or gapped
    /// record), truncate the damaged tail, then rebuild both indexes
    /// from the recovered state.
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let snapshot_path = config.snapshot_path();
        let wal_path = config.wal_path();

        let snapshot = load_snapshot(&snapshot_path)?;
        let checkpoint_seq = snapshot.as_ref().map_or(0, |s| s.checkpoint_seq);

        let mut table = Table::new();
        if let Some(snap) = snapshot {
            tracing::info!(
                entries = snap.pairs.len(),
                checkpoint_seq,
                "loaded checkpoint snapshot"
            );
            for (key, value) in snap.pairs {
                table.insert(key, value);
            }
        }

        let recovery = recover(&wal_path, checkpoint_seq)?;
        let replayed = recovery.entries.len();
        for entry in recovery.entries {
            Self::apply_op_to_table(&mut table, &entry.op);
        }
        if recovery.tail_truncated {
            tracing::warn!(
                valid_len = recovery.valid_len,
                "WAL tail damaged; truncating on reopen"
            );
        }
        tracing::info!(
            replayed,
            last_seq = recovery.last_seq,
            keys = table.len(),
            "recovery complete"
        );

        let wal = WalWriter::open_append(&wal_path, recovery.last_seq + 1, recovery.valid_len)?;

        // Indexes are rebuilt from the recovered store before the node
        // starts serving.
        let mut indexes = IndexManager::new(config.ngram_size);
        indexes.rebuild(table.iter());

        Ok(Engine {
            wal: Mutex::new(wal),
            state: RwLock::new(EngineState { table, indexes }),
            last_applied: AtomicU64::new(recovery.last_seq),
            degraded: AtomicBool::new(false),
            snapshot_path,
        })
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get a value by key. Never touches the WAL.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.read().table.get(key).cloned()
    }

    /// Full-text search over indexed values.
    pub fn search_text(&self, query: &str, mode: SearchMode) -> Vec<Vec<u8>> {
        self.state.read().indexes.search_text(query, mode)
    }

    /// N-gram similarity search.
    pub fn search_semantic(&self, query: &str, k: usize, threshold: f32) -> Vec<(Vec<u8>, f32)> {
        self.state.read().indexes.search_semantic(query, k, threshold)
    }

    /// Sequence number of the last applied entry.
    pub fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::SeqCst)
    }

    /// Whether the engine has entered read-only degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            keys: state.table.len(),
            bytes: state.table.byte_size(),
            last_applied_seq: self.last_applied(),
            degraded: self.is_degraded(),
            index: state.indexes.stats(),
        }
    }

    /// Consistent copy of the full store plus the seq it reflects
    /// (snapshot resync path). Takes the write gate briefly so the pair
    /// is coherent.
    pub fn snapshot_pairs(&self) -> (u64, Vec<(Vec<u8>, Vec<u8>)>) {
        let _gate = self.wal.lock();
        let seq = self.last_applied();
        let pairs = self.state.read().table.snapshot();
        (seq, pairs)
    }

    // -------------------------------------------------------------------------
    // Mutations (primary path: seq assigned locally)
    // -------------------------------------------------------------------------

    /// Set a key-value pair. Returns the WAL entry for replication.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<WalEntry> {
        self.check_writable()?;
        let mut wal = self.wal.lock();
        let entry = self.append_guarded(&mut wal, Operation::Set { key, value })?;
        self.apply_entry_locked(&entry);
        Ok(entry)
    }

    /// Delete a key. The WAL entry is written even when the key is
    /// absent, so followers observe the intent; `existed` is reported to
    /// the client but does not affect durability.
    pub fn delete(&self, key: Vec<u8>) -> Result<(WalEntry, bool)> {
        self.check_writable()?;
        let mut wal = self.wal.lock();
        let entry = self.append_guarded(&mut wal, Operation::Delete { key })?;

        let existed = {
            let mut state = self.state.write();
            let Operation::Delete { key } = &entry.op else {
                unreachable!()
            };
            let existed = state.table.remove(key).is_some();
            if existed {
                state.indexes.on_delete(key);
            }
            existed
        };
        self.last_applied.store(entry.seq, Ordering::SeqCst);
        Ok((entry, existed))
    }

    /// Apply a batch of pairs as one atomic mutation: a single WAL entry
    /// and a single in-memory apply. Readers see all of it or none.
    pub fn bulk_set(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<WalEntry> {
        self.check_writable()?;
        let mut wal = self.wal.lock();
        let entry = self.append_guarded(&mut wal, Operation::BulkSet { pairs })?;
        self.apply_entry_locked(&entry);
        Ok(entry)
    }

    /// Checkpoint: append a CHECKPOINT marker, snapshot the store, and
    /// reset the WAL. The marker consumes a sequence number and is
    /// replicated, so followers checkpoint at the same point in the log.
    pub fn checkpoint(&self) -> Result<WalEntry> {
        self.check_writable()?;
        let mut wal = self.wal.lock();
        let checkpoint_seq = wal.next_seq() - 1;
        let marker = self.append_guarded(&mut wal, Operation::Checkpoint { checkpoint_seq })?;
        self.last_applied.store(marker.seq, Ordering::SeqCst);

        let pairs = self.state.read().table.snapshot();
        write_snapshot(&self.snapshot_path, marker.seq, &pairs)?;
        wal.reset(marker.seq + 1)?;

        tracing::info!(checkpoint_seq = marker.seq, keys = pairs.len(), "checkpoint complete");
        Ok(marker)
    }

    /// Snapshot the store and reset the WAL without a marker entry.
    /// Used on shutdown (any role), where consuming a sequence number
    /// would diverge a follower's log from the primary's.
    pub fn checkpoint_local(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        let seq = wal.next_seq() - 1;
        let pairs = self.state.read().table.snapshot();
        write_snapshot(&self.snapshot_path, seq, &pairs)?;
        wal.reset(seq + 1)?;
        tracing::info!(checkpoint_seq = seq, keys = pairs.len(), "local checkpoint complete");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mutations (follower path: seq assigned by the primary)
    // -------------------------------------------------------------------------

    /// Apply an entry shipped from the primary. The entry must be the
    /// next expected one; anything else reports `ReplicationLag`, which
    /// makes the primary fall back to a snapshot resync.
    pub fn apply_replicated(&self, entry: WalEntry) -> Result<()> {
        self.check_writable()?;
        let mut wal = self.wal.lock();

        let expected = wal.next_seq();
        if entry.seq != expected {
            return Err(QuartzError::ReplicationLag {
                expected,
                got: entry.seq,
            });
        }

        if let Operation::Checkpoint { .. } = entry.op {
            // Mirror the primary's checkpoint at the same log position.
            let marker = self.append_entry_guarded(&mut wal, entry)?;
            self.last_applied.store(marker.seq, Ordering::SeqCst);
            let pairs = self.state.read().table.snapshot();
            write_snapshot(&self.snapshot_path, marker.seq, &pairs)?;
            wal.reset(marker.seq + 1)?;
            return Ok(());
        }

        let entry = self.append_entry_guarded(&mut wal, entry)?;
        self.apply_entry_locked(&entry);
        Ok(())
    }

    /// Replace the entire store with a snapshot streamed from the
    /// primary, persist it, rebuild the indexes, and resume the log at
    /// `checkpoint_seq + 1`.
    pub fn install_snapshot(
        &self,
        checkpoint_seq: u64,
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<()> {
        let mut wal = self.wal.lock();

        write_snapshot(&self.snapshot_path, checkpoint_seq, &pairs)?;

        {
            let mut state = self.state.write();
            state.table.replace_all(pairs);
            let EngineState { table, indexes } = &mut *state;
            indexes.rebuild(table.iter());
        }

        wal.reset(checkpoint_seq + 1)?;
        self.last_applied.store(checkpoint_seq, Ordering::SeqCst);

        tracing::info!(checkpoint_seq, "snapshot installed from primary");
        Ok(())
    }

    /// Final checkpoint and shutdown.
    pub fn close(&self) -> Result<()> {
        if self.is_degraded() {
            tracing::warn!("skipping shutdown checkpoint: engine is degraded");
            return Ok(());
        }
        self.checkpoint_local()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn check_writable(&self) -> Result<()> {
        if self.is_degraded() {
            return Err(QuartzError::Degraded);
        }
        Ok(())
    }

    /// Append with degraded-mode entry on failure: if the write or the
    /// fsync fails the mutation is not applied and the engine refuses
    /// all further writes until restart.
    fn append_guarded(&self, wal: &mut WalWriter, op: Operation) -> Result<WalEntry> {
        match wal.append(op) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.enter_degraded(&e);
                Err(e)
            }
        }
    }

    fn append_entry_guarded(&self, wal: &mut WalWriter, entry: WalEntry) -> Result<WalEntry> {
        match wal.append_entry(entry) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.enter_degraded(&e);
                Err(e)
            }
        }
    }

    fn enter_degraded(&self, cause: &QuartzError) {
        self.degraded.store(true, Ordering::SeqCst);
        tracing::error!(error = %cause, "WAL append failed; entering read-only degraded mode");
    }

    /// Apply an entry to store and indexes in one critical section.
    /// Caller holds the write gate.
    fn apply_entry_locked(&self, entry: &WalEntry) {
        let mut state = self.state.write();
        let EngineState { table, indexes } = &mut *state;
        match &entry.op {
            Operation::Set { key, value } => {
                table.insert(key.clone(), value.clone());
                indexes.on_set(key, value);
            }
            Operation::BulkSet { pairs } => {
                for (key, value) in pairs {
                    table.insert(key.clone(), value.clone());
                    indexes.on_set(key, value);
                }
            }
            Operation::Delete { key } => {
                if table.remove(key).is_some() {
                    indexes.on_delete(key);
                }
            }
            Operation::Checkpoint { .. } => {}
        }
        drop(state);
        self.last_applied.store(entry.seq, Ordering::SeqCst);
    }

    /// Recovery-time apply: table only, indexes are rebuilt afterwards.
    fn apply_op_to_table(table: &mut Table, op: &Operation) {
        match op {
            Operation::Set { key, value } => {
                table.insert(key.clone(), value.clone());
            }
            Operation::Delete { key } => {
                table.remove(key);
            }
            Operation::BulkSet { pairs } => {
                for (key, value) in pairs {
                    table.insert(key.clone(), value.clone());
                }
            }
            Operation::Checkpoint { .. } => {}
        }
    }
}
