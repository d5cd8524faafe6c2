//! Error types for QuartzKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using QuartzError
pub type Result<T> = std::result::Result<T, QuartzError>;

/// Unified error type for QuartzKV operations
#[derive(Debug, Error)]
pub enum QuartzError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Snapshot / Checkpoint Errors
    // -------------------------------------------------------------------------
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Cluster Errors
    // -------------------------------------------------------------------------
    /// Write routed to a node that is not the primary. Carries the
    /// last-known leader address so clients can redirect.
    #[error("not primary (leader hint: {leader:?})")]
    NotPrimary { leader: Option<String> },

    /// No leader is currently known.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    /// Replication entry arrived out of order; triggers a snapshot resync.
    #[error("replication lag: expected seq {expected}, got {got}")]
    ReplicationLag { expected: u64, got: u64 },

    // -------------------------------------------------------------------------
    // Degraded Mode
    // -------------------------------------------------------------------------
    /// An fsync failed mid-write; the node refuses writes until restart.
    #[error("node is in read-only degraded mode after an fsync failure")]
    Degraded,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
