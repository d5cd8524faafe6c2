//! # QuartzKV
//!
//! A replicated, durable key-value store with:
//! - Write-Ahead Logging (WAL) for durability
//! - Checkpoint snapshots and crash recovery with partial write handling
//! - Primary-directed replication with automatic failover
//! - Full-text (inverted index) and similarity (character n-gram) search
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │           (Clients + Cluster Peers, multiplexed)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Request Router                           │
//! │          (Primary-only writes / local reads)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │    Store    │
//!   │  (Append)   │          │  + Indexes  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Checkpoint │          │ Replication │
//!   │  (Snapshot) │          │ (Followers) │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod store;
pub mod snapshot;
pub mod index;
pub mod engine;
pub mod protocol;
pub mod cluster;
pub mod network;
pub mod node;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QuartzError, Result};
pub use config::Config;
pub use engine::Engine;
pub use node::Node;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of QuartzKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
