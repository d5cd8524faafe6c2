//! Store Module
//!
//! The in-memory authoritative key-value state.
//!
//! ## Responsibilities
//! - Fast point lookups
//! - Apply single, delete, and bulk mutations
//! - Track approximate size for stats
//! - Ordered iteration for checkpoint snapshots
//!
//! ## Data Structure Choice
//! BTreeMap keeps keys ordered, which gives deterministic snapshot and
//! search-result ordering for free. Locking lives in the engine (one
//! writer gate, shared reader lock over store + indexes), so the table
//! itself is a plain data structure.

mod table;

pub use table::Table;
