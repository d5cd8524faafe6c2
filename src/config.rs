//! Configuration for QuartzKV
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a QuartzKV node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Identity & Cluster Configuration
    // -------------------------------------------------------------------------
    /// Unique node identifier within the cluster
    pub node_id: u32,

    /// Static list of peer addresses (host:port), excluding this node
    pub peers: Vec<String>,

    /// Start in the PRIMARY role (term 1) instead of waiting for a leader
    pub start_as_primary: bool,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for all data files (wal.log, checkpoint.snap, meta.json)
    pub data_dir: PathBuf,

    /// Interval between automatic checkpoints on the primary; None disables
    pub checkpoint_interval: Option<Duration>,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Character n-gram size for the similarity index
    pub ngram_size: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address (serves both clients and cluster peers)
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Replication & Election Configuration
    // -------------------------------------------------------------------------
    /// Heartbeat interval on the primary
    pub heartbeat_interval: Duration,

    /// Base election timeout on followers (jittered ±20% per node)
    pub election_timeout: Duration,

    /// Timeout for a single peer RPC (connect + round trip)
    pub peer_timeout: Duration,

    /// Backoff between reconnect attempts to an unreachable follower
    pub replication_backoff: Duration,

    /// Bounded depth of each per-follower replication queue; overflow
    /// forces the follower into a snapshot resync
    pub replication_queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: 0,
            peers: Vec::new(),
            start_as_primary: false,
            data_dir: PathBuf::from("./quartzkv_data"),
            checkpoint_interval: Some(Duration::from_secs(60)),
            ngram_size: 3,
            listen_addr: "127.0.0.1:7420".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            heartbeat_interval: Duration::from_millis(100),
            election_timeout: Duration::from_millis(500),
            peer_timeout: Duration::from_millis(1000),
            replication_backoff: Duration::from_millis(200),
            replication_queue_depth: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Path to the WAL file under the data directory
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    /// Path to the checkpoint snapshot under the data directory
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint.snap")
    }

    /// Path to the node metadata file under the data directory
    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }

    /// Total number of nodes in the configured cluster (peers + self)
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn node_id(mut self, id: u32) -> Self {
        self.config.node_id = id;
        self
    }

    pub fn peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_as_primary(mut self, primary: bool) -> Self {
        self.config.start_as_primary = primary;
        self
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn checkpoint_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.checkpoint_interval = interval;
        self
    }

    pub fn ngram_size(mut self, n: usize) -> Self {
        self.config.ngram_size = n;
        self
    }

    pub fn listen_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn election_timeout(mut self, timeout: Duration) -> Self {
        self.config.election_timeout = timeout;
        self
    }

    pub fn peer_timeout(mut self, timeout: Duration) -> Self {
        self.config.peer_timeout = timeout;
        self
    }

    pub fn replication_backoff(mut self, backoff: Duration) -> Self {
        self.config.replication_backoff = backoff;
        self
    }

    pub fn replication_queue_depth(mut self, depth: usize) -> Self {
        self.config.replication_queue_depth = depth;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
