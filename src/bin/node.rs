//! QuartzKV Node Binary
//!
//! Starts one cluster node (or a standalone instance when no peers are
//! configured).
//!
//! Exit codes: 0 clean shutdown, 1 configuration error, 2 fatal I/O
//! error during recovery.

use std::time::Duration;

use clap::Parser;
use quartzkv::{Config, Node, QuartzError};
use tracing_subscriber::{fmt, EnvFilter};

/// QuartzKV Node
#[derive(Parser, Debug)]
#[command(name = "quartzkv-node")]
#[command(about = "Replicated durable key-value store node")]
#[command(version)]
struct Args {
    /// Unique node ID within the cluster
    #[arg(long)]
    node_id: u32,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (clients and cluster peers)
    #[arg(long)]
    port: u16,

    /// Comma-separated peer addresses (host:port), excluding this node
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Data directory
    #[arg(long)]
    data_dir: String,

    /// Start as the initial primary
    #[arg(long)]
    primary: bool,

    /// Seconds between automatic checkpoints (0 disables)
    #[arg(long, default_value = "60")]
    checkpoint_interval_secs: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,quartzkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    for peer in &args.peers {
        if !peer.contains(':') {
            tracing::error!(peer = %peer, "peer address must be host:port");
            std::process::exit(1);
        }
    }

    let checkpoint_interval = match args.checkpoint_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let config = Config::builder()
        .node_id(args.node_id)
        .listen_addr(format!("{}:{}", args.host, args.port))
        .peers(args.peers)
        .data_dir(&args.data_dir)
        .start_as_primary(args.primary)
        .checkpoint_interval(checkpoint_interval)
        .build();

    tracing::info!("QuartzKV node v{}", quartzkv::VERSION);
    tracing::info!(node_id = config.node_id, addr = %config.listen_addr, "starting");

    let node = match Node::new(config) {
        Ok(node) => node,
        Err(e @ (QuartzError::Config(_) | QuartzError::Serialization(_))) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal I/O error during recovery");
            std::process::exit(2);
        }
    };

    if let Err(e) = node.start() {
        tracing::error!(error = %e, "failed to start node");
        std::process::exit(1);
    }

    // Park until the process is told to stop.
    loop {
        std::thread::sleep(Duration::from_secs(1));
        if node.is_shutdown() {
            break;
        }
    }
}
