//! TCP Server
//!
//! Accepts connections and dispatches to worker threads.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{QuartzError, Result};
use crate::node::Node;

use super::Connection;

/// Message sent to worker threads
enum WorkerMessage {
    /// New connection to handle (client or cluster peer)
    NewConnection(TcpStream),
    /// Signal to shutdown
    Shutdown,
}

/// Handle to a running server
///
/// ## Architecture
/// - The acceptor thread owns the listener
/// - A worker thread pool handles connection I/O
/// - All dispatch goes through the shared Node
pub struct ServerHandle {
    local_addr: SocketAddr,

    work_sender: Sender<WorkerMessage>,

    accept_handle: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,

    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Bind the listener, spawn the worker pool and the acceptor, and
    /// return a handle. Binding happens synchronously so callers can
    /// rely on the address being live when this returns.
    pub fn start(node: Arc<Node>) -> Result<ServerHandle> {
        let config = node.config().clone();

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            QuartzError::Network(format!("failed to bind to {}: {}", config.listen_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        // Non-blocking so the acceptor can notice shutdown.
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let active_connections = Arc::new(AtomicUsize::new(0));

        // Connections are held for their lifetime, and a node also
        // serves its peers' replication and heartbeat traffic, so the
        // pool must not shrink to a couple of threads on small hosts.
        let num_workers = num_cpus().max(8);
        let (sender, receiver) = bounded::<WorkerMessage>(config.max_connections);

        tracing::debug!(workers = num_workers, addr = %local_addr, "starting worker pool");

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let worker = Worker {
                id: worker_id,
                receiver: receiver.clone(),
                node: Arc::clone(&node),
                active_connections: Arc::clone(&active_connections),
                read_timeout_ms: config.read_timeout_ms,
                write_timeout_ms: config.write_timeout_ms,
            };
            let handle = thread::Builder::new()
                .name(format!("quartzkv-worker-{}", worker_id))
                .spawn(move || worker.run())
                .map_err(|e| QuartzError::Network(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }

        let accept_shutdown = Arc::clone(&shutdown);
        let accept_sender = sender.clone();
        let max_connections = config.max_connections;
        let accept_handle = thread::Builder::new()
            .name("quartzkv-acceptor".to_string())
            .spawn(move || {
                accept_loop(
                    listener,
                    accept_sender,
                    accept_shutdown,
                    active_connections,
                    max_connections,
                )
            })
            .map_err(|e| QuartzError::Network(format!("failed to spawn acceptor: {}", e)))?;

        Ok(ServerHandle {
            local_addr,
            work_sender: sender,
            accept_handle: Some(accept_handle),
            workers,
            shutdown,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drain the workers, and join all threads.
    pub fn stop(mut self) {
        tracing::info!("shutting down server");
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.accept_handle.take() {
            if handle.join().is_err() {
                tracing::error!("acceptor thread panicked");
            }
        }

        for _ in 0..self.workers.len() {
            let _ = self.work_sender.send(WorkerMessage::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        tracing::info!("server shutdown complete");
    }
}

/// Accept loop: hand each connection to the worker pool.
fn accept_loop(
    listener: TcpListener,
    sender: Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
    max_connections: usize,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let current = active_connections.load(Ordering::Relaxed);
                if current >= max_connections {
                    tracing::warn!(
                        current,
                        max_connections,
                        %addr,
                        "connection limit reached, rejecting"
                    );
                    drop(stream);
                    continue;
                }

                tracing::trace!(%addr, "accepted connection");
                if let Err(e) = sender.send(WorkerMessage::NewConnection(stream)) {
                    tracing::error!(error = %e, "failed to dispatch connection");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No pending connections, sleep briefly
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                if !shutdown.load(Ordering::Relaxed) {
                    tracing::error!(error = %e, "accept error");
                }
            }
        }
    }
}

/// Worker thread that handles connections
struct Worker {
    /// Worker ID for logging
    id: usize,

    receiver: Receiver<WorkerMessage>,

    node: Arc<Node>,

    active_connections: Arc<AtomicUsize>,

    read_timeout_ms: u64,
    write_timeout_ms: u64,
}

impl Worker {
    fn run(self) {
        tracing::trace!(worker = self.id, "worker started");

        loop {
            match self.receiver.recv() {
                Ok(WorkerMessage::NewConnection(stream)) => {
                    self.handle_connection(stream);
                }
                Ok(WorkerMessage::Shutdown) => {
                    tracing::trace!(worker = self.id, "worker received shutdown signal");
                    break;
                }
                Err(_) => {
                    // Channel closed
                    break;
                }
            }
        }

        tracing::trace!(worker = self.id, "worker stopped");
    }

    fn handle_connection(&self, stream: TcpStream) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);

        let mut conn = match Connection::new(stream, Arc::clone(&self.node)) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "failed to create connection");
                self.active_connections.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        };

        if let Err(e) = conn.set_timeouts(self.read_timeout_ms, self.write_timeout_ms) {
            tracing::warn!(error = %e, "failed to set connection timeouts");
        }

        if let Err(e) = conn.handle() {
            tracing::debug!(peer = %conn.peer_addr(), error = %e, "connection ended with error");
        }

        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Get number of CPUs (for worker thread count)
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
