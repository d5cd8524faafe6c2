//! End-to-end tests over the wire: one standalone node, real TCP, the
//! client library, and restart persistence. Config behavior lives here
//! too, since the builder feeds everything else.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use quartzkv::config::Config;
use quartzkv::index::SearchMode;
use quartzkv::{Client, Node};
use tempfile::TempDir;

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.node_id, 0);
    assert!(config.peers.is_empty());
    assert!(!config.start_as_primary);
    assert_eq!(config.data_dir.to_str().unwrap(), "./quartzkv_data");
    assert_eq!(config.ngram_size, 3);
    assert_eq!(config.listen_addr, "127.0.0.1:7420");
    assert_eq!(config.max_connections, 1024);
    assert_eq!(config.heartbeat_interval, Duration::from_millis(100));
    assert_eq!(config.election_timeout, Duration::from_millis(500));
    assert_eq!(config.replication_queue_depth, 1024);
}

#[test]
fn test_config_builder() {
    let config = Config::builder()
        .node_id(3)
        .peers(["127.0.0.1:7001", "127.0.0.1:7002"])
        .start_as_primary(true)
        .data_dir("/custom/path")
        .listen_addr("0.0.0.0:8080")
        .max_connections(100)
        .heartbeat_interval(Duration::from_millis(20))
        .election_timeout(Duration::from_millis(150))
        .replication_queue_depth(16)
        .build();

    assert_eq!(config.node_id, 3);
    assert_eq!(config.peers.len(), 2);
    assert!(config.start_as_primary);
    assert_eq!(config.data_dir.to_str().unwrap(), "/custom/path");
    assert_eq!(config.listen_addr, "0.0.0.0:8080");
    assert_eq!(config.max_connections, 100);
    assert_eq!(config.cluster_size(), 3);
}

#[test]
fn test_config_paths_derive_from_data_dir() {
    let config = Config::builder().data_dir("/tmp/qkv").build();
    assert_eq!(config.wal_path().to_str().unwrap(), "/tmp/qkv/wal.log");
    assert_eq!(
        config.snapshot_path().to_str().unwrap(),
        "/tmp/qkv/checkpoint.snap"
    );
    assert_eq!(config.meta_path().to_str().unwrap(), "/tmp/qkv/meta.json");
}

// =============================================================================
// Helper Functions
// =============================================================================

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("127.0.0.1:{}", addr.port())
}

fn standalone_node(dir: &TempDir, addr: &str) -> Arc<Node> {
    let config = Config::builder()
        .node_id(0)
        .listen_addr(addr)
        .data_dir(dir.path())
        .start_as_primary(true)
        .checkpoint_interval(None)
        .read_timeout_ms(1000)
        .write_timeout_ms(1000)
        .build();
    let node = Node::new(config).unwrap();
    node.start().unwrap();
    node
}

// =============================================================================
// End-to-End Flows
// =============================================================================

#[test]
fn test_full_client_lifecycle() {
    let temp = TempDir::new().unwrap();
    let addr = free_addr();
    let node = standalone_node(&temp, &addr);

    let mut client = Client::connect(&addr).unwrap();

    // Set / get / overwrite
    client.set(b"user:1", b"Alice").unwrap();
    client.set(b"user:2", b"Bob").unwrap();
    assert_eq!(client.get(b"user:1").unwrap(), Some(b"Alice".to_vec()));
    client.set(b"user:1", b"Alicia").unwrap();
    assert_eq!(client.get(b"user:1").unwrap(), Some(b"Alicia".to_vec()));

    // Delete reports whether the key existed
    assert!(client.delete(b"user:2").unwrap());
    assert!(!client.delete(b"user:2").unwrap());
    assert_eq!(client.get(b"user:2").unwrap(), None);

    // Bulk set is visible all at once
    client
        .bulk_set(&[
            (b"x".to_vec(), b"10".to_vec()),
            (b"y".to_vec(), b"20".to_vec()),
        ])
        .unwrap();
    assert_eq!(client.get(b"x").unwrap(), Some(b"10".to_vec()));
    assert_eq!(client.get(b"y").unwrap(), Some(b"20".to_vec()));

    node.shutdown();
}

#[test]
fn test_search_over_the_wire() {
    let temp = TempDir::new().unwrap();
    let addr = free_addr();
    let node = standalone_node(&temp, &addr);

    let mut client = Client::connect(&addr).unwrap();
    client
        .set(b"doc1", br#"{"text":"the quick brown fox"}"#)
        .unwrap();
    client
        .set(b"doc2", br#"{"text":"quick brown dog"}"#)
        .unwrap();

    let both = client.search("quick brown", SearchMode::And).unwrap();
    assert_eq!(both, vec![b"doc1".to_vec(), b"doc2".to_vec()]);

    assert!(client.search("fox dog", SearchMode::And).unwrap().is_empty());
    assert_eq!(
        client.search("fox dog", SearchMode::Or).unwrap(),
        vec![b"doc1".to_vec(), b"doc2".to_vec()]
    );

    node.shutdown();
}

#[test]
fn test_semantic_search_over_the_wire() {
    let temp = TempDir::new().unwrap();
    let addr = free_addr();
    let node = standalone_node(&temp, &addr);

    let mut client = Client::connect(&addr).unwrap();
    client.set(b"k1", br#"{"text":"hello world"}"#).unwrap();
    client.set(b"k2", br#"{"text":"help word"}"#).unwrap();

    let hits = client.search_semantic("hello word", 2, 0.1).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, b"k1".to_vec());
    assert_eq!(hits[1].0, b"k2".to_vec());
    assert!(hits[0].1 > hits[1].1);

    node.shutdown();
}

#[test]
fn test_state_survives_node_restart() {
    let temp = TempDir::new().unwrap();

    let addr1 = free_addr();
    {
        let node = standalone_node(&temp, &addr1);
        let mut client = Client::connect(&addr1).unwrap();
        client.set(b"a", b"1").unwrap();
        client.set(b"b", b"2").unwrap();
        client.delete(b"a").unwrap();
        node.shutdown();
    }

    let addr2 = free_addr();
    let node = standalone_node(&temp, &addr2);
    let mut client = Client::connect(&addr2).unwrap();
    assert_eq!(client.get(b"a").unwrap(), None);
    assert_eq!(client.get(b"b").unwrap(), Some(b"2".to_vec()));

    // Search indexes were rebuilt before the listener opened.
    client.set(b"doc", b"searchable words").unwrap();
    assert_eq!(
        client.search("searchable", SearchMode::And).unwrap(),
        vec![b"doc".to_vec()]
    );

    node.shutdown();
}

#[test]
fn test_malformed_frame_gets_status_and_close() {
    let temp = TempDir::new().unwrap();
    let addr = free_addr();
    let node = standalone_node(&temp, &addr);

    let mut stream = TcpStream::connect(&addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    // A frame with an unknown tag byte.
    stream.write_all(&2u32.to_be_bytes()).unwrap();
    stream.write_all(&[0x7F, 0x00]).unwrap();

    // Expect a 1-byte MALFORMED status frame.
    let mut reply = [0u8; 5];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(reply, [0, 0, 0, 1, 3]);

    // Then the server closes the connection.
    let mut rest = Vec::new();
    let closed = stream.read_to_end(&mut rest).map(|n| n == 0).unwrap_or(true);
    assert!(closed);

    node.shutdown();
}

#[test]
fn test_concurrent_clients() {
    let temp = TempDir::new().unwrap();
    let addr = free_addr();
    let node = standalone_node(&temp, &addr);

    let mut handles = Vec::new();
    for t in 0..4u8 {
        let addr = addr.clone();
        handles.push(std::thread::spawn(move || {
            let mut client = Client::connect(&addr).unwrap();
            for i in 0..25u8 {
                let key = format!("t{t}-key{i}");
                client.set(key.as_bytes(), &[t, i]).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = Client::connect(&addr).unwrap();
    for t in 0..4u8 {
        for i in 0..25u8 {
            let key = format!("t{t}-key{i}");
            assert_eq!(client.get(key.as_bytes()).unwrap(), Some(vec![t, i]));
        }
    }
    assert_eq!(node.engine().last_applied(), 100);

    node.shutdown();
}
