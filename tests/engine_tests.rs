//! Engine tests: durability laws, crash recovery, bulk atomicity,
//! checkpointing, and the replication apply path.

use std::path::Path;

use quartzkv::config::Config;
use quartzkv::error::QuartzError;
use quartzkv::index::SearchMode;
use quartzkv::wal::{Operation, WalEntry};
use quartzkv::Engine;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(dir: &Path) -> Config {
    Config::builder().data_dir(dir).build()
}

fn open_engine(dir: &Path) -> Engine {
    Engine::open(&config_for(dir)).unwrap()
}

// =============================================================================
// Basic Laws
// =============================================================================

#[test]
fn test_get_after_set() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"user:1".to_vec(), b"Alice".to_vec()).unwrap();
    assert_eq!(engine.get(b"user:1"), Some(b"Alice".to_vec()));
    assert_eq!(engine.get(b"user:2"), None);
}

#[test]
fn test_overwrite_returns_latest() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"k".to_vec(), b"v1".to_vec()).unwrap();
    engine.set(b"k".to_vec(), b"v2".to_vec()).unwrap();
    assert_eq!(engine.get(b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_get_after_delete_is_none() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"k".to_vec(), b"v".to_vec()).unwrap();
    let (_, existed) = engine.delete(b"k".to_vec()).unwrap();
    assert!(existed);
    assert_eq!(engine.get(b"k"), None);
}

#[test]
fn test_delete_missing_key_still_logs() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
    let (entry, existed) = engine.delete(b"ghost".to_vec()).unwrap();

    // The intent is logged and consumes a seq even though nothing existed.
    assert!(!existed);
    assert_eq!(entry.seq, 2);
    assert_eq!(engine.last_applied(), 2);
}

#[test]
fn test_seqs_are_contiguous() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    let e1 = engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
    let e2 = engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
    let (e3, _) = engine.delete(b"a".to_vec()).unwrap();
    let e4 = engine
        .bulk_set(vec![(b"c".to_vec(), b"3".to_vec())])
        .unwrap();

    assert_eq!(
        vec![e1.seq, e2.seq, e3.seq, e4.seq],
        vec![1, 2, 3, 4]
    );
}

// =============================================================================
// Bulk Operations
// =============================================================================

#[test]
fn test_bulk_set_applies_all_pairs() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    let entry = engine
        .bulk_set(vec![
            (b"x".to_vec(), b"10".to_vec()),
            (b"y".to_vec(), b"20".to_vec()),
            (b"z".to_vec(), b"30".to_vec()),
        ])
        .unwrap();

    // One entry, one seq, all pairs visible.
    assert_eq!(entry.seq, 1);
    assert_eq!(engine.get(b"x"), Some(b"10".to_vec()));
    assert_eq!(engine.get(b"y"), Some(b"20".to_vec()));
    assert_eq!(engine.get(b"z"), Some(b"30".to_vec()));
}

#[test]
fn test_bulk_set_never_observably_partial() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let temp = TempDir::new().unwrap();
    let engine = Arc::new(open_engine(temp.path()));

    // Each batch rewrites all ten keys with a generation token. Any
    // single search observes one consistent state, so it must see a
    // generation on all ten keys or on none.
    let stop = Arc::new(AtomicBool::new(false));
    let reader_engine = Arc::clone(&engine);
    let reader_stop = Arc::clone(&stop);
    let reader = std::thread::spawn(move || {
        while !reader_stop.load(Ordering::Relaxed) {
            for gen in 0..20 {
                let found = reader_engine
                    .search_text(&format!("gen{gen}"), SearchMode::And)
                    .len();
                assert!(
                    found == 0 || found == 10,
                    "observed partial batch: {found} of 10 keys at gen{gen}"
                );
            }
        }
    });

    for gen in 0..20 {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..10u8)
            .map(|i| {
                (
                    vec![b'k', i],
                    format!("payload gen{gen}").into_bytes(),
                )
            })
            .collect();
        engine.bulk_set(pairs).unwrap();
    }

    stop.store(true, Ordering::Relaxed);
    reader.join().unwrap();
}

// =============================================================================
// Crash Recovery
// =============================================================================

#[test]
fn test_wal_replay_after_crash() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
        // Crash: drop without close.
    }

    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
    assert_eq!(engine.last_applied(), 2);
}

#[test]
fn test_recovery_replays_deletes() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
        engine.delete(b"a".to_vec()).unwrap();
    }

    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"a"), None);
    assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
}

#[test]
fn test_bulk_set_survives_crash_atomically() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine
            .bulk_set(vec![
                (b"x".to_vec(), b"10".to_vec()),
                (b"y".to_vec(), b"20".to_vec()),
                (b"z".to_vec(), b"30".to_vec()),
            ])
            .unwrap();
        // Crash after fsync, before any client saw the ack.
    }

    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"x"), Some(b"10".to_vec()));
    assert_eq!(engine.get(b"y"), Some(b"20".to_vec()));
    assert_eq!(engine.get(b"z"), Some(b"30".to_vec()));
}

#[test]
fn test_seq_continues_across_restart() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
    }

    let engine = open_engine(temp.path());
    let entry = engine.set(b"c".to_vec(), b"3".to_vec()).unwrap();
    assert_eq!(entry.seq, 3);
}

#[test]
fn test_indexes_rebuilt_on_recovery() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine
            .set(b"doc1".to_vec(), br#"{"text":"quick brown fox"}"#.to_vec())
            .unwrap();
        engine
            .set(b"doc2".to_vec(), br#"{"text":"lazy dog"}"#.to_vec())
            .unwrap();
        engine.delete(b"doc2".to_vec()).unwrap();
    }

    let engine = open_engine(temp.path());
    assert_eq!(
        engine.search_text("quick", SearchMode::And),
        vec![b"doc1".to_vec()]
    );
    assert!(engine.search_text("lazy", SearchMode::Or).is_empty());
}

// =============================================================================
// Checkpointing
// =============================================================================

#[test]
fn test_checkpoint_then_recover() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
        let marker = engine.checkpoint().unwrap();
        assert_eq!(marker.seq, 3);

        // Post-checkpoint writes land in the fresh WAL.
        engine.set(b"c".to_vec(), b"3".to_vec()).unwrap();
    }

    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"c"), Some(b"3".to_vec()));
    assert_eq!(engine.last_applied(), 4);
}

#[test]
fn test_checkpoint_truncates_wal() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    for i in 0..50u8 {
        engine.set(vec![b'k', i], vec![i; 64]).unwrap();
    }
    let wal_path = config_for(temp.path()).wal_path();
    let before = std::fs::metadata(&wal_path).unwrap().len();

    engine.checkpoint().unwrap();
    let after = std::fs::metadata(&wal_path).unwrap().len();

    assert!(before > 0);
    assert_eq!(after, 0);
}

#[test]
fn test_close_checkpoints() {
    let temp = TempDir::new().unwrap();

    {
        let engine = open_engine(temp.path());
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.close().unwrap();

        // Graceful close leaves no WAL to replay.
        let wal_path = config_for(temp.path()).wal_path();
        assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
    }

    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
    // Close consumed no seq: the next write continues the sequence.
    let entry = engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
    assert_eq!(entry.seq, 2);
}

// =============================================================================
// Replication Apply Path
// =============================================================================

#[test]
fn test_apply_replicated_in_order() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine
        .apply_replicated(WalEntry::new(
            1,
            Operation::Set {
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
        ))
        .unwrap();
    engine
        .apply_replicated(WalEntry::new(
            2,
            Operation::Delete { key: b"a".to_vec() },
        ))
        .unwrap();

    assert_eq!(engine.get(b"a"), None);
    assert_eq!(engine.last_applied(), 2);
}

#[test]
fn test_apply_replicated_rejects_gap() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    let err = engine
        .apply_replicated(WalEntry::new(
            5,
            Operation::Set {
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
        ))
        .unwrap_err();

    match err {
        QuartzError::ReplicationLag { expected, got } => {
            assert_eq!(expected, 1);
            assert_eq!(got, 5);
        }
        other => panic!("expected ReplicationLag, got {other:?}"),
    }
    assert_eq!(engine.get(b"a"), None);
}

#[test]
fn test_apply_replicated_checkpoint_marker() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine
        .apply_replicated(WalEntry::new(
            1,
            Operation::Set {
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
        ))
        .unwrap();
    engine
        .apply_replicated(WalEntry::new(2, Operation::Checkpoint { checkpoint_seq: 1 }))
        .unwrap();

    assert_eq!(engine.last_applied(), 2);

    // The marker checkpointed state to disk and reset the WAL.
    let wal_path = config_for(temp.path()).wal_path();
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
    assert!(config_for(temp.path()).snapshot_path().exists());
}

#[test]
fn test_install_snapshot_replaces_state() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine.set(b"old".to_vec(), b"gone".to_vec()).unwrap();

    engine
        .install_snapshot(
            10,
            vec![
                (b"k1".to_vec(), br#"{"text":"hello world"}"#.to_vec()),
                (b"k2".to_vec(), b"plain".to_vec()),
            ],
        )
        .unwrap();

    assert_eq!(engine.get(b"old"), None);
    assert_eq!(engine.get(b"k2"), Some(b"plain".to_vec()));
    assert_eq!(engine.last_applied(), 10);

    // Indexes were rebuilt against the installed state.
    assert_eq!(
        engine.search_text("hello", SearchMode::And),
        vec![b"k1".to_vec()]
    );
    assert!(engine.search_text("gone", SearchMode::Or).is_empty());

    // The installed snapshot is durable.
    drop(engine);
    let engine = open_engine(temp.path());
    assert_eq!(engine.get(b"k1"), Some(br#"{"text":"hello world"}"#.to_vec()));
    assert_eq!(engine.last_applied(), 10);
}

// =============================================================================
// Stats
// =============================================================================

#[test]
fn test_stats_track_store_and_indexes() {
    let temp = TempDir::new().unwrap();
    let engine = open_engine(temp.path());

    engine
        .set(b"doc".to_vec(), br#"{"text":"alpha beta"}"#.to_vec())
        .unwrap();
    let stats = engine.stats();

    assert_eq!(stats.keys, 1);
    assert!(stats.bytes > 0);
    assert_eq!(stats.last_applied_seq, 1);
    assert!(!stats.degraded);
    assert_eq!(stats.index.unique_tokens, 2);
    assert_eq!(stats.index.indexed_keys, 1);
    assert_eq!(stats.index.ngram_size, 3);
}
