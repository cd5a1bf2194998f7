// crates/statecraft-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Validate durable appends, reads, and snapshot round-trips.
// Purpose: Ensure the store honors the interface contracts on real files.
// Dependencies: statecraft-store-sqlite, statecraft-core, tempfile, tokio
// ============================================================================

//! Behavior tests for the SQLite-backed stores.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::EntitySnapshot;
use statecraft_core::StateId;
use statecraft_core::StateTransitionEvent;
use statecraft_core::Timestamp;
use statecraft_core::TriggerId;
use statecraft_core::interfaces::EventStore;
use statecraft_core::interfaces::EventStoreError;
use statecraft_core::interfaces::SnapshotStore;
use statecraft_store_sqlite::SqliteStore;
use statecraft_store_sqlite::SqliteStoreConfig;

fn event(from: &str, to: &str, trigger: &str, at: i64) -> StateTransitionEvent {
    StateTransitionEvent {
        from: StateId::new(from),
        to: StateId::new(to),
        trigger: TriggerId::new(trigger),
        timestamp: Timestamp::from_unix_millis(at),
        correlation_id: None,
        dedupe_key: Some(statecraft_core::DedupeKey::new(format!("k-{at}"))),
        definition_version: DefinitionVersion::INITIAL,
        metadata: BTreeMap::new(),
    }
}

/// Opens a store on a fresh temporary database.
fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    let config = SqliteStoreConfig::new(dir.path().join("statecraft.db"));
    SqliteStore::open(&config).expect("open store")
}

#[tokio::test]
async fn appends_assign_dense_sequences_and_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entity = EntityId::new("order-1");
    {
        let store = open_store(&dir);
        let confirmed = store
            .append(&entity, &[event("A", "B", "go", 1), event("B", "C", "go", 2)], 0)
            .await
            .expect("append");
        assert_eq!(confirmed, 2);
    }

    // A fresh connection over the same file sees the confirmed log.
    let reopened = open_store(&dir);
    let records = reopened.read(&entity, 1, None).await.expect("read");
    let seqs: Vec<u64> = records.iter().map(|record| record.seq).collect();
    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(records[1].event.to, StateId::new("C"));
}

#[tokio::test]
async fn version_conflicts_reject_concurrent_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let entity = EntityId::new("order-2");
    store.append(&entity, &[event("A", "B", "go", 1)], 0).await.expect("append");

    let conflict = store.append(&entity, &[event("B", "C", "go", 2)], 0).await;
    assert!(matches!(
        conflict,
        Err(EventStoreError::VersionConflict { expected: 0, found: 1 })
    ));
    // The failed append left nothing behind.
    let records = store.read(&entity, 1, None).await.expect("read");
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn range_reads_honor_bounds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let entity = EntityId::new("order-3");
    let events = [
        event("A", "B", "go", 1),
        event("B", "C", "go", 2),
        event("C", "D", "go", 3),
        event("D", "E", "go", 4),
    ];
    store.append(&entity, &events, 0).await.expect("append");

    let window = store.read(&entity, 2, Some(3)).await.expect("read");
    let seqs: Vec<u64> = window.iter().map(|record| record.seq).collect();
    assert_eq!(seqs, vec![2, 3]);
}

#[tokio::test]
async fn entities_are_isolated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    store
        .append(&EntityId::new("a"), &[event("A", "B", "go", 1)], 0)
        .await
        .expect("append a");
    store
        .append(&EntityId::new("b"), &[event("X", "Y", "go", 1)], 0)
        .await
        .expect("append b");

    let a = store.read(&EntityId::new("a"), 1, None).await.expect("read a");
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].event.from, StateId::new("A"));
}

#[tokio::test]
async fn snapshots_round_trip_and_replace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir);
    let entity = EntityId::new("order-4");
    assert_eq!(store.load(&entity).await.expect("load"), None);

    let first = EntitySnapshot {
        current_states: vec![StateId::new("Paid")],
        last_transition_at: Timestamp::from_unix_millis(9),
        transition_count: 2,
        last_seq: 2,
        definition_version: DefinitionVersion::INITIAL,
        active_reminders: Vec::new(),
    };
    store.save(&entity, &first).await.expect("save");
    assert_eq!(store.load(&entity).await.expect("load"), Some(first.clone()));

    let second = EntitySnapshot {
        last_seq: 5,
        transition_count: 5,
        ..first
    };
    store.save(&entity, &second).await.expect("replace");
    assert_eq!(store.load(&entity).await.expect("load"), Some(second));
}
