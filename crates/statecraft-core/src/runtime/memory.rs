// crates/statecraft-core/src/runtime/memory.rs
// ============================================================================
// Module: Statecraft In-Memory Runtime Backends
// Description: In-memory event store, snapshot store, and clocks.
// Purpose: Provide deterministic backend implementations without external
//          dependencies for tests and local hosts.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides simple in-memory implementations of the storage
//! interfaces plus two clocks: [`SystemClock`] for hosts and
//! [`ManualClock`] for deterministic tests. They are not intended for
//! production use beyond local hosting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;

use crate::core::event::EntitySnapshot;
use crate::core::event::RecordedEvent;
use crate::core::event::StateTransitionEvent;
use crate::core::identifiers::EntityId;
use crate::core::time::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::EventStore;
use crate::interfaces::EventStoreError;
use crate::interfaces::SnapshotStore;
use crate::interfaces::SnapshotStoreError;

// ============================================================================
// SECTION: In-Memory Event Store
// ============================================================================

/// In-memory append-only event log for tests and local hosts.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    /// Per-entity logs protected by a mutex.
    logs: Arc<Mutex<BTreeMap<String, Vec<RecordedEvent>>>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current log length for an entity (test convenience).
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Io`] when the store mutex is poisoned.
    pub fn log_len(&self, entity: &EntityId) -> Result<u64, EventStoreError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| EventStoreError::Io("event store mutex poisoned".to_string()))?;
        Ok(logs.get(entity.as_str()).map_or(0, |log| log.len() as u64))
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        entity: &EntityId,
        events: &[StateTransitionEvent],
        expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| EventStoreError::Io("event store mutex poisoned".to_string()))?;
        let log = logs.entry(entity.as_str().to_string()).or_default();
        let found = log.len() as u64;
        if found != expected_version {
            return Err(EventStoreError::VersionConflict {
                expected: expected_version,
                found,
            });
        }
        for (offset, event) in events.iter().enumerate() {
            log.push(RecordedEvent {
                seq: expected_version + 1 + offset as u64,
                event: event.clone(),
            });
        }
        Ok(log.len() as u64)
    }

    async fn read(
        &self,
        entity: &EntityId,
        from_seq: u64,
        to_seq: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| EventStoreError::Io("event store mutex poisoned".to_string()))?;
        let Some(log) = logs.get(entity.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .filter(|record| {
                record.seq >= from_seq && to_seq.is_none_or(|upper| record.seq <= upper)
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: In-Memory Snapshot Store
// ============================================================================

/// In-memory snapshot slot for tests and local hosts.
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotStore {
    /// Per-entity snapshots protected by a mutex.
    snapshots: Arc<Mutex<BTreeMap<String, EntitySnapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(
        &self,
        entity: &EntityId,
        snapshot: &EntitySnapshot,
    ) -> Result<(), SnapshotStoreError> {
        self.snapshots
            .lock()
            .map_err(|_| SnapshotStoreError::Io("snapshot store mutex poisoned".to_string()))?
            .insert(entity.as_str().to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, entity: &EntityId) -> Result<Option<EntitySnapshot>, SnapshotStoreError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| SnapshotStoreError::Io("snapshot store mutex poisoned".to_string()))?;
        Ok(snapshots.get(entity.as_str()).cloned())
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Wall-clock time source for hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current time in unix milliseconds.
    now_millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Advances the clock by `millis`.
    pub fn advance_millis(&self, millis: i64) {
        self.now_millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now_millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use std::collections::BTreeMap;

    use super::InMemoryEventStore;
    use super::InMemorySnapshotStore;
    use super::ManualClock;
    use crate::core::event::EntitySnapshot;
    use crate::core::event::StateTransitionEvent;
    use crate::core::identifiers::EntityId;
    use crate::core::identifiers::StateId;
    use crate::core::identifiers::TriggerId;
    use crate::core::time::Timestamp;
    use crate::core::version::DefinitionVersion;
    use crate::interfaces::Clock;
    use crate::interfaces::EventStore;
    use crate::interfaces::EventStoreError;
    use crate::interfaces::SnapshotStore;

    fn event(from: &str, to: &str, trigger: &str) -> StateTransitionEvent {
        StateTransitionEvent {
            from: StateId::new(from),
            to: StateId::new(to),
            trigger: TriggerId::new(trigger),
            timestamp: Timestamp::from_unix_millis(1),
            correlation_id: None,
            dedupe_key: None,
            definition_version: DefinitionVersion::INITIAL,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn append_assigns_dense_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let entity = EntityId::new("order-1");
        let confirmed = store
            .append(&entity, &[event("A", "B", "go"), event("B", "C", "go")], 0)
            .await
            .expect("append");
        assert_eq!(confirmed, 2);
        let records = store.read(&entity, 1, None).await.expect("read");
        let seqs: Vec<u64> = records.iter().map(|record| record.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn append_rejects_version_conflicts() {
        let store = InMemoryEventStore::new();
        let entity = EntityId::new("order-1");
        store.append(&entity, &[event("A", "B", "go")], 0).await.expect("append");
        let conflict = store.append(&entity, &[event("B", "C", "go")], 0).await;
        assert!(matches!(
            conflict,
            Err(EventStoreError::VersionConflict { expected: 0, found: 1 })
        ));
    }

    #[tokio::test]
    async fn read_honors_sequence_bounds() {
        let store = InMemoryEventStore::new();
        let entity = EntityId::new("order-1");
        let events = [event("A", "B", "go"), event("B", "C", "go"), event("C", "D", "go")];
        store.append(&entity, &events, 0).await.expect("append");
        let window = store.read(&entity, 2, Some(2)).await.expect("read");
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].seq, 2);
    }

    #[tokio::test]
    async fn snapshots_round_trip() {
        let store = InMemorySnapshotStore::new();
        let entity = EntityId::new("order-1");
        let snapshot = EntitySnapshot {
            current_states: vec![StateId::new("Paid")],
            last_transition_at: Timestamp::from_unix_millis(10),
            transition_count: 2,
            last_seq: 2,
            definition_version: DefinitionVersion::INITIAL,
            active_reminders: Vec::new(),
        };
        store.save(&entity, &snapshot).await.expect("save");
        let loaded = store.load(&entity).await.expect("load");
        assert_eq!(loaded, Some(snapshot));
    }

    #[test]
    fn manual_clock_advances_deterministically() {
        let clock = ManualClock::new(Timestamp::from_unix_millis(100));
        clock.advance_millis(50);
        assert_eq!(clock.now(), Timestamp::from_unix_millis(150));
    }
}
