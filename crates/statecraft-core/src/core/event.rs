// crates/statecraft-core/src/core/event.rs
// ============================================================================
// Module: Statecraft Event Records
// Description: Append-only transition events, recorded log entries, snapshots.
// Purpose: Provide stable, serializable records for the per-entity event log.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! The per-entity event log is an append-only sequence of
//! [`StateTransitionEvent`] records. Sequence numbers are dense and
//! monotonic per entity, assigned by the actor adapter at confirmation time;
//! confirmed events are immutable. Snapshots compress a log prefix so
//! activation replays only the suffix.
//!
//! Wire identity: every persisted type carries a stable symbolic id and a
//! field-numbered schema documented on its fields. Field numbers are part of
//! the persistence contract; changing them requires a definition version
//! bump and a migration plan accepted by the compatibility engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::DedupeKey;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;
use crate::core::time::Timestamp;
use crate::core::version::DefinitionVersion;

// ============================================================================
// SECTION: Wire Identity
// ============================================================================

/// Stable wire id for [`StateTransitionEvent`].
pub const TRANSITION_EVENT_WIRE_ID: &str = "statecraft.transition.v1";

/// Stable wire id for [`EntitySnapshot`].
pub const ENTITY_SNAPSHOT_WIRE_ID: &str = "statecraft.snapshot.v1";

/// Metadata key carrying the region id for multi-region machines.
pub const REGION_METADATA_KEY: &str = "region";

// ============================================================================
// SECTION: State Transition Event
// ============================================================================

/// One confirmed state transition.
///
/// Wire id `statecraft.transition.v1`; field numbers are part of the
/// persistence contract.
///
/// # Invariants
/// - Immutable once confirmed.
/// - `metadata` iterates in key order (`BTreeMap`), so serialized forms are
///   deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionEvent {
    /// Field 0: source state.
    pub from: StateId,
    /// Field 1: target state.
    pub to: StateId,
    /// Field 2: trigger that caused the transition.
    pub trigger: TriggerId,
    /// Field 3: transition timestamp (UTC).
    pub timestamp: Timestamp,
    /// Field 4: optional correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Field 5: optional deduplication key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<DedupeKey>,
    /// Field 6: version of the definition that produced the event.
    pub definition_version: DefinitionVersion,
    /// Field 7: free-form metadata map (region id rides under
    /// [`REGION_METADATA_KEY`] for multi-region machines).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl StateTransitionEvent {
    /// Returns the region id recorded in metadata, when present.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.metadata.get(REGION_METADATA_KEY).map(String::as_str)
    }
}

// ============================================================================
// SECTION: Recorded Event
// ============================================================================

/// A confirmed event together with its assigned sequence number.
///
/// # Invariants
/// - `seq` is dense and monotonic per entity, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Dense per-entity sequence number assigned at confirmation.
    pub seq: u64,
    /// The confirmed transition event.
    pub event: StateTransitionEvent,
}

// ============================================================================
// SECTION: Entity Snapshot
// ============================================================================

/// Durable reminder registration persisted inside the entity snapshot.
///
/// # Invariants
/// - `timer_name` is unique within one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedReminder {
    /// Timer name keying the reminder.
    pub timer_name: String,
    /// State the reminder is bound to.
    pub state: StateId,
    /// Trigger fired when the reminder is due.
    pub trigger: TriggerId,
    /// Delay in milliseconds from state entry to firing.
    pub due_millis: u64,
    /// Whether the reminder repeats with period `due_millis`.
    pub repeating: bool,
}

/// Compressed entity state written every `snapshot_interval` confirmed
/// events.
///
/// Wire id `statecraft.snapshot.v1`.
///
/// # Invariants
/// - `last_seq` names the last event folded into the snapshot; replay
///   resumes at `last_seq + 1`.
/// - `current_states` holds one leaf state per region in declared region
///   order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Field 0: current leaf state per region, in declared region order.
    pub current_states: Vec<StateId>,
    /// Field 1: timestamp of the last confirmed transition.
    pub last_transition_at: Timestamp,
    /// Field 2: total confirmed transitions for the entity.
    pub transition_count: u64,
    /// Field 3: sequence number of the last event folded into the snapshot.
    pub last_seq: u64,
    /// Field 4: definition version the entity was running when snapshotted.
    pub definition_version: DefinitionVersion,
    /// Field 5: durable reminder registrations active at snapshot time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_reminders: Vec<PersistedReminder>,
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

    use super::StateTransitionEvent;
    use crate::core::identifiers::CorrelationId;
    use crate::core::identifiers::DedupeKey;
    use crate::core::identifiers::StateId;
    use crate::core::identifiers::TriggerId;
    use crate::core::time::Timestamp;
    use crate::core::version::DefinitionVersion;

    fn sample_event() -> StateTransitionEvent {
        let mut metadata = BTreeMap::new();
        metadata.insert("region".to_string(), "payment".to_string());
        metadata.insert("source".to_string(), "api".to_string());
        StateTransitionEvent {
            from: StateId::new("PaymentPending"),
            to: StateId::new("Paid"),
            trigger: TriggerId::new("Pay"),
            timestamp: Timestamp::from_unix_millis(1_700_000_000_000),
            correlation_id: Some(CorrelationId::new("corr-9")),
            dedupe_key: Some(DedupeKey::new("txn-42")),
            definition_version: DefinitionVersion::new(1, 2, 3),
            metadata,
        }
    }

    #[test]
    fn events_round_trip_including_metadata_order() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialize event");
        let back: StateTransitionEvent = serde_json::from_str(&json).expect("deserialize event");
        assert_eq!(back, event);
        let keys: Vec<&String> = back.metadata.keys().collect();
        assert_eq!(keys, vec!["region", "source"]);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let mut event = sample_event();
        event.correlation_id = None;
        event.dedupe_key = None;
        event.metadata.clear();
        let json = serde_json::to_string(&event).expect("serialize event");
        assert!(!json.contains("correlation_id"));
        assert!(!json.contains("dedupe_key"));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn region_accessor_reads_metadata() {
        let event = sample_event();
        assert_eq!(event.region(), Some("payment"));
    }
}
