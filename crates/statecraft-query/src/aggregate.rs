// crates/statecraft-query/src/aggregate.rs
// ============================================================================
// Module: History Aggregations
// Description: State residency, trigger, and time-bucket statistics.
// Purpose: Roll filtered event lists up into per-key statistics.
// Dependencies: statecraft-core, crate::buckets
// ============================================================================

//! ## Overview
//! Aggregations consume an ordered event list (normally the output of a
//! [`HistoryQuery`](crate::query::HistoryQuery) fetch) and fold it into
//! statistics: per-state entry/exit counts with residency durations
//! computed by pairing each entry with the matching exit in sequence, per
//! trigger fire counts with source/target cardinalities, and calendar
//! bucket counts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use statecraft_core::RecordedEvent;
use statecraft_core::StateId;
use statecraft_core::Timestamp;
use statecraft_core::TriggerId;

use crate::buckets::Period;
use crate::buckets::bucket_start;

// ============================================================================
// SECTION: State Residency
// ============================================================================

/// Per-state statistics over one event list.
///
/// # Invariants
/// - Residency figures only cover completed visits (an entry paired with a
///   later exit); a trailing open visit contributes to `entries` only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateResidency {
    /// Number of times the state was entered.
    pub entries: u64,
    /// Number of times the state was exited.
    pub exits: u64,
    /// Total residency across completed visits.
    pub total: Duration,
    /// Average residency across completed visits.
    pub average: Duration,
    /// Shortest completed visit.
    pub min: Option<Duration>,
    /// Longest completed visit.
    pub max: Option<Duration>,
}

/// Groups events by state, pairing entries with matching exits in
/// sequence order.
#[must_use]
pub fn group_by_state(events: &[RecordedEvent]) -> BTreeMap<StateId, StateResidency> {
    let mut stats: BTreeMap<StateId, StateResidency> = BTreeMap::new();
    let mut open_entries: BTreeMap<StateId, Vec<Timestamp>> = BTreeMap::new();
    let mut completed_visits: BTreeMap<StateId, u32> = BTreeMap::new();

    for record in events {
        let exited = stats.entry(record.event.from.clone()).or_default();
        exited.exits += 1;
        // Pair the exit with the oldest unmatched entry for the state.
        if let Some(entered_at) = open_entries.get_mut(&record.event.from).and_then(Vec::pop) {
            let visit = record.event.timestamp.duration_since(entered_at);
            exited.total += visit;
            exited.min = Some(exited.min.map_or(visit, |current| current.min(visit)));
            exited.max = Some(exited.max.map_or(visit, |current| current.max(visit)));
            *completed_visits.entry(record.event.from.clone()).or_default() += 1;
        }

        let entered = stats.entry(record.event.to.clone()).or_default();
        entered.entries += 1;
        open_entries
            .entry(record.event.to.clone())
            .or_default()
            .insert(0, record.event.timestamp);
    }

    for (state, residency) in &mut stats {
        if let Some(&paired) = completed_visits.get(state)
            && paired > 0
        {
            residency.average = residency.total / paired;
        }
    }
    stats
}

// ============================================================================
// SECTION: Trigger Statistics
// ============================================================================

/// Per-trigger statistics over one event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerStats {
    /// Number of transitions caused by the trigger.
    pub fires: u64,
    /// Number of distinct source states.
    pub distinct_sources: u64,
    /// Number of distinct target states.
    pub distinct_targets: u64,
    /// Timestamp of the first firing.
    pub first_fired_at: Timestamp,
    /// Timestamp of the last firing.
    pub last_fired_at: Timestamp,
}

/// Groups events by trigger.
#[must_use]
pub fn group_by_trigger(events: &[RecordedEvent]) -> BTreeMap<TriggerId, TriggerStats> {
    let mut sources: BTreeMap<TriggerId, BTreeSet<StateId>> = BTreeMap::new();
    let mut targets: BTreeMap<TriggerId, BTreeSet<StateId>> = BTreeMap::new();
    let mut stats: BTreeMap<TriggerId, TriggerStats> = BTreeMap::new();

    for record in events {
        let trigger = record.event.trigger.clone();
        sources.entry(trigger.clone()).or_default().insert(record.event.from.clone());
        targets.entry(trigger.clone()).or_default().insert(record.event.to.clone());
        stats
            .entry(trigger)
            .and_modify(|entry| {
                entry.fires += 1;
                entry.first_fired_at = entry.first_fired_at.min(record.event.timestamp);
                entry.last_fired_at = entry.last_fired_at.max(record.event.timestamp);
            })
            .or_insert(TriggerStats {
                fires: 1,
                distinct_sources: 0,
                distinct_targets: 0,
                first_fired_at: record.event.timestamp,
                last_fired_at: record.event.timestamp,
            });
    }

    for (trigger, entry) in &mut stats {
        entry.distinct_sources = sources.get(trigger).map_or(0, |set| set.len() as u64);
        entry.distinct_targets = targets.get(trigger).map_or(0, |set| set.len() as u64);
    }
    stats
}

// ============================================================================
// SECTION: Time Buckets
// ============================================================================

/// Groups events into calendar buckets, keyed by bucket start.
#[must_use]
pub fn group_by_period(events: &[RecordedEvent], period: Period) -> BTreeMap<Timestamp, u64> {
    let mut buckets: BTreeMap<Timestamp, u64> = BTreeMap::new();
    for record in events {
        *buckets.entry(bucket_start(record.event.timestamp, period)).or_default() += 1;
    }
    buckets
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
    use std::time::Duration;

    use statecraft_core::DefinitionVersion;
    use statecraft_core::RecordedEvent;
    use statecraft_core::StateId;
    use statecraft_core::StateTransitionEvent;
    use statecraft_core::Timestamp;
    use statecraft_core::TriggerId;

    use super::Period;
    use super::group_by_period;
    use super::group_by_state;
    use super::group_by_trigger;

    fn record(seq: u64, from: &str, to: &str, trigger: &str, at_millis: i64) -> RecordedEvent {
        RecordedEvent {
            seq,
            event: StateTransitionEvent {
                from: StateId::new(from),
                to: StateId::new(to),
                trigger: TriggerId::new(trigger),
                timestamp: Timestamp::from_unix_millis(at_millis),
                correlation_id: None,
                dedupe_key: None,
                definition_version: DefinitionVersion::INITIAL,
                metadata: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn residency_pairs_entries_with_exits() {
        let events = vec![
            record(1, "Idle", "Working", "Start", 1_000),
            record(2, "Working", "Idle", "Finish", 4_000),
            record(3, "Idle", "Working", "Start", 5_000),
            record(4, "Working", "Idle", "Finish", 6_000),
        ];
        let stats = group_by_state(&events);
        let working = stats.get(&StateId::new("Working")).expect("working stats");
        assert_eq!(working.entries, 2);
        assert_eq!(working.exits, 2);
        assert_eq!(working.total, Duration::from_secs(4));
        assert_eq!(working.average, Duration::from_secs(2));
        assert_eq!(working.min, Some(Duration::from_secs(1)));
        assert_eq!(working.max, Some(Duration::from_secs(3)));
    }

    #[test]
    fn open_visits_count_entries_without_residency() {
        let events = vec![record(1, "Idle", "Working", "Start", 1_000)];
        let stats = group_by_state(&events);
        let working = stats.get(&StateId::new("Working")).expect("working stats");
        assert_eq!(working.entries, 1);
        assert_eq!(working.exits, 0);
        assert_eq!(working.total, Duration::ZERO);
        assert_eq!(working.min, None);
    }

    #[test]
    fn trigger_stats_track_cardinalities_and_bounds() {
        let events = vec![
            record(1, "A", "B", "go", 1_000),
            record(2, "B", "C", "go", 3_000),
            record(3, "C", "A", "reset", 5_000),
        ];
        let stats = group_by_trigger(&events);
        let go = stats.get(&TriggerId::new("go")).expect("go stats");
        assert_eq!(go.fires, 2);
        assert_eq!(go.distinct_sources, 2);
        assert_eq!(go.distinct_targets, 2);
        assert_eq!(go.first_fired_at, Timestamp::from_unix_millis(1_000));
        assert_eq!(go.last_fired_at, Timestamp::from_unix_millis(3_000));
    }

    #[test]
    fn period_buckets_group_by_calendar_hour() {
        let base = 1_700_000_000_000;
        let events = vec![
            record(1, "A", "B", "go", base),
            record(2, "B", "A", "go", base + 60_000),
            record(3, "A", "B", "go", base + 3_600_000),
        ];
        let buckets = group_by_period(&events, Period::Hour);
        let counts: Vec<u64> = buckets.values().copied().collect();
        assert_eq!(counts, vec![2, 1]);
    }
}
