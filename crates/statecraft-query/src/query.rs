// crates/statecraft-query/src/query.rs
// ============================================================================
// Module: History Query Builder
// Description: Filter pipeline over one entity's event log.
// Purpose: Filter, order, and page transition history read from the store.
// Dependencies: statecraft-core, crate::buckets
// ============================================================================

//! ## Overview
//! A history query is a read-only filter pipeline: temporal and content
//! filters narrow the log, ordering and pagination shape it, and terminal
//! forms materialize it. The engine streams the entity's whole log from the
//! store and filters in memory; stores that support it may push filters
//! down instead.
//!
//! Temporal filters take explicit reference times; the query engine never
//! reads wall clocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use statecraft_core::CorrelationId;
use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::RecordedEvent;
use statecraft_core::StateId;
use statecraft_core::Timestamp;
use statecraft_core::TriggerId;
use statecraft_core::interfaces::EventStore;
use statecraft_core::interfaces::EventStoreError;

use crate::buckets::day_end;
use crate::buckets::day_start;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// History query errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Result ordering by event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    /// Oldest first (sequence order).
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

// ============================================================================
// SECTION: Query Builder
// ============================================================================

/// Predicate over one recorded event.
type EventPredicate = Arc<dyn Fn(&RecordedEvent) -> bool + Send + Sync>;

/// Read-only filter pipeline over an entity's event log.
#[derive(Clone, Default)]
pub struct HistoryQuery {
    /// Conjunctive filter set.
    filters: Vec<EventPredicate>,
    /// Result ordering.
    order: TimeOrder,
    /// Results to skip after ordering.
    skip: Option<usize>,
    /// Maximum results after skipping.
    take: Option<usize>,
}

impl HistoryQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an arbitrary predicate filter.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&RecordedEvent) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Arc::new(predicate));
        self
    }

    // ------------------------------------------------------------------
    // Temporal filters.
    // ------------------------------------------------------------------

    /// Keeps events with `from <= timestamp <= to`.
    #[must_use]
    pub fn in_range(self, from: Timestamp, to: Timestamp) -> Self {
        self.filter(move |record| {
            record.event.timestamp >= from && record.event.timestamp <= to
        })
    }

    /// Keeps events strictly after `reference`.
    #[must_use]
    pub fn after(self, reference: Timestamp) -> Self {
        self.filter(move |record| record.event.timestamp > reference)
    }

    /// Keeps events strictly before `reference`.
    #[must_use]
    pub fn before(self, reference: Timestamp) -> Self {
        self.filter(move |record| record.event.timestamp < reference)
    }

    /// Keeps events on the calendar day (UTC) containing `now`.
    #[must_use]
    pub fn today(self, now: Timestamp) -> Self {
        let start = day_start(now);
        let end = day_end(now);
        self.filter(move |record| {
            record.event.timestamp >= start && record.event.timestamp < end
        })
    }

    /// Keeps events within the trailing `hours` before `now` (inclusive).
    #[must_use]
    pub fn last_hours(self, hours: u64, now: Timestamp) -> Self {
        let start = now.saturating_sub(Duration::from_secs(hours.saturating_mul(3_600)));
        self.filter(move |record| {
            record.event.timestamp >= start && record.event.timestamp <= now
        })
    }

    /// Keeps events within the trailing `days` before `now` (inclusive).
    #[must_use]
    pub fn last_days(self, days: u64, now: Timestamp) -> Self {
        self.last_hours(days.saturating_mul(24), now)
    }

    // ------------------------------------------------------------------
    // Content filters.
    // ------------------------------------------------------------------

    /// Keeps events departing `state`.
    #[must_use]
    pub fn from_state(self, state: impl Into<StateId>) -> Self {
        let state = state.into();
        self.filter(move |record| record.event.from == state)
    }

    /// Keeps events arriving at `state`.
    #[must_use]
    pub fn to_state(self, state: impl Into<StateId>) -> Self {
        let state = state.into();
        self.filter(move |record| record.event.to == state)
    }

    /// Keeps events caused by `trigger`.
    #[must_use]
    pub fn with_trigger(self, trigger: impl Into<TriggerId>) -> Self {
        let trigger = trigger.into();
        self.filter(move |record| record.event.trigger == trigger)
    }

    /// Keeps events caused by any of `triggers`.
    #[must_use]
    pub fn with_triggers(self, triggers: impl IntoIterator<Item = TriggerId>) -> Self {
        let triggers: BTreeSet<TriggerId> = triggers.into_iter().collect();
        self.filter(move |record| triggers.contains(&record.event.trigger))
    }

    /// Keeps events stamped with `correlation`.
    #[must_use]
    pub fn with_correlation(self, correlation: impl Into<CorrelationId>) -> Self {
        let correlation = correlation.into();
        self.filter(move |record| record.event.correlation_id.as_ref() == Some(&correlation))
    }

    /// Keeps events whose metadata satisfies `predicate`.
    #[must_use]
    pub fn metadata(
        self,
        predicate: impl Fn(&std::collections::BTreeMap<String, String>) -> bool
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.filter(move |record| predicate(&record.event.metadata))
    }

    /// Keeps events produced by definition versions in `min ..= max`.
    #[must_use]
    pub fn in_version_range(self, min: DefinitionVersion, max: DefinitionVersion) -> Self {
        self.filter(move |record| {
            record.event.definition_version >= min && record.event.definition_version <= max
        })
    }

    // ------------------------------------------------------------------
    // Ordering and pagination.
    // ------------------------------------------------------------------

    /// Orders results by event time.
    #[must_use]
    pub const fn order(mut self, order: TimeOrder) -> Self {
        self.order = order;
        self
    }

    /// Skips the first `count` results after ordering.
    #[must_use]
    pub const fn skip(mut self, count: usize) -> Self {
        self.skip = Some(count);
        self
    }

    /// Limits the result to `count` entries after skipping.
    #[must_use]
    pub const fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    // ------------------------------------------------------------------
    // Terminal forms.
    // ------------------------------------------------------------------

    /// Materializes the filtered, ordered, paged result list.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when the log cannot be read.
    pub async fn fetch(
        &self,
        store: &dyn EventStore,
        entity: &EntityId,
    ) -> Result<Vec<RecordedEvent>, QueryError> {
        let log = store.read(entity, 1, None).await?;
        let mut matched: Vec<RecordedEvent> = log
            .into_iter()
            .filter(|record| self.filters.iter().all(|filter| filter(record)))
            .collect();
        match self.order {
            TimeOrder::Ascending => {
                matched.sort_by_key(|record| (record.event.timestamp, record.seq));
            }
            TimeOrder::Descending => {
                matched.sort_by_key(|record| {
                    (std::cmp::Reverse(record.event.timestamp), std::cmp::Reverse(record.seq))
                });
            }
        }
        let skipped = self.skip.unwrap_or(0);
        let taken = self.take.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skipped).take(taken).collect())
    }

    /// Returns the first matching event, honoring ordering.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when the log cannot be read.
    pub async fn first(
        &self,
        store: &dyn EventStore,
        entity: &EntityId,
    ) -> Result<Option<RecordedEvent>, QueryError> {
        Ok(self.clone().take(1).fetch(store, entity).await?.into_iter().next())
    }

    /// Counts matching events.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when the log cannot be read.
    pub async fn count(&self, store: &dyn EventStore, entity: &EntityId) -> Result<u64, QueryError> {
        Ok(self.fetch(store, entity).await?.len() as u64)
    }

    /// Returns `true` when any event matches.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Store`] when the log cannot be read.
    pub async fn any(&self, store: &dyn EventStore, entity: &EntityId) -> Result<bool, QueryError> {
        Ok(self.first(store, entity).await?.is_some())
    }
}

impl std::fmt::Debug for HistoryQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryQuery")
            .field("filters", &self.filters.len())
            .field("order", &self.order)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}
