// crates/statecraft-core/src/interfaces/mod.rs
// ============================================================================
// Module: Statecraft Interfaces
// Description: Backend-agnostic interfaces consumed from the host runtime.
// Purpose: Define the contract surfaces Statecraft needs without embedding
//          backend-specific details.
// Dependencies: crate::core, crate::machine, async-trait
// ============================================================================

//! ## Overview
//! Interfaces define how Statecraft integrates with a host virtual-actor
//! runtime without embedding backend-specific details: the durable event
//! log, snapshot slot, timer and reminder services, pub/sub streams, the
//! entity resolver, and the clock. Implementations must be deterministic
//! where the contract says so and fail closed on corrupt data.
//!
//! The host guarantees at most one active instance per entity id; every
//! mutating call flows through that instance.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::args::TriggerArgs;
use crate::core::event::EntitySnapshot;
use crate::core::event::RecordedEvent;
use crate::core::event::StateTransitionEvent;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::DedupeKey;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::MachineTypeId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::StreamNamespace;
use crate::core::identifiers::TimerName;
use crate::core::identifiers::TriggerId;
use crate::core::time::Timestamp;
use crate::machine::error::TransitionError;

// ============================================================================
// SECTION: Event Store
// ============================================================================

/// Event store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStoreError {
    /// Store I/O error.
    #[error("event store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("event store corruption: {0}")]
    Corrupt(String),
    /// Optimistic concurrency check failed on append.
    #[error("event store version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the caller expected the log to be at.
        expected: u64,
        /// Version the store actually holds.
        found: u64,
    },
}

/// Append-only per-entity event log.
///
/// # Invariants
/// - `append` assigns dense sequence numbers `expected_version + 1 ..` and
///   returns the new confirmed version.
/// - Confirmed events are immutable; `read` returns them in `seq` order.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` after verifying the log is at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::VersionConflict`] when the log moved, or
    /// [`EventStoreError::Io`] on backend failure.
    async fn append(
        &self,
        entity: &EntityId,
        events: &[StateTransitionEvent],
        expected_version: u64,
    ) -> Result<u64, EventStoreError>;

    /// Reads events with `seq` in `from_seq ..= to_seq` (unbounded when
    /// `to_seq` is `None`), in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError`] on backend failure or corruption.
    async fn read(
        &self,
        entity: &EntityId,
        from_seq: u64,
        to_seq: Option<u64>,
    ) -> Result<Vec<RecordedEvent>, EventStoreError>;
}

// ============================================================================
// SECTION: Snapshot Store
// ============================================================================

/// Snapshot store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotStoreError {
    /// Store I/O error.
    #[error("snapshot store io error: {0}")]
    Io(String),
    /// Stored snapshot is corrupted.
    #[error("snapshot store corruption: {0}")]
    Corrupt(String),
}

/// Key/value snapshot slot per entity.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Saves the entity snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotStoreError`] on backend failure.
    async fn save(&self, entity: &EntityId, snapshot: &EntitySnapshot)
    -> Result<(), SnapshotStoreError>;

    /// Loads the most recent snapshot, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotStoreError`] on backend failure or corruption.
    async fn load(&self, entity: &EntityId) -> Result<Option<EntitySnapshot>, SnapshotStoreError>;
}

// ============================================================================
// SECTION: Timer Service
// ============================================================================

/// Boxed future returned by timer callbacks.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback invoked when an in-process timer fires.
pub type TimerCallback = Arc<dyn Fn() -> TimerFuture + Send + Sync>;

/// Opaque handle for a scheduled in-process timer.
///
/// # Invariants
/// - Handles are unique per service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Creates a handle from a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Short-lived in-process timer service.
///
/// Timers do not survive deactivation; durable work belongs to the
/// [`ReminderService`].
pub trait TimerService: Send + Sync {
    /// Schedules `callback` to run after `delay`, then every `period` when
    /// one is given.
    fn schedule(
        &self,
        delay: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerHandle;

    /// Cancels a scheduled timer. Cancelling an already-fired one-shot
    /// timer is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

// ============================================================================
// SECTION: Reminder Service
// ============================================================================

/// Reminder service errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReminderError {
    /// Registration failed on the host side.
    #[error("reminder registration failed: {0}")]
    Register(String),
    /// Unregistration failed on the host side.
    #[error("reminder unregistration failed: {0}")]
    Unregister(String),
}

/// Durable cluster reminder service. Reminders survive deactivation; the
/// host delivers them by invoking the adapter's reminder entry point.
#[async_trait]
pub trait ReminderService: Send + Sync {
    /// Registers (or re-registers) a reminder for the entity.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Register`] on host failure.
    async fn register(
        &self,
        entity: &EntityId,
        name: &TimerName,
        due: Duration,
        period: Option<Duration>,
    ) -> Result<(), ReminderError>;

    /// Unregisters a reminder. Unknown names are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Unregister`] on host failure.
    async fn unregister(&self, entity: &EntityId, name: &TimerName) -> Result<(), ReminderError>;
}

// ============================================================================
// SECTION: Event Stream Sink
// ============================================================================

/// Stream publication errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Publication failed on the host side.
    #[error("stream publish failed: {0}")]
    Publish(String),
}

/// Optional pub/sub sink for confirmed events.
///
/// Publication happens strictly after durable confirmation; failures must
/// never fail the transition; the durable log is the source of truth.
#[async_trait]
pub trait EventStreamSink: Send + Sync {
    /// Publishes a confirmed event on stream `(namespace, entity)`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Publish`] on host failure.
    async fn publish(
        &self,
        namespace: &StreamNamespace,
        entity: &EntityId,
        event: &RecordedEvent,
    ) -> Result<(), StreamError>;
}

// ============================================================================
// SECTION: Entity Resolver
// ============================================================================

/// Primary-region receipt for a remote fire.
///
/// # Invariants
/// - `deduplicated` fires report `from == to` and append no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireReceipt {
    /// Primary-region state before the fire.
    pub from: StateId,
    /// Primary-region state after the fire.
    pub to: StateId,
    /// Whether the fire was absorbed by the idempotency window.
    pub deduplicated: bool,
    /// Timestamp the host recorded for the transition.
    pub fired_at: Timestamp,
}

/// Remote fire errors.
///
/// # Invariants
/// - [`FireError::Transition`] failures are deterministic (business); the
///   others are technical and may be retried by callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FireError {
    /// The machine refused the transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Durable confirmation failed; the transition was aborted.
    #[error("storage failure: {0}")]
    Storage(String),
    /// The target entity could not be resolved.
    #[error("entity not found: {0}")]
    NotFound(EntityId),
    /// The call was cancelled before completion.
    #[error("fire cancelled")]
    Cancelled,
    /// The call did not complete within its deadline.
    #[error("fire timed out")]
    Timeout,
}

impl FireError {
    /// Returns `true` for deterministic refusals that retrying cannot fix.
    #[must_use]
    pub const fn is_business(&self) -> bool {
        matches!(self, Self::Transition(_))
    }
}

/// Remote reference to one entity's state machine.
#[async_trait]
pub trait EntityRef: Send + Sync {
    /// Fires a trigger on the entity.
    ///
    /// # Errors
    ///
    /// Returns [`FireError`] when the fire is refused or fails to confirm.
    async fn fire(
        &self,
        trigger: &TriggerId,
        args: &TriggerArgs,
        correlation: Option<&CorrelationId>,
        dedupe: Option<&DedupeKey>,
    ) -> Result<FireReceipt, FireError>;

    /// Returns the entity's current primary-region leaf state.
    ///
    /// # Errors
    ///
    /// Returns [`FireError`] when the entity cannot be reached.
    async fn current_state(&self) -> Result<StateId, FireError>;
}

/// Resolver errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No entity is registered under the requested id.
    #[error("no entity registered for {machine_type}/{entity}")]
    Unknown {
        /// Requested machine type.
        machine_type: MachineTypeId,
        /// Requested entity id.
        entity: EntityId,
    },
    /// The resolver backend failed.
    #[error("entity resolution failed: {0}")]
    Backend(String),
}

/// Host entity factory mapping `(machine_type, entity_id)` to a remote
/// reference. Implementations never assume co-location.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Resolves a remote reference for the entity.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the entity cannot be resolved.
    async fn resolve(
        &self,
        machine_type: &MachineTypeId,
        entity: &EntityId,
    ) -> Result<Arc<dyn EntityRef>, ResolveError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source for event timestamps. The engine itself never reads wall
/// clocks; adapters stamp events through this interface so tests stay
/// deterministic.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}
