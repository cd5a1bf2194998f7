// crates/statecraft-actor/src/telemetry.rs
// ============================================================================
// Module: Actor Telemetry
// Description: Observability hooks for transitions, replay, and timers.
// Purpose: Provide adapter observations without hard dependencies.
// Dependencies: statecraft-core
// ============================================================================

//! ## Overview
//! This module exposes a thin observation interface for the actor adapter.
//! It is intentionally dependency-light so downstream deployments can plug
//! in their metrics or logging backend without redesign. Telemetry must
//! avoid leaking payloads; observations carry identifiers and counts only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use statecraft_core::EntityId;
use statecraft_core::RecordedEvent;
use statecraft_core::TimerName;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Observation sink for actor adapter events.
pub trait ActorTelemetry: Send + Sync {
    /// A transition was durably confirmed.
    fn transition_recorded(&self, entity: &EntityId, record: &RecordedEvent);
    /// Activation replay finished.
    fn replay_completed(&self, entity: &EntityId, replayed_events: u64, elapsed: Duration);
    /// A state timeout fired its trigger.
    fn timer_fired(&self, entity: &EntityId, timer: &TimerName);
    /// A state timeout was dropped because the entity had already left the
    /// timer's state.
    fn timer_dropped(&self, entity: &EntityId, timer: &TimerName);
    /// A timer registration or firing failed; the failure was isolated.
    fn timer_error(&self, entity: &EntityId, timer: &TimerName, detail: &str);
    /// Stream publication failed after confirmation; the transition stands.
    fn stream_publish_failed(&self, entity: &EntityId, detail: &str);
    /// A snapshot write failed; snapshotting degraded to best-effort.
    fn snapshot_failed(&self, entity: &EntityId, detail: &str);
    /// A snapshot was written at the given sequence number.
    fn snapshot_written(&self, entity: &EntityId, last_seq: u64);
}

// ============================================================================
// SECTION: No-Op Sink
// ============================================================================

/// Telemetry sink that discards every observation.
///
/// # Invariants
/// - Observations are intentionally discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl ActorTelemetry for NoopTelemetry {
    fn transition_recorded(&self, _entity: &EntityId, _record: &RecordedEvent) {}

    fn replay_completed(&self, _entity: &EntityId, _replayed_events: u64, _elapsed: Duration) {}

    fn timer_fired(&self, _entity: &EntityId, _timer: &TimerName) {}

    fn timer_dropped(&self, _entity: &EntityId, _timer: &TimerName) {}

    fn timer_error(&self, _entity: &EntityId, _timer: &TimerName, _detail: &str) {}

    fn stream_publish_failed(&self, _entity: &EntityId, _detail: &str) {}

    fn snapshot_failed(&self, _entity: &EntityId, _detail: &str) {}

    fn snapshot_written(&self, _entity: &EntityId, _last_seq: u64) {}
}
