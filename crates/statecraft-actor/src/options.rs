// crates/statecraft-actor/src/options.rs
// ============================================================================
// Module: Event Sourcing Options
// Description: Per-actor configuration for persistence and idempotency.
// Purpose: Configure confirm mode, snapshots, streams, and the dedupe window.
// Dependencies: serde, statecraft-core
// ============================================================================

//! ## Overview
//! Event-sourcing behavior is configured, not inherited: one options value
//! selects the confirm mode, snapshot cadence, stream publication, and the
//! idempotency window for a [`MachineActor`](crate::adapter::MachineActor).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use statecraft_core::StreamNamespace;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default confirmed-event count between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 100;

/// Default capacity of the in-memory dedupe-key window.
pub const DEFAULT_MAX_DEDUPE_KEYS: usize = 1_000;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Event-sourcing configuration for one actor.
///
/// # Invariants
/// - `snapshot_interval` is at least 1 when snapshots are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourcingOptions {
    /// Confirm every transition durably before `fire` returns
    /// (recommended). When false, transitions accumulate in memory and are
    /// confirmed on checkpoint or deactivation.
    pub auto_confirm_events: bool,
    /// Write periodic snapshots so replay starts from the latest one.
    pub enable_snapshots: bool,
    /// Confirmed events between snapshots.
    pub snapshot_interval: u64,
    /// Publish confirmed events to the host pub/sub stream.
    pub publish_to_stream: bool,
    /// Stream namespace used when publication is enabled.
    pub stream_namespace: Option<StreamNamespace>,
    /// Absorb fires whose dedupe key sits in the recent-key window.
    pub enable_idempotency: bool,
    /// Capacity of the recent-dedupe-key window.
    pub max_dedupe_keys_in_memory: usize,
}

impl Default for EventSourcingOptions {
    fn default() -> Self {
        Self {
            auto_confirm_events: true,
            enable_snapshots: true,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            publish_to_stream: false,
            stream_namespace: None,
            enable_idempotency: false,
            max_dedupe_keys_in_memory: DEFAULT_MAX_DEDUPE_KEYS,
        }
    }
}

impl EventSourcingOptions {
    /// Returns the defaults with idempotency enabled.
    #[must_use]
    pub fn with_idempotency() -> Self {
        Self {
            enable_idempotency: true,
            ..Self::default()
        }
    }

    /// Returns the defaults with batch-confirm mode selected.
    #[must_use]
    pub fn batch_confirm() -> Self {
        Self {
            auto_confirm_events: false,
            ..Self::default()
        }
    }
}
