// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Fixtures
// Description: Shared definitions and actor wiring for scenario tests.
// Purpose: Keep end-to-end scenarios focused on behavior, not setup.
// Dependencies: statecraft-actor, statecraft-core
// ============================================================================

//! ## Overview
//! Shared fixtures for the end-to-end scenario suite: the order-processing
//! machine used across scenarios and helpers wiring actors onto in-memory
//! backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use statecraft_actor::EventSourcingOptions;
use statecraft_actor::MachineActor;
use statecraft_core::DefinitionBuilder;
use statecraft_core::DefinitionVersion;
use statecraft_core::MachineDefinition;
use statecraft_core::Timestamp;
use statecraft_core::runtime::InMemoryEventStore;
use statecraft_core::runtime::InMemorySnapshotStore;
use statecraft_core::runtime::ManualClock;

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Order machine: Created -> PaymentPending -> Paid -> Shipped -> Completed.
///
/// # Panics
///
/// Panics when the fixture definition fails validation, which is a test
/// failure.
#[must_use]
#[allow(clippy::expect_used, reason = "Fixture definitions are statically valid.")]
pub fn order_definition() -> Arc<MachineDefinition> {
    DefinitionBuilder::new("Order", DefinitionVersion::new(1, 0, 0))
        .state("Created")
        .state("PaymentPending")
        .state("Paid")
        .state("Shipped")
        .state("Completed")
        .initial("Created")
        .transition("Created", "Submit", "PaymentPending")
        .transition("PaymentPending", "Pay", "Paid")
        .transition("Paid", "Ship", "Shipped")
        .transition("Shipped", "Deliver", "Completed")
        .build()
        .expect("order definition validates")
}

// ============================================================================
// SECTION: Actor Wiring
// ============================================================================

/// In-memory backend bundle for one scenario.
#[derive(Clone)]
pub struct Harness {
    /// Shared event log.
    pub events: InMemoryEventStore,
    /// Shared snapshot slot.
    pub snapshots: InMemorySnapshotStore,
    /// Deterministic clock.
    pub clock: ManualClock,
}

impl Harness {
    /// Creates a fresh harness starting at unix millisecond 1_000_000.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: InMemoryEventStore::new(),
            snapshots: InMemorySnapshotStore::new(),
            clock: ManualClock::new(Timestamp::from_unix_millis(1_000_000)),
        }
    }

    /// Activates an order actor with the given options.
    ///
    /// # Panics
    ///
    /// Panics when activation fails; scenario fixtures treat that as a
    /// test failure.
    #[allow(
        clippy::expect_used,
        reason = "Fixture activation failures are test failures."
    )]
    pub async fn order_actor(&self, entity: &str, options: EventSourcingOptions) -> MachineActor {
        MachineActor::builder(entity, order_definition())
            .event_store(Arc::new(self.events.clone()))
            .snapshot_store(Arc::new(self.snapshots.clone()))
            .clock(Arc::new(self.clock.clone()))
            .options(options)
            .activate()
            .await
            .expect("activate order actor")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
