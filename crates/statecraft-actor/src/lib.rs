// crates/statecraft-actor/src/lib.rs
// ============================================================================
// Module: Statecraft Actor
// Description: Event-sourced actor adapter, timers, drivers, and telemetry.
// Purpose: Bind machine instances to entities with durable, replayable
//          history.
// Dependencies: statecraft-core, tokio, tokio-stream, tokio-util
// ============================================================================

//! ## Overview
//! `statecraft-actor` turns the pure machine engine into a hosted,
//! event-sourced actor: per-entity serialized fires, durable confirmation
//! with snapshots and replay, an idempotency window, state timeouts on
//! timers and durable reminders, and post-confirmation stream publication.
//! Local drivers implement the host-runtime interfaces on plain tokio so
//! the whole stack runs in one process for tests and local hosts.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod adapter;
pub mod dedupe;
pub mod drivers;
pub mod options;
pub mod telemetry;
pub mod timers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use adapter::ActivationError;
pub use adapter::FireRequest;
pub use adapter::MachineActor;
pub use adapter::MachineActorBuilder;
pub use adapter::MachineInfo;
pub use dedupe::DedupeWindow;
pub use drivers::BroadcastStreamSink;
pub use drivers::InMemoryReminderService;
pub use drivers::LocalEntityRegistry;
pub use drivers::PublishedEvent;
pub use drivers::ReminderHandler;
pub use drivers::TokioTimerService;
pub use options::EventSourcingOptions;
pub use telemetry::ActorTelemetry;
pub use telemetry::NoopTelemetry;
pub use timers::DURABLE_TIMEOUT_THRESHOLD;
pub use timers::StateTimeoutConfig;
pub use timers::TimeoutBuilder;
pub use timers::TimeoutConfigError;
pub use timers::TimerDurability;
pub use timers::configure_timeout;
