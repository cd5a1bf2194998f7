// crates/statecraft-core/src/core/mod.rs
// ============================================================================
// Module: Statecraft Core Types
// Description: Canonical identifiers, time, versions, arguments, and events.
// Purpose: Provide stable, serializable value types shared by every crate.
// Dependencies: serde, serde_json, smallvec
// ============================================================================

//! ## Overview
//! Core types define the value vocabulary of Statecraft: opaque
//! identifiers, explicit timestamps, three-part definition versions,
//! positional trigger arguments, and the append-only event records that
//! make up each entity's durable history. These types are the canonical
//! source of truth for any derived API surface.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod args;
pub mod event;
pub mod identifiers;
pub mod time;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use args::ArgsError;
pub use args::MAX_TRIGGER_ARITY;
pub use args::TriggerArgs;
pub use args::TriggerArity;
pub use event::ENTITY_SNAPSHOT_WIRE_ID;
pub use event::EntitySnapshot;
pub use event::PersistedReminder;
pub use event::REGION_METADATA_KEY;
pub use event::RecordedEvent;
pub use event::StateTransitionEvent;
pub use event::TRANSITION_EVENT_WIRE_ID;
pub use identifiers::CorrelationId;
pub use identifiers::DedupeKey;
pub use identifiers::EntityId;
pub use identifiers::GuardName;
pub use identifiers::MachineTypeId;
pub use identifiers::RegionId;
pub use identifiers::StateId;
pub use identifiers::StepName;
pub use identifiers::StreamNamespace;
pub use identifiers::TimerName;
pub use identifiers::TriggerId;
pub use time::Timestamp;
pub use version::DefinitionVersion;
pub use version::VersionParseError;
