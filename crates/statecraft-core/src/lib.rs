// crates/statecraft-core/src/lib.rs
// ============================================================================
// Module: Statecraft Core
// Description: Definition model, machine engine, events, and host interfaces.
// Purpose: Provide the deterministic heart of Statecraft with no I/O.
// Dependencies: async-trait, serde, serde_json, smallvec, thiserror
// ============================================================================

//! ## Overview
//! `statecraft-core` is the foundation of Statecraft: immutable machine
//! definitions with guarded, hierarchical, multi-region transitions; a pure
//! evaluation engine; the append-only event and snapshot records that form
//! each entity's durable history; and the backend-agnostic interfaces the
//! actor adapter consumes from a host virtual-actor runtime.
//!
//! The crate performs no I/O of its own. Everything observable is
//! deterministic: given the same definition, state, and arguments, every
//! probe and fire resolves identically.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod core;
pub mod definition;
pub mod interfaces;
pub mod machine;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::ArgsError;
pub use crate::core::CorrelationId;
pub use crate::core::DedupeKey;
pub use crate::core::DefinitionVersion;
pub use crate::core::EntityId;
pub use crate::core::EntitySnapshot;
pub use crate::core::GuardName;
pub use crate::core::MachineTypeId;
pub use crate::core::PersistedReminder;
pub use crate::core::RecordedEvent;
pub use crate::core::RegionId;
pub use crate::core::StateId;
pub use crate::core::StateTransitionEvent;
pub use crate::core::StepName;
pub use crate::core::StreamNamespace;
pub use crate::core::TimerName;
pub use crate::core::Timestamp;
pub use crate::core::TriggerArgs;
pub use crate::core::TriggerArity;
pub use crate::core::TriggerId;
pub use definition::DefinitionBuilder;
pub use definition::DefinitionError;
pub use definition::EntryHook;
pub use definition::ExitHook;
pub use definition::Guard;
pub use definition::GuardContext;
pub use definition::HookContext;
pub use definition::MachineDefinition;
pub use definition::entry_hook;
pub use definition::exit_hook;
pub use definition::guard;
pub use machine::CanFire;
pub use machine::FirePlan;
pub use machine::Machine;
pub use machine::TransitionError;
pub use machine::TransitionPlan;
