// crates/statecraft-core/src/machine/mod.rs
// ============================================================================
// Module: Statecraft Machine Engine
// Description: Pure transition evaluator, plans, errors, parameter cache.
// Purpose: Execute definitions deterministically with no I/O.
// Dependencies: crate::core, crate::definition
// ============================================================================

//! ## Overview
//! The machine module is the pure evaluation half of Statecraft: given a
//! definition and live leaf states, it plans and applies fires. Everything
//! here is CPU-only; persistence, timers, and streams live in the actor
//! adapter.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod engine;
pub mod error;
pub mod params;
pub mod plan;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::Machine;
pub use engine::in_hook_scope;
pub use error::TransitionError;
pub use params::TriggerDescriptor;
pub use params::TriggerParameterCache;
pub use plan::CanFire;
pub use plan::FirePlan;
pub use plan::TransitionPlan;
