// crates/statecraft-core/src/machine/error.rs
// ============================================================================
// Module: Statecraft Transition Errors
// Description: Deterministic, side-effect-free transition failure taxonomy.
// Purpose: Surface why a fire was refused without mutating any state.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Transition errors carry no side effects: no hook runs, no event is
//! written, and no region state changes when one is returned. The variants
//! are stable for programmatic handling by adapters and hosts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::GuardName;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;

// ============================================================================
// SECTION: Transition Errors
// ============================================================================

/// Deterministic transition failure.
///
/// # Invariants
/// - Returning an error leaves every region state unchanged and runs no
///   hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// No region declares a rule for the trigger from its current state.
    #[error("no transition for trigger {trigger} from state {from}")]
    NoTransition {
        /// Trigger that was fired.
        trigger: TriggerId,
        /// Leaf state of the primary region at fire time.
        from: StateId,
    },
    /// Rules exist but every candidate's guards rejected the fire.
    #[error("guards rejected trigger {trigger}: {}", unmet_summary(unmet))]
    GuardRejected {
        /// Trigger that was fired.
        trigger: TriggerId,
        /// Names of the guards that evaluated false, in evaluation order.
        unmet: Vec<GuardName>,
    },
    /// A fire was attempted from inside an entry or exit hook.
    #[error("re-entrant fire of trigger {trigger} from inside a hook")]
    ReentrancyViolation {
        /// Trigger of the re-entrant fire.
        trigger: TriggerId,
    },
    /// The supplied argument count does not match the declared arity.
    #[error("trigger {trigger} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        /// Trigger that was fired.
        trigger: TriggerId,
        /// Declared arity.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },
    /// A restored state does not belong to the definition.
    #[error("restored state {0} is not declared by the definition")]
    UnknownRestoredState(StateId),
    /// The restored state count does not match the region count.
    #[error("restored {actual} region state(s), definition declares {expected} region(s)")]
    RegionCountMismatch {
        /// Declared region count.
        expected: usize,
        /// Restored state count.
        actual: usize,
    },
}

/// Formats unmet guard names for error display.
fn unmet_summary(unmet: &[GuardName]) -> String {
    let names: Vec<&str> = unmet.iter().map(GuardName::as_str).collect();
    names.join(", ")
}
