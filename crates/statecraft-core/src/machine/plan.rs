// crates/statecraft-core/src/machine/plan.rs
// ============================================================================
// Module: Statecraft Transition Plans
// Description: Computed effects of one accepted fire, per region.
// Purpose: Separate pure planning from hook execution and state mutation.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A fire first produces a [`FirePlan`]: the ordered, side-effect-free
//! description of what will happen in every accepting region. Applying the
//! plan runs exit hooks from the current leaf up to the least common
//! ancestor (exclusive), performs the transition, and runs entry hooks down
//! to the target. Plans reference states by id so they stay cheap to clone
//! and inspect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::args::TriggerArgs;
use crate::core::identifiers::GuardName;
use crate::core::identifiers::RegionId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;

// ============================================================================
// SECTION: Region Transition Plan
// ============================================================================

/// Planned transition for one region.
///
/// # Invariants
/// - `exit_chain` runs leaf-first up to the LCA, exclusive.
/// - `entry_chain` runs top-down from below the LCA to `to`, inclusive.
/// - A self-transition (`from == to`) has empty chains: the LCA is the
///   state itself, so no hooks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Region the plan applies to.
    pub region: RegionId,
    /// Leaf state at plan time.
    pub from: StateId,
    /// Target state of the selected rule.
    pub to: StateId,
    /// States whose exit hooks run, in order.
    pub exit_chain: Vec<StateId>,
    /// States whose entry hooks run, in order.
    pub entry_chain: Vec<StateId>,
}

// ============================================================================
// SECTION: Fire Plan
// ============================================================================

/// The full planned effect of one accepted fire across regions.
///
/// # Invariants
/// - `regions` is non-empty and ordered by region declaration.
#[derive(Debug, Clone)]
pub struct FirePlan {
    /// Trigger being fired.
    pub trigger: TriggerId,
    /// Arguments supplied with the fire.
    pub args: TriggerArgs,
    /// Per-region transition plans in declared region order.
    pub regions: Vec<TransitionPlan>,
}

impl FirePlan {
    /// Returns the plan for the primary region.
    ///
    /// # Panics
    ///
    /// Never panics: accepted fires always carry at least one region plan.
    #[must_use]
    pub fn primary(&self) -> &TransitionPlan {
        // Plans are only constructed with at least one accepting region.
        &self.regions[0]
    }
}

// ============================================================================
// SECTION: Guard Probe Result
// ============================================================================

/// Result of a `can_fire` probe.
///
/// # Invariants
/// - `unmet_guards` is empty when `allowed` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFire {
    /// Whether a fire would currently select a rule.
    pub allowed: bool,
    /// Guard names that evaluated false, in evaluation order.
    pub unmet_guards: Vec<GuardName>,
}

impl CanFire {
    /// An allowed probe result.
    #[must_use]
    pub const fn permitted() -> Self {
        Self {
            allowed: true,
            unmet_guards: Vec::new(),
        }
    }

    /// A refused probe result with the unmet guard names.
    #[must_use]
    pub const fn rejected(unmet_guards: Vec<GuardName>) -> Self {
        Self {
            allowed: false,
            unmet_guards,
        }
    }
}
