// crates/statecraft-compat/src/plan.rs
// ============================================================================
// Module: Migration Plans
// Description: Typed migration steps with risk and effort estimates.
// Purpose: Turn rule findings into an ordered, estimated migration plan.
// Dependencies: statecraft-core, serde
// ============================================================================

//! ## Overview
//! A migration plan is the ordered concatenation of the steps the rules
//! suggest, sorted by declared rule priority. Effort levels map onto fixed
//! durations (30 minutes, 2 hours, 8 hours) and roll up into the plan's
//! estimated total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use statecraft_core::DefinitionVersion;

// ============================================================================
// SECTION: Risk and Effort
// ============================================================================

/// Risk classification of one migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine, reversible change.
    Low,
    /// Needs review and a rollback path.
    Medium,
    /// Touches durable data or breaks old readers.
    High,
}

/// Effort classification of one migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortLevel {
    /// About half an hour.
    Low,
    /// About two hours.
    Medium,
    /// About a working day.
    High,
}

impl EffortLevel {
    /// Returns the estimated effort in minutes.
    #[must_use]
    pub const fn minutes(self) -> u64 {
        match self {
            Self::Low => 30,
            Self::Medium => 120,
            Self::High => 480,
        }
    }
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Kind of one migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStepType {
    /// Introduce new states alongside the old ones.
    StateAddition,
    /// Retire states that live entities may still occupy.
    StateRemoval,
    /// Adjust trigger declarations or arities.
    TriggerModification,
    /// Adjust transition rows or targets.
    TransitionModification,
    /// Adjust guard predicates.
    GuardModification,
    /// Migrate persisted entity data.
    DataMigration,
    /// Upgrade persisted serialization formats.
    SerializationUpgrade,
    /// Manual review without a mechanical action.
    Review,
}

/// One typed migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Version the step migrates from.
    pub from_version: DefinitionVersion,
    /// Version the step migrates to.
    pub to_version: DefinitionVersion,
    /// Step kind.
    pub step_type: MigrationStepType,
    /// Risk classification.
    pub risk: RiskLevel,
    /// Effort classification.
    pub estimated_effort: EffortLevel,
    /// Concrete actions to perform.
    pub actions: Vec<String>,
    /// Checks validating the step.
    pub validations: Vec<String>,
    /// Ordering priority inherited from the suggesting rule (lower runs
    /// earlier).
    pub priority: u32,
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Ordered migration plan with a rolled-up duration estimate.
///
/// # Invariants
/// - `steps` is ordered by ascending `priority`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Steps in execution order.
    pub steps: Vec<MigrationStep>,
    /// Total estimated duration in minutes.
    pub estimated_duration_minutes: u64,
}

impl MigrationPlan {
    /// Assembles a plan from suggested steps, ordering by priority.
    #[must_use]
    pub fn from_steps(mut steps: Vec<MigrationStep>) -> Self {
        steps.sort_by_key(|step| step.priority);
        let estimated_duration_minutes =
            steps.iter().map(|step| step.estimated_effort.minutes()).sum();
        Self {
            steps,
            estimated_duration_minutes,
        }
    }

    /// Returns `true` when no step is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use statecraft_core::DefinitionVersion;

    use super::EffortLevel;
    use super::MigrationPlan;
    use super::MigrationStep;
    use super::MigrationStepType;
    use super::RiskLevel;

    fn step(priority: u32, effort: EffortLevel) -> MigrationStep {
        MigrationStep {
            from_version: DefinitionVersion::new(1, 0, 0),
            to_version: DefinitionVersion::new(2, 0, 0),
            step_type: MigrationStepType::Review,
            risk: RiskLevel::Low,
            estimated_effort: effort,
            actions: Vec::new(),
            validations: Vec::new(),
            priority,
        }
    }

    #[test]
    fn plans_order_by_priority_and_sum_effort() {
        let plan = MigrationPlan::from_steps(vec![
            step(20, EffortLevel::High),
            step(5, EffortLevel::Low),
            step(10, EffortLevel::Medium),
        ]);
        let priorities: Vec<u32> = plan.steps.iter().map(|step| step.priority).collect();
        assert_eq!(priorities, vec![5, 10, 20]);
        assert_eq!(plan.estimated_duration_minutes, 30 + 120 + 480);
    }
}
