// crates/statecraft-compat/src/lib.rs
// ============================================================================
// Module: Statecraft Compat
// Description: Definition versioning and compatibility engine.
// Purpose: Diff definitions, evaluate rules, and produce migration plans.
// Dependencies: statecraft-core
// ============================================================================

//! ## Overview
//! `statecraft-compat` gates definition upgrades: it diffs two machine
//! definitions structurally, runs an ordered rule set over the diff plus
//! host-supplied flags, and produces a compatibility verdict with an
//! ordered, effort-estimated migration plan. Persisted-format
//! backwards-incompatible changes require a version bump and a plan this
//! engine accepts.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod checker;
pub mod diff;
pub mod plan;
pub mod rules;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checker::CompatibilityChecker;
pub use checker::CompatibilityLevel;
pub use checker::CompatibilityReport;
pub use checker::RuleFinding;
pub use diff::ChangeComplexity;
pub use diff::ChangeSet;
pub use diff::DefinitionDiff;
pub use diff::DiffContext;
pub use plan::EffortLevel;
pub use plan::MigrationPlan;
pub use plan::MigrationStep;
pub use plan::MigrationStepType;
pub use plan::RiskLevel;
pub use rules::BreakingChange;
pub use rules::ChangeKind;
pub use rules::CompatRule;
pub use rules::ImpactLevel;
pub use rules::RuleEvaluation;
pub use rules::default_rules;
