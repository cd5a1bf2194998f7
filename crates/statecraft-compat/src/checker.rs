// crates/statecraft-compat/src/checker.rs
// ============================================================================
// Module: Compatibility Checker
// Description: Runs the rule set and assembles the verdict and plan.
// Purpose: Gate definition upgrades behind an explicit migration plan.
// Dependencies: statecraft-core, crate::{diff, plan, rules}
// ============================================================================

//! ## Overview
//! The checker runs the ordered rule set over a diff context and rolls the
//! findings up: an overall compatibility verdict, a level classification,
//! every breaking change and warning, and the migration plan assembled
//! from the rules' suggested steps. No persisted-format
//! backwards-incompatible change is allowed without a version bump and a
//! plan this engine accepts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use statecraft_core::DefinitionVersion;
use statecraft_core::MachineDefinition;

use crate::diff::DefinitionDiff;
use crate::diff::DiffContext;
use crate::plan::MigrationPlan;
use crate::rules::BreakingChange;
use crate::rules::CompatRule;
use crate::rules::ImpactLevel;
use crate::rules::default_rules;

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Overall compatibility classification.
///
/// # Invariants
/// - Variants are stable for serialization and programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityLevel {
    /// Structurally identical definitions.
    FullyCompatible,
    /// Additive change: the new definition reads everything the old one
    /// wrote.
    BackwardCompatible,
    /// Behavioral change without surface change: old readers keep working
    /// on new data.
    ForwardCompatible,
    /// Old entities or callers break without migration.
    Incompatible,
}

/// Summary of one rule's findings for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    /// Rule name.
    pub rule: String,
    /// Breaking-change count.
    pub breaking_changes: usize,
    /// Warning count.
    pub warnings: usize,
}

/// Full compatibility report for one definition upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Version upgraded from.
    pub from_version: DefinitionVersion,
    /// Version upgraded to.
    pub to_version: DefinitionVersion,
    /// Overall verdict: deployable, possibly with a migration plan.
    pub is_compatible: bool,
    /// Level classification.
    pub level: CompatibilityLevel,
    /// Every breaking change across rules, in rule order.
    pub breaking_changes: Vec<BreakingChange>,
    /// Every warning across rules, in rule order.
    pub warnings: Vec<String>,
    /// Per-rule finding counts.
    pub rule_findings: Vec<RuleFinding>,
    /// Migration plan assembled from rule suggestions.
    pub migration_plan: MigrationPlan,
}

// ============================================================================
// SECTION: Checker
// ============================================================================

/// Rule-driven compatibility engine.
pub struct CompatibilityChecker {
    /// Ordered rule set.
    rules: Vec<Box<dyn CompatRule>>,
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl CompatibilityChecker {
    /// Creates a checker with the default rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a checker with a custom ordered rule set.
    #[must_use]
    pub fn with_rules(rules: Vec<Box<dyn CompatRule>>) -> Self {
        Self {
            rules,
        }
    }

    /// Diffs two definitions and evaluates the rule set with derived
    /// flags. Use [`Self::check`] to supply explicit flags.
    #[must_use]
    pub fn check_definitions(
        &self,
        old: &MachineDefinition,
        new: &MachineDefinition,
    ) -> CompatibilityReport {
        self.check(&DiffContext::new(DefinitionDiff::between(old, new)))
    }

    /// Evaluates the rule set over a prepared diff context.
    #[must_use]
    pub fn check(&self, ctx: &DiffContext) -> CompatibilityReport {
        let mut breaking_changes: Vec<BreakingChange> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut rule_findings: Vec<RuleFinding> = Vec::new();
        let mut steps = Vec::new();

        for rule in &self.rules {
            let evaluation = rule.evaluate(ctx);
            rule_findings.push(RuleFinding {
                rule: evaluation.rule.to_string(),
                breaking_changes: evaluation.breaking_changes.len(),
                warnings: evaluation.warnings.len(),
            });
            breaking_changes.extend(evaluation.breaking_changes);
            warnings.extend(evaluation.warnings);
            steps.extend(evaluation.suggested_steps);
        }

        let level = Self::classify(ctx, &breaking_changes);
        // High-impact findings make the upgrade incompatible without the
        // migration plan; Critical findings block it outright.
        let is_compatible = level != CompatibilityLevel::Incompatible
            && breaking_changes.iter().all(|change| change.impact < ImpactLevel::Critical);

        CompatibilityReport {
            from_version: ctx.diff.from_version,
            to_version: ctx.diff.to_version,
            is_compatible,
            level,
            breaking_changes,
            warnings,
            rule_findings,
            migration_plan: MigrationPlan::from_steps(steps),
        }
    }

    /// Derives the level classification from the context and findings.
    fn classify(ctx: &DiffContext, breaking: &[BreakingChange]) -> CompatibilityLevel {
        let worst = breaking.iter().map(|change| change.impact).max();
        if worst >= Some(ImpactLevel::High) {
            return CompatibilityLevel::Incompatible;
        }
        if ctx.diff.is_unchanged() && !ctx.data_format_changed {
            return CompatibilityLevel::FullyCompatible;
        }
        let additive_only = !ctx.diff.has_removals()
            && ctx.diff.guard_changes.is_empty()
            && ctx.diff.transition_changes.modified.is_empty()
            && ctx.diff.trigger_changes.modified.is_empty();
        if additive_only {
            return CompatibilityLevel::BackwardCompatible;
        }
        CompatibilityLevel::ForwardCompatible
    }
}

impl std::fmt::Debug for CompatibilityChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompatibilityChecker").field("rules", &self.rules.len()).finish()
    }
}
