// crates/statecraft-compat/src/rules.rs
// ============================================================================
// Module: Compatibility Rules
// Description: Ordered rule set evaluating definition diffs.
// Purpose: Classify changes into breaking changes, warnings, and steps.
// Dependencies: statecraft-core, crate::{diff, plan}
// ============================================================================

//! ## Overview
//! Each rule inspects the diff context independently and reports breaking
//! changes, warnings, and suggested migration steps. Rules run in declared
//! order; their declared priority also orders the suggested steps inside
//! the final migration plan. The default set covers version-number
//! discipline, backward/forward compatibility, and the individual change
//! classes (states, triggers, guards, transitions, serialization, data
//! migration).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::diff::ChangeComplexity;
use crate::diff::DiffContext;
use crate::plan::EffortLevel;
use crate::plan::MigrationStep;
use crate::plan::MigrationStepType;
use crate::plan::RiskLevel;

// ============================================================================
// SECTION: Findings
// ============================================================================

/// Impact of one breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    /// Cosmetic; no caller or data impact.
    Low,
    /// Behavior shifts; callers should review.
    Medium,
    /// Old entities or callers break without migration.
    High,
    /// Deployment is unsafe under any circumstances.
    Critical,
}

/// Classification of one breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A state was removed.
    StateRemoved,
    /// A trigger was removed.
    TriggerRemoved,
    /// A trigger's arity changed.
    TriggerArityChanged,
    /// A transition row was removed.
    TransitionRemoved,
    /// A transition row changed targets.
    TransitionRetargeted,
    /// Guard lists changed on an existing row.
    GuardChanged,
    /// The persisted data format changed.
    DataFormatChanged,
    /// The version number moved backwards.
    VersionRegression,
    /// The version bump does not cover the change class.
    InsufficientVersionBump,
}

/// One breaking change finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakingChange {
    /// Change classification.
    pub kind: ChangeKind,
    /// Impact level.
    pub impact: ImpactLevel,
    /// Human-readable description naming the affected keys.
    pub description: String,
}

/// Output of one rule evaluation.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluation {
    /// Rule name for reporting.
    pub rule: &'static str,
    /// Breaking changes found.
    pub breaking_changes: Vec<BreakingChange>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
    /// Suggested migration steps.
    pub suggested_steps: Vec<MigrationStep>,
}

// ============================================================================
// SECTION: Rule Trait
// ============================================================================

/// One compatibility rule.
pub trait CompatRule: Send + Sync {
    /// Stable rule name.
    fn name(&self) -> &'static str;

    /// Step-ordering priority (lower steps run earlier in the plan).
    fn priority(&self) -> u32;

    /// Evaluates the rule against a diff context.
    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation;
}

/// Returns the default ordered rule set.
#[must_use]
pub fn default_rules() -> Vec<Box<dyn CompatRule>> {
    vec![
        Box::new(MajorVersionRule),
        Box::new(MinorVersionRule),
        Box::new(PatchVersionRule),
        Box::new(BackwardCompatRule),
        Box::new(ForwardCompatRule),
        Box::new(StateAdditionRule),
        Box::new(StateRemovalRule),
        Box::new(TriggerModificationRule),
        Box::new(GuardConditionRule),
        Box::new(TransitionModificationRule),
        Box::new(SerializationCompatRule),
        Box::new(DataMigrationRule),
    ]
}

/// Shortcut for a step suggestion bound to the context's versions.
fn suggest(
    ctx: &DiffContext,
    step_type: MigrationStepType,
    risk: RiskLevel,
    effort: EffortLevel,
    priority: u32,
    actions: Vec<String>,
    validations: Vec<String>,
) -> MigrationStep {
    MigrationStep {
        from_version: ctx.diff.from_version,
        to_version: ctx.diff.to_version,
        step_type,
        risk,
        estimated_effort: effort,
        actions,
        validations,
        priority,
    }
}

/// Effort implied by the coarse change complexity.
const fn complexity_effort(complexity: ChangeComplexity) -> EffortLevel {
    match complexity {
        ChangeComplexity::Low => EffortLevel::Low,
        ChangeComplexity::Medium => EffortLevel::Medium,
        ChangeComplexity::High => EffortLevel::High,
    }
}

// ============================================================================
// SECTION: Version Discipline Rules
// ============================================================================

/// Checks major-version movement.
struct MajorVersionRule;

impl CompatRule for MajorVersionRule {
    fn name(&self) -> &'static str {
        "Major"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        let from = ctx.diff.from_version;
        let to = ctx.diff.to_version;
        if to < from {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::VersionRegression,
                impact: ImpactLevel::Critical,
                description: format!("definition version moved backwards: {from} -> {to}"),
            });
        } else if to.major > from.major {
            evaluation
                .warnings
                .push(format!("major version bump {from} -> {to}: breaking changes expected"));
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::Review,
                RiskLevel::Medium,
                EffortLevel::Low,
                self.priority(),
                vec!["review every removed or reshaped surface before rollout".to_string()],
                vec!["all consumers compile against the new definition".to_string()],
            ));
        }
        evaluation
    }
}

/// Checks that minor bumps stay additive.
struct MinorVersionRule;

impl CompatRule for MinorVersionRule {
    fn name(&self) -> &'static str {
        "Minor"
    }

    fn priority(&self) -> u32 {
        11
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        let from = ctx.diff.from_version;
        let to = ctx.diff.to_version;
        let minor_bump_only = to.major == from.major && to.minor > from.minor;
        if minor_bump_only && ctx.diff.has_removals() {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::InsufficientVersionBump,
                impact: ImpactLevel::High,
                description: format!(
                    "minor bump {from} -> {to} removes definition surface; removals require a major bump"
                ),
            });
        }
        evaluation
    }
}

/// Checks that patch bumps preserve structure.
struct PatchVersionRule;

impl CompatRule for PatchVersionRule {
    fn name(&self) -> &'static str {
        "Patch"
    }

    fn priority(&self) -> u32 {
        12
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        let from = ctx.diff.from_version;
        let to = ctx.diff.to_version;
        let patch_bump_only =
            to.major == from.major && to.minor == from.minor && to.patch > from.patch;
        if patch_bump_only && !ctx.diff.is_unchanged() {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::InsufficientVersionBump,
                impact: ImpactLevel::High,
                description: format!(
                    "patch bump {from} -> {to} changes machine structure; structural changes require a minor or major bump"
                ),
            });
        }
        evaluation
    }
}

// ============================================================================
// SECTION: Compatibility Direction Rules
// ============================================================================

/// Old entities must stay loadable: removals break them.
struct BackwardCompatRule;

impl CompatRule for BackwardCompatRule {
    fn name(&self) -> &'static str {
        "Backward"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        for trigger in &ctx.diff.trigger_changes.removed {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::TriggerRemoved,
                impact: ImpactLevel::High,
                description: format!(
                    "trigger {trigger} was removed; recorded events referencing it will not replay"
                ),
            });
        }
        for row in &ctx.diff.transition_changes.removed {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::TransitionRemoved,
                impact: ImpactLevel::High,
                description: format!("transition {row} was removed; callers relying on it break"),
            });
        }
        evaluation
    }
}

/// Old readers meeting new data: additions degrade them gracefully or not.
struct ForwardCompatRule;

impl CompatRule for ForwardCompatRule {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn priority(&self) -> u32 {
        21
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        if !ctx.diff.state_changes.added.is_empty() {
            evaluation.warnings.push(format!(
                "states added ({}): readers on the previous definition cannot interpret entities parked there",
                ctx.diff.state_changes.added.join(", ")
            ));
        }
        if !ctx.diff.trigger_changes.added.is_empty() {
            evaluation.warnings.push(format!(
                "triggers added ({}): events they record are invisible to the previous definition",
                ctx.diff.trigger_changes.added.join(", ")
            ));
        }
        evaluation
    }
}

// ============================================================================
// SECTION: Change-Class Rules
// ============================================================================

/// Added states are additive but deserve validation.
struct StateAdditionRule;

impl CompatRule for StateAdditionRule {
    fn name(&self) -> &'static str {
        "StateAddition"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        if !ctx.diff.state_changes.added.is_empty() {
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::StateAddition,
                RiskLevel::Low,
                EffortLevel::Low,
                self.priority(),
                vec![format!(
                    "deploy the definition with new states ({}) before any writer targets them",
                    ctx.diff.state_changes.added.join(", ")
                )],
                vec!["no entity occupies a new state before rollout completes".to_string()],
            ));
        }
        evaluation
    }
}

/// Removed states strand live entities.
struct StateRemovalRule;

impl CompatRule for StateRemovalRule {
    fn name(&self) -> &'static str {
        "StateRemoval"
    }

    fn priority(&self) -> u32 {
        31
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        for state in &ctx.diff.state_changes.removed {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::StateRemoved,
                impact: ImpactLevel::High,
                description: format!(
                    "state {state} was removed; entities parked there cannot reactivate"
                ),
            });
        }
        if !ctx.diff.state_changes.removed.is_empty() {
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::StateRemoval,
                RiskLevel::High,
                EffortLevel::Medium,
                self.priority(),
                vec![
                    format!(
                        "drain entities out of removed states ({}) before deploying",
                        ctx.diff.state_changes.removed.join(", ")
                    ),
                    "map historical events onto surviving states for replay".to_string(),
                ],
                vec![
                    "no live entity occupies a removed state".to_string(),
                    "replay of historical logs succeeds under the new definition".to_string(),
                ],
            ));
        }
        evaluation
    }
}

/// Trigger removals and arity changes.
struct TriggerModificationRule;

impl CompatRule for TriggerModificationRule {
    fn name(&self) -> &'static str {
        "TriggerModification"
    }

    fn priority(&self) -> u32 {
        32
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        for trigger in &ctx.diff.trigger_changes.modified {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::TriggerArityChanged,
                impact: ImpactLevel::High,
                description: format!(
                    "trigger {trigger} changed arity; existing callers pass the wrong argument count"
                ),
            });
        }
        if !ctx.diff.trigger_changes.is_empty() {
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::TriggerModification,
                if ctx.diff.trigger_changes.removed.is_empty()
                    && ctx.diff.trigger_changes.modified.is_empty()
                {
                    RiskLevel::Low
                } else {
                    RiskLevel::Medium
                },
                EffortLevel::Low,
                self.priority(),
                vec!["update every caller to the new trigger surface".to_string()],
                vec!["no caller fires a removed or re-shaped trigger".to_string()],
            ));
        }
        evaluation
    }
}

/// Guard changes shift acceptance behavior.
struct GuardConditionRule;

impl CompatRule for GuardConditionRule {
    fn name(&self) -> &'static str {
        "GuardCondition"
    }

    fn priority(&self) -> u32 {
        33
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        for row in ctx
            .diff
            .guard_changes
            .modified
            .iter()
            .chain(&ctx.diff.guard_changes.removed)
            .chain(&ctx.diff.guard_changes.added)
        {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::GuardChanged,
                impact: ImpactLevel::Medium,
                description: format!(
                    "guards on {row} changed; fires accepted before may now be rejected (or vice versa)"
                ),
            });
        }
        if !ctx.diff.guard_changes.is_empty() {
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::GuardModification,
                RiskLevel::Medium,
                EffortLevel::Low,
                self.priority(),
                vec!["re-run acceptance probes for every changed guard row".to_string()],
                vec!["guard decisions match the documented business rules".to_string()],
            ));
        }
        evaluation
    }
}

/// Transition row removals and retargets.
struct TransitionModificationRule;

impl CompatRule for TransitionModificationRule {
    fn name(&self) -> &'static str {
        "TransitionModification"
    }

    fn priority(&self) -> u32 {
        34
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        for row in &ctx.diff.transition_changes.modified {
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::TransitionRetargeted,
                impact: ImpactLevel::Medium,
                description: format!("transition {row} changed targets; downstream flows shift"),
            });
        }
        if !ctx.diff.transition_changes.is_empty() {
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::TransitionModification,
                RiskLevel::Medium,
                EffortLevel::Low,
                self.priority(),
                vec!["walk every changed transition row end to end in staging".to_string()],
                vec!["happy-path and rejection flows match expectations".to_string()],
            ));
        }
        evaluation
    }
}

// ============================================================================
// SECTION: Data Rules
// ============================================================================

/// Persisted-format changes must ride a major bump.
struct SerializationCompatRule;

impl CompatRule for SerializationCompatRule {
    fn name(&self) -> &'static str {
        "SerializationCompat"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        if ctx.data_format_changed {
            let impact = if ctx.diff.to_version.major > ctx.diff.from_version.major {
                ImpactLevel::High
            } else {
                // A format change without a major bump is never deployable.
                ImpactLevel::Critical
            };
            evaluation.breaking_changes.push(BreakingChange {
                kind: ChangeKind::DataFormatChanged,
                impact,
                description: "persisted event or snapshot format changed".to_string(),
            });
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::SerializationUpgrade,
                RiskLevel::High,
                EffortLevel::Medium,
                self.priority(),
                vec!["ship dual-format readers before any writer emits the new format".to_string()],
                vec!["old and new records both decode under the new build".to_string()],
            ));
        }
        evaluation
    }
}

/// Explicit data migrations get a planned step.
struct DataMigrationRule;

impl CompatRule for DataMigrationRule {
    fn name(&self) -> &'static str {
        "DataMigration"
    }

    fn priority(&self) -> u32 {
        41
    }

    fn evaluate(&self, ctx: &DiffContext) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation {
            rule: self.name(),
            ..RuleEvaluation::default()
        };
        if ctx.requires_migration {
            evaluation
                .warnings
                .push("existing entities require a data migration before rollout".to_string());
            evaluation.suggested_steps.push(suggest(
                ctx,
                MigrationStepType::DataMigration,
                RiskLevel::High,
                complexity_effort(ctx.complexity),
                self.priority(),
                vec![
                    "write and rehearse the entity migration against a production copy".to_string(),
                ],
                vec![
                    "migrated entities replay to the same state as before".to_string(),
                    "dedupe windows survive the migration".to_string(),
                ],
            ));
        }
        evaluation
    }
}
