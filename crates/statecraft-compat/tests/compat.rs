// crates/statecraft-compat/tests/compat.rs
// ============================================================================
// Module: Compatibility Engine Tests
// Description: Validate verdicts, levels, and migration plans.
// Purpose: Ensure upgrades are gated the way the rules promise.
// Dependencies: statecraft-compat, statecraft-core
// ============================================================================

//! Behavior tests for the compatibility checker.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use statecraft_compat::ChangeKind;
use statecraft_compat::CompatibilityChecker;
use statecraft_compat::CompatibilityLevel;
use statecraft_compat::DefinitionDiff;
use statecraft_compat::DiffContext;
use statecraft_compat::ImpactLevel;
use statecraft_compat::MigrationStepType;
use statecraft_compat::RiskLevel;
use statecraft_core::DefinitionBuilder;
use statecraft_core::DefinitionVersion;
use statecraft_core::MachineDefinition;

/// Order machine, version 1.2.3, with a Draft state.
fn order_v1() -> Arc<MachineDefinition> {
    DefinitionBuilder::new("Order", DefinitionVersion::new(1, 2, 3))
        .state("Draft")
        .state("Submitted")
        .state("Paid")
        .initial("Draft")
        .transition("Draft", "Submit", "Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build v1")
}

#[test]
fn identical_definitions_are_fully_compatible() {
    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &order_v1());
    assert!(report.is_compatible);
    assert_eq!(report.level, CompatibilityLevel::FullyCompatible);
    assert!(report.breaking_changes.is_empty());
    assert!(report.migration_plan.is_empty());
}

#[test]
fn state_removal_across_a_major_bump_is_incompatible_with_a_plan() {
    let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(2, 0, 0))
        .state("Submitted")
        .state("Paid")
        .initial("Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build v2");

    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &v2);

    assert!(!report.is_compatible);
    assert_eq!(report.level, CompatibilityLevel::Incompatible);
    let removal = report
        .breaking_changes
        .iter()
        .find(|change| change.kind == ChangeKind::StateRemoved)
        .expect("state removal finding");
    assert_eq!(removal.impact, ImpactLevel::High);
    assert!(removal.description.contains("Draft"));

    let step = report
        .migration_plan
        .steps
        .iter()
        .find(|step| step.step_type == MigrationStepType::StateRemoval)
        .expect("state removal step");
    assert!(step.risk >= RiskLevel::Medium);
    assert_eq!(step.from_version, DefinitionVersion::new(1, 2, 3));
    assert_eq!(step.to_version, DefinitionVersion::new(2, 0, 0));
    assert!(report.migration_plan.estimated_duration_minutes >= 120);
}

#[test]
fn additive_minor_bumps_stay_backward_compatible() {
    let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 3, 0))
        .state("Draft")
        .state("Submitted")
        .state("Paid")
        .state("Refunded")
        .initial("Draft")
        .transition("Draft", "Submit", "Submitted")
        .transition("Submitted", "Pay", "Paid")
        .transition("Paid", "Refund", "Refunded")
        .build()
        .expect("build v2");

    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &v2);

    assert!(report.is_compatible);
    assert_eq!(report.level, CompatibilityLevel::BackwardCompatible);
    assert!(report.breaking_changes.is_empty());
    // Forward-compat rule flags the addition for old readers.
    assert!(report.warnings.iter().any(|warning| warning.contains("Refunded")));
    // Addition step is planned at low risk.
    assert!(report
        .migration_plan
        .steps
        .iter()
        .any(|step| step.step_type == MigrationStepType::StateAddition));
}

#[test]
fn removals_under_a_minor_bump_are_flagged_as_insufficient() {
    let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 3, 0))
        .state("Submitted")
        .state("Paid")
        .initial("Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build v2");

    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &v2);
    assert!(!report.is_compatible);
    assert!(report
        .breaking_changes
        .iter()
        .any(|change| change.kind == ChangeKind::InsufficientVersionBump));
}

#[test]
fn structural_changes_under_a_patch_bump_are_flagged() {
    let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 2, 4))
        .state("Draft")
        .state("Submitted")
        .state("Paid")
        .state("Audited")
        .initial("Draft")
        .transition("Draft", "Submit", "Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build v2");

    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &v2);
    assert!(report
        .breaking_changes
        .iter()
        .any(|change| change.kind == ChangeKind::InsufficientVersionBump));
}

#[test]
fn version_regressions_are_critical() {
    let downgraded = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 0, 0))
        .state("Draft")
        .state("Submitted")
        .state("Paid")
        .initial("Draft")
        .transition("Draft", "Submit", "Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build downgraded");

    let report = CompatibilityChecker::new().check_definitions(&order_v1(), &downgraded);
    assert!(!report.is_compatible);
    assert!(report
        .breaking_changes
        .iter()
        .any(|change| change.impact == ImpactLevel::Critical));
}

#[test]
fn data_format_changes_without_a_major_bump_are_critical() {
    let same_structure = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 2, 4))
        .state("Draft")
        .state("Submitted")
        .state("Paid")
        .initial("Draft")
        .transition("Draft", "Submit", "Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build same structure");

    let ctx = DiffContext::new(DefinitionDiff::between(&order_v1(), &same_structure))
        .with_data_format_changed();
    let report = CompatibilityChecker::new().check(&ctx);

    assert!(!report.is_compatible);
    assert!(report
        .breaking_changes
        .iter()
        .any(|change| change.kind == ChangeKind::DataFormatChanged
            && change.impact == ImpactLevel::Critical));
    assert!(report
        .migration_plan
        .steps
        .iter()
        .any(|step| step.step_type == MigrationStepType::SerializationUpgrade));
}

#[test]
fn migration_flag_adds_a_rehearsed_data_step() {
    let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(2, 0, 0))
        .state("Submitted")
        .state("Paid")
        .initial("Submitted")
        .transition("Submitted", "Pay", "Paid")
        .build()
        .expect("build v2");

    let ctx = DiffContext::new(DefinitionDiff::between(&order_v1(), &v2));
    assert!(ctx.requires_migration);
    let report = CompatibilityChecker::new().check(&ctx);
    let data_step = report
        .migration_plan
        .steps
        .iter()
        .find(|step| step.step_type == MigrationStepType::DataMigration)
        .expect("data migration step");
    assert_eq!(data_step.risk, RiskLevel::High);
}
