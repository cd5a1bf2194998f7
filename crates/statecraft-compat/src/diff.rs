// crates/statecraft-compat/src/diff.rs
// ============================================================================
// Module: Definition Diff
// Description: Structural comparison of two machine definitions.
// Purpose: Feed the compatibility rule set with classified change lists.
// Dependencies: statecraft-core
// ============================================================================

//! ## Overview
//! A diff compares two definitions structurally: states, triggers (with
//! arities), transition rows, and guard name lists per row. Flags the
//! structure cannot derive (whether the persisted data format changed and
//! whether the host requires a data migration) are supplied by the
//! caller on the [`DiffContext`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use statecraft_core::DefinitionVersion;
use statecraft_core::MachineDefinition;

// ============================================================================
// SECTION: Change Sets
// ============================================================================

/// Added, removed, and modified keys for one aspect of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Keys present only in the newer definition.
    pub added: Vec<String>,
    /// Keys present only in the older definition.
    pub removed: Vec<String>,
    /// Keys present in both with different content.
    pub modified: Vec<String>,
}

impl ChangeSet {
    /// Returns `true` when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Returns the total number of changed keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// Diffs two keyed maps, comparing content for modification.
    fn between<V: PartialEq>(old: &BTreeMap<String, V>, new: &BTreeMap<String, V>) -> Self {
        let old_keys: BTreeSet<&String> = old.keys().collect();
        let new_keys: BTreeSet<&String> = new.keys().collect();
        Self {
            added: new_keys.difference(&old_keys).map(|key| (*key).clone()).collect(),
            removed: old_keys.difference(&new_keys).map(|key| (*key).clone()).collect(),
            modified: old_keys
                .intersection(&new_keys)
                .filter(|key| old.get(**key) != new.get(**key))
                .map(|key| (*key).clone())
                .collect(),
        }
    }
}

// ============================================================================
// SECTION: Definition Diff
// ============================================================================

/// Structural difference between two definitions of one machine type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionDiff {
    /// Version of the older definition.
    pub from_version: DefinitionVersion,
    /// Version of the newer definition.
    pub to_version: DefinitionVersion,
    /// State additions and removals (states have no comparable content).
    pub state_changes: ChangeSet,
    /// Trigger additions, removals, and arity changes.
    pub trigger_changes: ChangeSet,
    /// Transition-row changes keyed `state->trigger`; modified rows have a
    /// different ordered target list.
    pub transition_changes: ChangeSet,
    /// Guard-list changes keyed `state->trigger`; modified rows have a
    /// different ordered guard-name list.
    pub guard_changes: ChangeSet,
}

impl DefinitionDiff {
    /// Computes the structural diff between two definitions.
    #[must_use]
    pub fn between(old: &MachineDefinition, new: &MachineDefinition) -> Self {
        let states = |definition: &MachineDefinition| -> BTreeMap<String, ()> {
            definition.states().into_iter().map(|state| (state.to_string(), ())).collect()
        };
        let triggers = |definition: &MachineDefinition| -> BTreeMap<String, usize> {
            definition
                .triggers()
                .into_iter()
                .map(|trigger| {
                    let arity = definition.arity(&trigger).map_or(0, |arity| arity.count());
                    (trigger.to_string(), arity)
                })
                .collect()
        };
        let transitions = |definition: &MachineDefinition| -> BTreeMap<String, Vec<String>> {
            let mut rows = BTreeMap::new();
            for region in definition.regions() {
                for (state, by_trigger) in &region.transitions {
                    for (trigger, rules) in by_trigger {
                        let targets: Vec<String> =
                            rules.iter().map(|rule| rule.target.to_string()).collect();
                        rows.insert(format!("{state}->{trigger}"), targets);
                    }
                }
            }
            rows
        };
        let guards = |definition: &MachineDefinition| -> BTreeMap<String, Vec<String>> {
            let mut rows = BTreeMap::new();
            for region in definition.regions() {
                for (state, by_trigger) in &region.transitions {
                    for (trigger, rules) in by_trigger {
                        let names: Vec<String> = rules
                            .iter()
                            .flat_map(|rule| {
                                rule.guards.iter().map(|guard| guard.name().to_string())
                            })
                            .collect();
                        if !names.is_empty() {
                            rows.insert(format!("{state}->{trigger}"), names);
                        }
                    }
                }
            }
            rows
        };

        Self {
            from_version: old.version(),
            to_version: new.version(),
            state_changes: ChangeSet::between(&states(old), &states(new)),
            trigger_changes: ChangeSet::between(&triggers(old), &triggers(new)),
            transition_changes: ChangeSet::between(&transitions(old), &transitions(new)),
            guard_changes: ChangeSet::between(&guards(old), &guards(new)),
        }
    }

    /// Returns the total number of structural changes.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.state_changes.len()
            + self.trigger_changes.len()
            + self.transition_changes.len()
            + self.guard_changes.len()
    }

    /// Returns `true` when the definitions are structurally identical.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.change_count() == 0
    }

    /// Returns `true` when anything was removed.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        !self.state_changes.removed.is_empty()
            || !self.trigger_changes.removed.is_empty()
            || !self.transition_changes.removed.is_empty()
    }
}

// ============================================================================
// SECTION: Diff Context
// ============================================================================

/// Coarse change complexity used for migration effort estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeComplexity {
    /// A handful of localized changes.
    Low,
    /// Several coordinated changes.
    Medium,
    /// Broad structural rework.
    High,
}

/// Diff plus the host-supplied flags the rules evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffContext {
    /// Structural diff.
    pub diff: DefinitionDiff,
    /// The persisted event/snapshot format changed.
    pub data_format_changed: bool,
    /// Existing entities need a data migration.
    pub requires_migration: bool,
    /// Coarse change complexity.
    pub complexity: ChangeComplexity,
}

impl DiffContext {
    /// Builds a context with flags derived from the structure: removals
    /// imply a migration, complexity follows the change count. Callers
    /// override the flags when they know better.
    #[must_use]
    pub fn new(diff: DefinitionDiff) -> Self {
        let requires_migration = diff.has_removals();
        let complexity = match diff.change_count() {
            0 ..= 3 => ChangeComplexity::Low,
            4 ..= 10 => ChangeComplexity::Medium,
            _ => ChangeComplexity::High,
        };
        Self {
            diff,
            data_format_changed: false,
            requires_migration,
            complexity,
        }
    }

    /// Marks the persisted data format as changed.
    #[must_use]
    pub const fn with_data_format_changed(mut self) -> Self {
        self.data_format_changed = true;
        self
    }

    /// Forces the migration flag.
    #[must_use]
    pub const fn with_requires_migration(mut self, requires: bool) -> Self {
        self.requires_migration = requires;
        self
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
    use std::sync::Arc;

    use statecraft_core::DefinitionBuilder;
    use statecraft_core::DefinitionVersion;
    use statecraft_core::MachineDefinition;
    use statecraft_core::guard;

    use super::DefinitionDiff;

    fn v1() -> Arc<MachineDefinition> {
        DefinitionBuilder::new("Order", DefinitionVersion::new(1, 2, 3))
            .state("Draft")
            .state("Submitted")
            .state("Paid")
            .initial("Draft")
            .trigger_with_arity("Submit", 1)
            .guarded_transition(
                "Draft",
                "Submit",
                "Submitted",
                guard("items > 0", |_| true),
            )
            .transition("Submitted", "Pay", "Paid")
            .build()
            .expect("build v1")
    }

    #[test]
    fn identical_definitions_diff_empty() {
        let diff = DefinitionDiff::between(&v1(), &v1());
        assert!(diff.is_unchanged());
        assert!(!diff.has_removals());
    }

    #[test]
    fn removed_states_and_rows_are_detected() {
        let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(2, 0, 0))
            .state("Submitted")
            .state("Paid")
            .initial("Submitted")
            .transition("Submitted", "Pay", "Paid")
            .build()
            .expect("build v2");
        let diff = DefinitionDiff::between(&v1(), &v2);
        assert_eq!(diff.state_changes.removed, vec!["Draft".to_string()]);
        assert_eq!(diff.trigger_changes.removed, vec!["Submit".to_string()]);
        assert_eq!(diff.transition_changes.removed, vec!["Draft->Submit".to_string()]);
        assert!(diff.has_removals());
    }

    #[test]
    fn guard_and_arity_modifications_are_detected() {
        let v2 = DefinitionBuilder::new("Order", DefinitionVersion::new(1, 3, 0))
            .state("Draft")
            .state("Submitted")
            .state("Paid")
            .initial("Draft")
            .trigger_with_arity("Submit", 2)
            .guarded_transition(
                "Draft",
                "Submit",
                "Submitted",
                guard("items > 0 and paid", |_| true),
            )
            .transition("Submitted", "Pay", "Paid")
            .build()
            .expect("build v2");
        let diff = DefinitionDiff::between(&v1(), &v2);
        assert_eq!(diff.trigger_changes.modified, vec!["Submit".to_string()]);
        assert_eq!(diff.guard_changes.modified, vec!["Draft->Submit".to_string()]);
    }
}
