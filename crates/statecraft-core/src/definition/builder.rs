// crates/statecraft-core/src/definition/builder.rs
// ============================================================================
// Module: Statecraft Definition Builder
// Description: Fluent construction of validated machine definitions.
// Purpose: Assemble states, triggers, transitions, and regions safely.
// Dependencies: crate::core, crate::definition
// ============================================================================

//! ## Overview
//! The builder assembles a [`MachineDefinition`] programmatically: declare
//! states (optionally nested and with hooks), declare triggers with their
//! arities, add plain or guarded transitions, and optionally add further
//! orthogonal regions. `build` runs full validation, so definition errors
//! surface before any entity runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::args::TriggerArity;
use crate::core::identifiers::MachineTypeId;
use crate::core::identifiers::RegionId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;
use crate::core::version::DefinitionVersion;
use crate::definition::callbacks::EntryHook;
use crate::definition::callbacks::ExitHook;
use crate::definition::callbacks::Guard;
use crate::definition::model::DefinitionError;
use crate::definition::model::MachineDefinition;
use crate::definition::model::RegionDefinition;
use crate::definition::model::StateNode;
use crate::definition::model::TransitionRule;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Region id assigned to the builder's primary region.
pub const PRIMARY_REGION: &str = "main";

// ============================================================================
// SECTION: State Configuration
// ============================================================================

/// Per-state configuration applied while declaring a state.
#[derive(Default)]
pub struct StateConfig {
    /// Optional parent state.
    parent: Option<StateId>,
    /// Entry hooks in declaration order.
    entry_hooks: Vec<Arc<dyn EntryHook>>,
    /// Exit hooks in declaration order.
    exit_hooks: Vec<Arc<dyn ExitHook>>,
    /// Entry hooks bound to a specific inbound trigger.
    entry_from: BTreeMap<TriggerId, Vec<Arc<dyn EntryHook>>>,
}

impl StateConfig {
    /// Nests the state under `parent`.
    #[must_use]
    pub fn substate_of(mut self, parent: impl Into<StateId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Adds an entry hook.
    #[must_use]
    pub fn on_entry(mut self, hook: Arc<dyn EntryHook>) -> Self {
        self.entry_hooks.push(hook);
        self
    }

    /// Adds an exit hook.
    #[must_use]
    pub fn on_exit(mut self, hook: Arc<dyn ExitHook>) -> Self {
        self.exit_hooks.push(hook);
        self
    }

    /// Adds an entry hook that only runs when the state is entered via
    /// `trigger`.
    #[must_use]
    pub fn on_entry_from(mut self, trigger: impl Into<TriggerId>, hook: Arc<dyn EntryHook>) -> Self {
        self.entry_from.entry(trigger.into()).or_default().push(hook);
        self
    }

    /// Converts the configuration into a state node.
    fn into_node(self) -> StateNode {
        StateNode {
            parent: self.parent,
            entry_hooks: self.entry_hooks,
            exit_hooks: self.exit_hooks,
            entry_from: self.entry_from,
        }
    }
}

// ============================================================================
// SECTION: Region Builder
// ============================================================================

/// Builder for one region's states and transitions.
#[derive(Default)]
pub struct RegionBuilder {
    /// Declared initial state.
    initial: Option<StateId>,
    /// Declared states.
    states: BTreeMap<StateId, StateNode>,
    /// Transition table under construction.
    transitions: BTreeMap<StateId, BTreeMap<TriggerId, Vec<TransitionRule>>>,
    /// Triggers referenced by this region with the arity implied at the
    /// reference site (0 unless declared on the machine builder).
    referenced_triggers: Vec<TriggerId>,
}

impl RegionBuilder {
    /// Declares a plain state.
    #[must_use]
    pub fn state(self, id: impl Into<StateId>) -> Self {
        self.state_with(id, |config| config)
    }

    /// Declares a state with configuration (nesting, hooks).
    #[must_use]
    pub fn state_with(
        mut self,
        id: impl Into<StateId>,
        configure: impl FnOnce(StateConfig) -> StateConfig,
    ) -> Self {
        let node = configure(StateConfig::default()).into_node();
        self.states.insert(id.into(), node);
        self
    }

    /// Marks the initial state of the region.
    #[must_use]
    pub fn initial(mut self, id: impl Into<StateId>) -> Self {
        self.initial = Some(id.into());
        self
    }

    /// Adds an unguarded transition.
    #[must_use]
    pub fn transition(
        self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
    ) -> Self {
        self.push_rule(from.into(), trigger.into(), TransitionRule {
            target: to.into(),
            guards: Vec::new(),
        })
    }

    /// Adds a transition gated by a single guard.
    #[must_use]
    pub fn guarded_transition(
        self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
        guard: Arc<dyn Guard>,
    ) -> Self {
        self.push_rule(from.into(), trigger.into(), TransitionRule {
            target: to.into(),
            guards: vec![guard],
        })
    }

    /// Adds a transition gated by several guards that must all pass.
    #[must_use]
    pub fn guarded_transition_all(
        self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
        guards: Vec<Arc<dyn Guard>>,
    ) -> Self {
        self.push_rule(from.into(), trigger.into(), TransitionRule {
            target: to.into(),
            guards,
        })
    }

    /// Appends a rule preserving declaration order (first satisfied rule
    /// wins at dispatch).
    fn push_rule(mut self, from: StateId, trigger: TriggerId, rule: TransitionRule) -> Self {
        self.referenced_triggers.push(trigger.clone());
        self.transitions.entry(from).or_default().entry(trigger).or_default().push(rule);
        self
    }

    /// Finishes the region.
    fn into_region(self, id: RegionId) -> Result<RegionDefinition, DefinitionError> {
        let initial = self.initial.ok_or_else(|| DefinitionError::MissingInitialState(id.clone()))?;
        Ok(RegionDefinition {
            id,
            initial,
            states: self.states,
            transitions: self.transitions,
        })
    }
}

// ============================================================================
// SECTION: Definition Builder
// ============================================================================

/// Fluent builder for [`MachineDefinition`].
///
/// # Invariants
/// - Triggers referenced by transitions but never declared explicitly
///   default to arity 0.
pub struct DefinitionBuilder {
    /// Machine type under construction.
    machine_type: MachineTypeId,
    /// Definition version under construction.
    version: DefinitionVersion,
    /// Primary region builder.
    primary: RegionBuilder,
    /// Additional orthogonal regions in declaration order.
    extra_regions: Vec<(RegionId, RegionBuilder)>,
    /// Explicitly declared trigger arities.
    arities: BTreeMap<TriggerId, TriggerArity>,
    /// First arity conflict observed, surfaced at build.
    arity_conflict: Option<DefinitionError>,
}

impl DefinitionBuilder {
    /// Starts a builder for `(machine_type, version)`.
    #[must_use]
    pub fn new(machine_type: impl Into<MachineTypeId>, version: DefinitionVersion) -> Self {
        Self {
            machine_type: machine_type.into(),
            version,
            primary: RegionBuilder::default(),
            extra_regions: Vec::new(),
            arities: BTreeMap::new(),
            arity_conflict: None,
        }
    }

    /// Declares a plain state in the primary region.
    #[must_use]
    pub fn state(mut self, id: impl Into<StateId>) -> Self {
        self.primary = self.primary.state(id);
        self
    }

    /// Declares a configured state in the primary region.
    #[must_use]
    pub fn state_with(
        mut self,
        id: impl Into<StateId>,
        configure: impl FnOnce(StateConfig) -> StateConfig,
    ) -> Self {
        self.primary = self.primary.state_with(id, configure);
        self
    }

    /// Marks the initial state of the primary region.
    #[must_use]
    pub fn initial(mut self, id: impl Into<StateId>) -> Self {
        self.primary = self.primary.initial(id);
        self
    }

    /// Declares a trigger with arity 0.
    #[must_use]
    pub fn trigger(self, id: impl Into<TriggerId>) -> Self {
        self.declare_arity(id.into(), TriggerArity::NONE)
    }

    /// Declares a trigger carrying `arity` arguments (0..=3).
    ///
    /// Arities above the maximum are reported at `build` as an arity
    /// conflict against the maximum.
    #[must_use]
    pub fn trigger_with_arity(self, id: impl Into<TriggerId>, arity: usize) -> Self {
        let trigger = id.into();
        match TriggerArity::new(arity) {
            Ok(declared) => self.declare_arity(trigger, declared),
            Err(_) => {
                let mut next = self;
                if next.arity_conflict.is_none() {
                    next.arity_conflict = Some(DefinitionError::ArityConflict {
                        trigger,
                        first: crate::core::args::MAX_TRIGGER_ARITY,
                        second: arity,
                    });
                }
                next
            }
        }
    }

    /// Adds an unguarded transition in the primary region.
    #[must_use]
    pub fn transition(
        mut self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
    ) -> Self {
        self.primary = self.primary.transition(from, trigger, to);
        self
    }

    /// Adds a guarded transition in the primary region.
    #[must_use]
    pub fn guarded_transition(
        mut self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
        guard: Arc<dyn Guard>,
    ) -> Self {
        self.primary = self.primary.guarded_transition(from, trigger, to, guard);
        self
    }

    /// Adds a multi-guard transition in the primary region.
    #[must_use]
    pub fn guarded_transition_all(
        mut self,
        from: impl Into<StateId>,
        trigger: impl Into<TriggerId>,
        to: impl Into<StateId>,
        guards: Vec<Arc<dyn Guard>>,
    ) -> Self {
        self.primary = self.primary.guarded_transition_all(from, trigger, to, guards);
        self
    }

    /// Adds an orthogonal region configured through a nested builder.
    #[must_use]
    pub fn region(
        mut self,
        id: impl Into<RegionId>,
        configure: impl FnOnce(RegionBuilder) -> RegionBuilder,
    ) -> Self {
        self.extra_regions.push((id.into(), configure(RegionBuilder::default())));
        self
    }

    /// Records an arity declaration, remembering the first conflict.
    fn declare_arity(mut self, trigger: TriggerId, arity: TriggerArity) -> Self {
        if let Some(existing) = self.arities.get(&trigger) {
            if *existing != arity && self.arity_conflict.is_none() {
                self.arity_conflict = Some(DefinitionError::ArityConflict {
                    trigger: trigger.clone(),
                    first: existing.count(),
                    second: arity.count(),
                });
            }
        } else {
            self.arities.insert(trigger, arity);
        }
        self
    }

    /// Validates and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when arities conflict or the assembled
    /// definition fails validation.
    pub fn build(mut self) -> Result<Arc<MachineDefinition>, DefinitionError> {
        if let Some(conflict) = self.arity_conflict {
            return Err(conflict);
        }
        // Triggers referenced only by transitions default to arity 0.
        let referenced: Vec<TriggerId> = self
            .primary
            .referenced_triggers
            .iter()
            .chain(self.extra_regions.iter().flat_map(|(_, region)| &region.referenced_triggers))
            .cloned()
            .collect();
        for trigger in referenced {
            self.arities.entry(trigger).or_insert(TriggerArity::NONE);
        }

        let mut regions = Vec::with_capacity(1 + self.extra_regions.len());
        regions.push(self.primary.into_region(RegionId::new(PRIMARY_REGION))?);
        for (id, region) in self.extra_regions {
            regions.push(region.into_region(id)?);
        }
        MachineDefinition::new(self.machine_type, self.version, regions, self.arities)
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
    use super::DefinitionBuilder;
    use crate::core::identifiers::StateId;
    use crate::core::identifiers::TriggerId;
    use crate::core::version::DefinitionVersion;
    use crate::definition::callbacks::guard;
    use crate::definition::model::DefinitionError;

    #[test]
    fn builder_assembles_a_simple_order_machine() {
        let definition = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Created")
            .state("PaymentPending")
            .state("Paid")
            .initial("Created")
            .transition("Created", "Submit", "PaymentPending")
            .transition("PaymentPending", "Pay", "Paid")
            .build()
            .expect("build definition");
        assert_eq!(definition.initial(), &StateId::new("Created"));
        assert_eq!(definition.states().len(), 3);
        assert!(definition.triggers().contains(&TriggerId::new("Submit")));
    }

    #[test]
    fn unknown_transition_target_is_rejected() {
        let result = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Created")
            .initial("Created")
            .transition("Created", "Submit", "Missing")
            .build();
        assert!(matches!(result, Err(DefinitionError::UnknownState(state)) if state.as_str() == "Missing"));
    }

    #[test]
    fn missing_initial_state_is_rejected() {
        let result = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Created")
            .build();
        assert!(matches!(result, Err(DefinitionError::MissingInitialState(_))));
    }

    #[test]
    fn cyclic_hierarchy_is_rejected() {
        let result = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state_with("A", |state| state.substate_of("B"))
            .state_with("B", |state| state.substate_of("A"))
            .initial("A")
            .build();
        assert!(matches!(result, Err(DefinitionError::CyclicHierarchy(_))));
    }

    #[test]
    fn duplicate_state_across_regions_is_rejected() {
        let result = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Created")
            .initial("Created")
            .region("audit", |region| region.state("Created").initial("Created"))
            .build();
        assert!(matches!(result, Err(DefinitionError::DuplicateRegionState(_))));
    }

    #[test]
    fn conflicting_arity_declarations_are_rejected() {
        let result = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Created")
            .initial("Created")
            .trigger_with_arity("Pay", 1)
            .trigger_with_arity("Pay", 2)
            .build();
        assert!(matches!(result, Err(DefinitionError::ArityConflict { .. })));
    }

    #[test]
    fn guards_attach_to_transitions() {
        let definition = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
            .state("Draft")
            .state("Submitted")
            .initial("Draft")
            .trigger_with_arity("Submit", 1)
            .guarded_transition(
                "Draft",
                "Submit",
                "Submitted",
                guard("items > 0", |ctx| ctx.args.arg::<i64>(0).is_ok_and(|n| n > 0)),
            )
            .build()
            .expect("build definition");
        let args = crate::core::args::TriggerArgs::one(0).expect("args");
        assert!(!definition.permits(
            &StateId::new("Draft"),
            &TriggerId::new("Submit"),
            &args
        ));
    }
}
