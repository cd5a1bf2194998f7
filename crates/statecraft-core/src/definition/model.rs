// crates/statecraft-core/src/definition/model.rs
// ============================================================================
// Module: Statecraft Definition Model
// Description: Immutable machine definitions with states, triggers, regions.
// Purpose: Provide the validated, shared description the engine evaluates.
// Dependencies: crate::core, crate::definition::callbacks
// ============================================================================

//! ## Overview
//! A machine definition is the immutable description of one state-machine
//! family: states with an optional parent forest, triggers with declared
//! arities, a guarded transition table, entry/exit hooks, and one or more
//! orthogonal regions sharing the trigger alphabet. Definitions are loaded
//! once per `(machine_type, version)`, validated at build time, and shared
//! across entities behind an [`Arc`](std::sync::Arc) without locking.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::args::TriggerArgs;
use crate::core::args::TriggerArity;
use crate::core::identifiers::GuardName;
use crate::core::identifiers::MachineTypeId;
use crate::core::identifiers::RegionId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;
use crate::core::version::DefinitionVersion;
use crate::definition::callbacks::EntryHook;
use crate::definition::callbacks::ExitHook;
use crate::definition::callbacks::Guard;
use crate::definition::callbacks::GuardContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Definition build errors. Detected when a definition is built; fatal and
/// never reach runtime.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A transition, parent link, or initial marker references an
    /// undeclared state.
    #[error("unknown state referenced by definition: {0}")]
    UnknownState(StateId),
    /// A transition references an undeclared trigger.
    #[error("unknown trigger referenced by definition: {0}")]
    UnknownTrigger(TriggerId),
    /// The parent map contains a cycle through the named state.
    #[error("cyclic state hierarchy detected at: {0}")]
    CyclicHierarchy(StateId),
    /// The same state id is declared in more than one region.
    #[error("state {0} is declared in more than one region")]
    DuplicateRegionState(StateId),
    /// A region declares no initial state.
    #[error("region {0} has no initial state")]
    MissingInitialState(RegionId),
    /// The same trigger was declared with two different arities.
    #[error("trigger {trigger} declared with conflicting arities {first} and {second}")]
    ArityConflict {
        /// Conflicting trigger.
        trigger: TriggerId,
        /// First declared arity.
        first: usize,
        /// Later conflicting arity.
        second: usize,
    },
    /// The definition declares no regions.
    #[error("definition declares no regions")]
    NoRegions,
}

// ============================================================================
// SECTION: Transition Rules
// ============================================================================

/// One guarded transition rule out of `(state, trigger)`.
///
/// # Invariants
/// - A rule with no guards always passes.
/// - Among rules declared for the same `(state, trigger)`, the first whose
///   guards all pass wins.
#[derive(Clone)]
pub struct TransitionRule {
    /// Target state of the rule.
    pub target: StateId,
    /// Guards that must all pass for the rule to fire.
    pub guards: Vec<Arc<dyn Guard>>,
}

impl TransitionRule {
    /// Evaluates the rule's guards, returning the names of those that fail.
    #[must_use]
    pub fn unmet_guards(&self, ctx: &GuardContext<'_>) -> Vec<GuardName> {
        self.guards
            .iter()
            .filter(|guard| !guard.check(ctx))
            .map(|guard| guard.name().clone())
            .collect()
    }
}

impl fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRule")
            .field("target", &self.target)
            .field("guards", &self.guards.len())
            .finish()
    }
}

// ============================================================================
// SECTION: State Nodes
// ============================================================================

/// Declared state with hierarchy link and hooks.
#[derive(Clone, Default)]
pub struct StateNode {
    /// Optional parent in the state forest.
    pub parent: Option<StateId>,
    /// Hooks invoked when the state is entered.
    pub entry_hooks: Vec<Arc<dyn EntryHook>>,
    /// Hooks invoked when the state is exited.
    pub exit_hooks: Vec<Arc<dyn ExitHook>>,
    /// Hooks invoked when the state is entered via a specific trigger.
    pub entry_from: BTreeMap<TriggerId, Vec<Arc<dyn EntryHook>>>,
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("parent", &self.parent)
            .field("entry_hooks", &self.entry_hooks.len())
            .field("exit_hooks", &self.exit_hooks.len())
            .field("entry_from", &self.entry_from.len())
            .finish()
    }
}

// ============================================================================
// SECTION: Region Definition
// ============================================================================

/// One orthogonal region: a disjoint sub-definition with its own initial
/// state, sharing the machine's trigger alphabet.
#[derive(Debug, Clone)]
pub struct RegionDefinition {
    /// Region identifier.
    pub id: RegionId,
    /// Initial state entered on fresh activation.
    pub initial: StateId,
    /// Declared states keyed by id.
    pub states: BTreeMap<StateId, StateNode>,
    /// Transition table: `(state, trigger)` to ordered rules.
    pub transitions: BTreeMap<StateId, BTreeMap<TriggerId, Vec<TransitionRule>>>,
}

impl RegionDefinition {
    /// Returns `true` when the region declares `state`.
    #[must_use]
    pub fn declares(&self, state: &StateId) -> bool {
        self.states.contains_key(state)
    }

    /// Returns the declared rules for `(state, trigger)`, if any.
    #[must_use]
    pub fn rules(&self, state: &StateId, trigger: &TriggerId) -> Option<&[TransitionRule]> {
        self.transitions
            .get(state)
            .and_then(|by_trigger| by_trigger.get(trigger))
            .map(Vec::as_slice)
    }

    /// Returns the parent of `state`, when declared.
    #[must_use]
    pub fn parent(&self, state: &StateId) -> Option<&StateId> {
        self.states.get(state).and_then(|node| node.parent.as_ref())
    }

    /// Returns `state` followed by its ancestors, leaf first.
    #[must_use]
    pub fn self_and_ancestors(&self, state: &StateId) -> Vec<StateId> {
        let mut chain = Vec::new();
        let mut cursor = Some(state.clone());
        while let Some(current) = cursor {
            cursor = self.parent(&current).cloned();
            chain.push(current);
            if chain.len() > self.states.len() {
                break;
            }
        }
        chain
    }

    /// Returns `true` iff `ancestor` equals `state` or is a transitive
    /// parent of it.
    #[must_use]
    pub fn is_in(&self, state: &StateId, ancestor: &StateId) -> bool {
        self.self_and_ancestors(state).iter().any(|candidate| candidate == ancestor)
    }

    /// Resolves the handling level for `trigger` from `leaf`: the first
    /// state on the ancestor chain that declares any rule for the trigger.
    /// Guard rejection at that level is final; outer levels do not shadow
    /// an inner handler.
    #[must_use]
    pub fn resolve_handler(&self, leaf: &StateId, trigger: &TriggerId) -> Option<StateId> {
        self.self_and_ancestors(leaf)
            .into_iter()
            .find(|state| self.rules(state, trigger).is_some_and(|rules| !rules.is_empty()))
    }

    /// Returns the set of triggers with at least one declared rule
    /// reachable from `leaf` (leaf or any ancestor).
    #[must_use]
    pub fn reachable_triggers(&self, leaf: &StateId) -> BTreeSet<TriggerId> {
        let mut triggers = BTreeSet::new();
        for state in self.self_and_ancestors(leaf) {
            if let Some(by_trigger) = self.transitions.get(&state) {
                triggers.extend(by_trigger.keys().cloned());
            }
        }
        triggers
    }
}

// ============================================================================
// SECTION: Machine Definition
// ============================================================================

/// Immutable machine definition identified by `(machine_type, version)`.
///
/// # Invariants
/// - Validated at build time: every referenced state and trigger is
///   declared, the parent graph is a forest, and region state sets are
///   disjoint.
/// - Shared immutably; evaluation never mutates the definition.
#[derive(Clone)]
pub struct MachineDefinition {
    /// Machine type identifier.
    machine_type: MachineTypeId,
    /// Definition version.
    version: DefinitionVersion,
    /// Ordered orthogonal regions; single-region machines have exactly one.
    regions: Vec<RegionDefinition>,
    /// Declared arity per trigger.
    arities: BTreeMap<TriggerId, TriggerArity>,
}

impl MachineDefinition {
    /// Assembles a definition and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] when referential integrity, hierarchy, or
    /// region-disjointness checks fail.
    pub fn new(
        machine_type: MachineTypeId,
        version: DefinitionVersion,
        regions: Vec<RegionDefinition>,
        arities: BTreeMap<TriggerId, TriggerArity>,
    ) -> Result<Arc<Self>, DefinitionError> {
        let definition = Self {
            machine_type,
            version,
            regions,
            arities,
        };
        definition.validate()?;
        Ok(Arc::new(definition))
    }

    /// Returns the machine type identifier.
    #[must_use]
    pub const fn machine_type(&self) -> &MachineTypeId {
        &self.machine_type
    }

    /// Returns the definition version.
    #[must_use]
    pub const fn version(&self) -> DefinitionVersion {
        self.version
    }

    /// Returns the ordered regions.
    #[must_use]
    pub fn regions(&self) -> &[RegionDefinition] {
        &self.regions
    }

    /// Returns the primary (first declared) region.
    ///
    /// # Panics
    ///
    /// Never panics: validation rejects definitions with no regions.
    #[must_use]
    pub fn primary_region(&self) -> &RegionDefinition {
        // Validation guarantees at least one region.
        &self.regions[0]
    }

    /// Returns the initial state of the primary region.
    #[must_use]
    pub fn initial(&self) -> &StateId {
        &self.primary_region().initial
    }

    /// Returns every declared state across all regions.
    #[must_use]
    pub fn states(&self) -> BTreeSet<StateId> {
        self.regions
            .iter()
            .flat_map(|region| region.states.keys().cloned())
            .collect()
    }

    /// Returns every declared trigger.
    #[must_use]
    pub fn triggers(&self) -> BTreeSet<TriggerId> {
        self.arities.keys().cloned().collect()
    }

    /// Returns the declared arity for `trigger`, when the trigger exists.
    #[must_use]
    pub fn arity(&self, trigger: &TriggerId) -> Option<TriggerArity> {
        self.arities.get(trigger).copied()
    }

    /// Returns the region declaring `state`, when any does.
    #[must_use]
    pub fn region_of(&self, state: &StateId) -> Option<&RegionDefinition> {
        self.regions.iter().find(|region| region.declares(state))
    }

    /// Returns the parent of `state`, when declared.
    #[must_use]
    pub fn parent(&self, state: &StateId) -> Option<&StateId> {
        self.region_of(state).and_then(|region| region.parent(state))
    }

    /// Returns `state` followed by its ancestors, leaf first.
    #[must_use]
    pub fn ancestors(&self, state: &StateId) -> Vec<StateId> {
        self.region_of(state)
            .map(|region| region.self_and_ancestors(state))
            .unwrap_or_default()
    }

    /// Returns `true` iff `ancestor` equals `state` or transitively
    /// contains it.
    #[must_use]
    pub fn is_in(&self, state: &StateId, ancestor: &StateId) -> bool {
        self.region_of(state).is_some_and(|region| region.is_in(state, ancestor))
    }

    /// Returns the entry/exit hook node for `state`, when declared.
    #[must_use]
    pub fn hooks(&self, state: &StateId) -> Option<&StateNode> {
        self.region_of(state).and_then(|region| region.states.get(state))
    }

    /// Returns `true` when a fire of `trigger` from `state` with `args`
    /// would select a rule (guards evaluated, hierarchy resolved).
    #[must_use]
    pub fn permits(&self, state: &StateId, trigger: &TriggerId, args: &TriggerArgs) -> bool {
        let Some(region) = self.region_of(state) else {
            return false;
        };
        let Some(handler) = region.resolve_handler(state, trigger) else {
            return false;
        };
        let ctx = GuardContext {
            from: state,
            trigger,
            args,
        };
        region
            .rules(&handler, trigger)
            .is_some_and(|rules| rules.iter().any(|rule| rule.unmet_guards(&ctx).is_empty()))
    }

    /// Validates referential integrity, hierarchy acyclicity, and region
    /// disjointness.
    fn validate(&self) -> Result<(), DefinitionError> {
        if self.regions.is_empty() {
            return Err(DefinitionError::NoRegions);
        }
        let mut seen_states: BTreeSet<&StateId> = BTreeSet::new();
        for region in &self.regions {
            if !region.states.contains_key(&region.initial) {
                return Err(DefinitionError::UnknownState(region.initial.clone()));
            }
            for state in region.states.keys() {
                if !seen_states.insert(state) {
                    return Err(DefinitionError::DuplicateRegionState(state.clone()));
                }
            }
            Self::validate_hierarchy(region)?;
            Self::validate_transitions(region, &self.arities)?;
        }
        Ok(())
    }

    /// Validates that parent links reference declared states and form a
    /// forest.
    fn validate_hierarchy(region: &RegionDefinition) -> Result<(), DefinitionError> {
        for (state, node) in &region.states {
            if let Some(parent) = &node.parent
                && !region.states.contains_key(parent)
            {
                return Err(DefinitionError::UnknownState(parent.clone()));
            }
            let mut cursor = region.parent(state).cloned();
            let mut steps = 0usize;
            while let Some(current) = cursor {
                if &current == state {
                    return Err(DefinitionError::CyclicHierarchy(state.clone()));
                }
                steps += 1;
                if steps > region.states.len() {
                    return Err(DefinitionError::CyclicHierarchy(state.clone()));
                }
                cursor = region.parent(&current).cloned();
            }
        }
        Ok(())
    }

    /// Validates that transition rows reference declared states and
    /// triggers.
    fn validate_transitions(
        region: &RegionDefinition,
        arities: &BTreeMap<TriggerId, TriggerArity>,
    ) -> Result<(), DefinitionError> {
        for (source, by_trigger) in &region.transitions {
            if !region.states.contains_key(source) {
                return Err(DefinitionError::UnknownState(source.clone()));
            }
            for (trigger, rules) in by_trigger {
                if !arities.contains_key(trigger) {
                    return Err(DefinitionError::UnknownTrigger(trigger.clone()));
                }
                for rule in rules {
                    if !region.states.contains_key(&rule.target) {
                        return Err(DefinitionError::UnknownState(rule.target.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MachineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("machine_type", &self.machine_type)
            .field("version", &self.version)
            .field("regions", &self.regions.len())
            .field("triggers", &self.arities.len())
            .finish()
    }
}
