// crates/statecraft-core/src/machine/engine.rs
// ============================================================================
// Module: Statecraft Machine Engine
// Description: Deterministic in-memory evaluator for machine definitions.
// Purpose: Plan and apply guarded, hierarchical, multi-region transitions.
// Dependencies: crate::core, crate::definition, crate::machine
// ============================================================================

//! ## Overview
//! The engine holds one leaf state per region and evaluates fires against
//! the shared definition. Evaluation is CPU-only and non-blocking: `plan`
//! is pure, `apply` runs the synchronous hooks and mutates the leaf states,
//! and `fire` combines both. Guard predicates may be invoked multiple times
//! per call; `permitted` probes re-evaluate them.
//!
//! Hooks must not fire triggers. A thread-local scope is set while hooks
//! run; any `plan`, `apply`, or `fire` entered under that scope fails with
//! [`TransitionError::ReentrancyViolation`] before any side effect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::args::TriggerArgs;
use crate::core::identifiers::GuardName;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;
use crate::definition::callbacks::GuardContext;
use crate::definition::callbacks::HookContext;
use crate::definition::model::MachineDefinition;
use crate::definition::model::RegionDefinition;
use crate::machine::error::TransitionError;
use crate::machine::params::TriggerParameterCache;
use crate::machine::plan::CanFire;
use crate::machine::plan::FirePlan;
use crate::machine::plan::TransitionPlan;

// ============================================================================
// SECTION: Hook Re-Entrancy Scope
// ============================================================================

thread_local! {
    /// Set while entry/exit hooks run on this thread.
    static HOOK_SCOPE: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` when the current thread is inside hook execution.
#[must_use]
pub fn in_hook_scope() -> bool {
    HOOK_SCOPE.with(Cell::get)
}

/// RAII guard marking hook execution on the current thread.
struct HookScopeGuard {
    /// Scope value to restore on drop.
    previous: bool,
}

impl HookScopeGuard {
    /// Enters the hook scope.
    fn enter() -> Self {
        let previous = HOOK_SCOPE.with(|flag| flag.replace(true));
        Self {
            previous,
        }
    }
}

impl Drop for HookScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        HOOK_SCOPE.with(|flag| flag.set(previous));
    }
}

// ============================================================================
// SECTION: Machine
// ============================================================================

/// Live evaluator pairing a shared definition with per-region leaf states.
///
/// # Invariants
/// - `leaves[i]` is always a state declared by region `i`.
/// - Failed fires leave every leaf unchanged and run no hook.
#[derive(Debug, Clone)]
pub struct Machine {
    /// Shared immutable definition.
    definition: Arc<MachineDefinition>,
    /// Cached parameterized-trigger descriptors.
    parameters: Arc<TriggerParameterCache>,
    /// Current leaf state per region, in declared region order.
    leaves: Vec<StateId>,
}

impl Machine {
    /// Creates a machine at every region's initial state.
    #[must_use]
    pub fn new(definition: Arc<MachineDefinition>) -> Self {
        let leaves = definition.regions().iter().map(|region| region.initial.clone()).collect();
        let parameters = Arc::new(TriggerParameterCache::new());
        Self {
            definition,
            parameters,
            leaves,
        }
    }

    /// Creates a machine at explicitly restored leaf states, one per
    /// region in declared order. Used when rebuilding an entity from a
    /// snapshot; no hooks run.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::RegionCountMismatch`] when the state
    /// count differs from the region count, and
    /// [`TransitionError::UnknownRestoredState`] when a state is not
    /// declared by its region.
    pub fn restored(
        definition: Arc<MachineDefinition>,
        states: &[StateId],
    ) -> Result<Self, TransitionError> {
        let regions = definition.regions();
        if states.len() != regions.len() {
            return Err(TransitionError::RegionCountMismatch {
                expected: regions.len(),
                actual: states.len(),
            });
        }
        for (region, state) in regions.iter().zip(states) {
            if !region.declares(state) {
                return Err(TransitionError::UnknownRestoredState(state.clone()));
            }
        }
        let parameters = Arc::new(TriggerParameterCache::new());
        Ok(Self {
            definition,
            parameters,
            leaves: states.to_vec(),
        })
    }

    /// Returns the shared definition.
    #[must_use]
    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.definition
    }

    /// Returns the leaf state of the primary region.
    ///
    /// # Panics
    ///
    /// Never panics: machines always hold one leaf per region.
    #[must_use]
    pub fn current(&self) -> &StateId {
        &self.leaves[0]
    }

    /// Returns the leaf state per region, in declared region order.
    #[must_use]
    pub fn region_states(&self) -> &[StateId] {
        &self.leaves
    }

    /// Returns `true` iff any region's leaf equals `ancestor` or sits
    /// below it in the hierarchy.
    #[must_use]
    pub fn is_in(&self, ancestor: &StateId) -> bool {
        self.leaves.iter().any(|leaf| self.definition.is_in(leaf, ancestor))
    }

    /// Probes whether `trigger` would fire with `args`.
    ///
    /// Arity mismatches and undeclared triggers probe as refused with no
    /// unmet guards; `fire` reports them precisely.
    #[must_use]
    pub fn can_fire(&self, trigger: &TriggerId, args: &TriggerArgs) -> CanFire {
        match self.plan_internal(trigger, args) {
            Ok(_) => CanFire::permitted(),
            Err(TransitionError::GuardRejected {
                unmet, ..
            }) => CanFire::rejected(unmet),
            Err(_) => CanFire::rejected(Vec::new()),
        }
    }

    /// Returns the triggers that would currently fire with `args`.
    ///
    /// Guards are evaluated during the probe and may run multiple times.
    #[must_use]
    pub fn permitted(&self, args: &TriggerArgs) -> BTreeSet<TriggerId> {
        self.definition
            .triggers()
            .into_iter()
            .filter(|trigger| self.can_fire(trigger, args).allowed)
            .collect()
    }

    /// Returns the triggers with a reachable rule from any region's leaf,
    /// without evaluating guards or arities.
    #[must_use]
    pub fn reachable_triggers(&self) -> BTreeSet<TriggerId> {
        let mut triggers = BTreeSet::new();
        for (region, leaf) in self.definition.regions().iter().zip(&self.leaves) {
            triggers.extend(region.reachable_triggers(leaf));
        }
        triggers
    }

    /// Computes the plan for a fire without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the fire is refused; no state
    /// changes and no hook runs.
    pub fn plan(&self, trigger: &TriggerId, args: &TriggerArgs) -> Result<FirePlan, TransitionError> {
        if in_hook_scope() {
            return Err(TransitionError::ReentrancyViolation {
                trigger: trigger.clone(),
            });
        }
        self.plan_internal(trigger, args)
    }

    /// Applies a previously computed plan: runs exit hooks, performs the
    /// transitions, runs entry hooks, and updates the leaf states.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::ReentrancyViolation`] when called from
    /// inside a hook.
    pub fn apply(&mut self, plan: &FirePlan) -> Result<(), TransitionError> {
        if in_hook_scope() {
            return Err(TransitionError::ReentrancyViolation {
                trigger: plan.trigger.clone(),
            });
        }
        for region_plan in &plan.regions {
            self.apply_region(region_plan, &plan.trigger, &plan.args);
        }
        Ok(())
    }

    /// Plans and applies a fire in one call.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the fire is refused; no state
    /// changes and no hook runs.
    pub fn fire(
        &mut self,
        trigger: &TriggerId,
        args: &TriggerArgs,
    ) -> Result<FirePlan, TransitionError> {
        let plan = self.plan(trigger, args)?;
        self.apply(&plan)?;
        Ok(plan)
    }

    /// Shared planning path for probes and fires.
    fn plan_internal(
        &self,
        trigger: &TriggerId,
        args: &TriggerArgs,
    ) -> Result<FirePlan, TransitionError> {
        let Some(declared) = self.definition.arity(trigger) else {
            return Err(TransitionError::NoTransition {
                trigger: trigger.clone(),
                from: self.current().clone(),
            });
        };
        let descriptor = self.parameters.descriptor(trigger, declared);
        if descriptor.arity.count() != args.len() {
            return Err(TransitionError::ArityMismatch {
                trigger: trigger.clone(),
                expected: descriptor.arity.count(),
                actual: args.len(),
            });
        }

        let mut regions = Vec::new();
        for (region, leaf) in self.definition.regions().iter().zip(&self.leaves) {
            if let Some(plan) = Self::plan_region(region, leaf, trigger, args)? {
                regions.push(plan);
            }
        }
        if regions.is_empty() {
            return Err(TransitionError::NoTransition {
                trigger: trigger.clone(),
                from: self.current().clone(),
            });
        }
        Ok(FirePlan {
            trigger: trigger.clone(),
            args: args.clone(),
            regions,
        })
    }

    /// Plans one region's reaction to the trigger. `Ok(None)` means the
    /// region does not declare the trigger from its current leaf; a guard
    /// rejection aborts the entire fire.
    fn plan_region(
        region: &RegionDefinition,
        leaf: &StateId,
        trigger: &TriggerId,
        args: &TriggerArgs,
    ) -> Result<Option<TransitionPlan>, TransitionError> {
        let Some(handler) = region.resolve_handler(leaf, trigger) else {
            return Ok(None);
        };
        let ctx = GuardContext {
            from: leaf,
            trigger,
            args,
        };
        let Some(rules) = region.rules(&handler, trigger) else {
            return Ok(None);
        };
        let mut unmet: Vec<GuardName> = Vec::new();
        for rule in rules {
            let failures = rule.unmet_guards(&ctx);
            if failures.is_empty() {
                let (exit_chain, entry_chain) = Self::hook_chains(region, leaf, &rule.target);
                return Ok(Some(TransitionPlan {
                    region: region.id.clone(),
                    from: leaf.clone(),
                    to: rule.target.clone(),
                    exit_chain,
                    entry_chain,
                }));
            }
            unmet.extend(failures);
        }
        Err(TransitionError::GuardRejected {
            trigger: trigger.clone(),
            unmet,
        })
    }

    /// Computes exit and entry hook chains around the least common
    /// ancestor of `from` and `to` on the region's parent forest.
    fn hook_chains(
        region: &RegionDefinition,
        from: &StateId,
        to: &StateId,
    ) -> (Vec<StateId>, Vec<StateId>) {
        let from_chain = region.self_and_ancestors(from);
        let to_chain = region.self_and_ancestors(to);
        let lca = from_chain.iter().find(|candidate| to_chain.contains(*candidate)).cloned();

        let exit_chain: Vec<StateId> = match &lca {
            Some(ancestor) => {
                from_chain.iter().take_while(|state| *state != ancestor).cloned().collect()
            }
            None => from_chain,
        };
        let mut entry_chain: Vec<StateId> = match &lca {
            Some(ancestor) => {
                to_chain.iter().take_while(|state| *state != ancestor).cloned().collect()
            }
            None => to_chain,
        };
        entry_chain.reverse();
        (exit_chain, entry_chain)
    }

    /// Runs one region plan's hooks and updates its leaf state.
    fn apply_region(&mut self, plan: &TransitionPlan, trigger: &TriggerId, args: &TriggerArgs) {
        {
            let _scope = HookScopeGuard::enter();
            for state in &plan.exit_chain {
                if let Some(node) = self.definition.hooks(state) {
                    let ctx = HookContext {
                        state,
                        from: &plan.from,
                        to: &plan.to,
                        trigger,
                        args,
                    };
                    for hook in &node.exit_hooks {
                        hook.on_exit(&ctx);
                    }
                }
            }
            for state in &plan.entry_chain {
                if let Some(node) = self.definition.hooks(state) {
                    let ctx = HookContext {
                        state,
                        from: &plan.from,
                        to: &plan.to,
                        trigger,
                        args,
                    };
                    for hook in &node.entry_hooks {
                        hook.on_entry(&ctx);
                    }
                    if state == &plan.to
                        && let Some(hooks) = node.entry_from.get(trigger)
                    {
                        for hook in hooks {
                            hook.on_entry(&ctx);
                        }
                    }
                }
            }
        }
        for (index, region) in self.definition.regions().iter().enumerate() {
            if region.id == plan.region {
                self.leaves[index] = plan.to.clone();
            }
        }
    }
}
