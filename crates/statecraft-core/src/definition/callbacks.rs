// crates/statecraft-core/src/definition/callbacks.rs
// ============================================================================
// Module: Statecraft Guards and Hooks
// Description: Named callback interfaces for guards and entry/exit hooks.
// Purpose: Let definitions reference behavior by symbolic name, never by code.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Guards and hooks are interface values with symbolic names so a machine
//! definition can be serialized by reference. Guard predicates must be pure
//! and cheap; they may be invoked multiple times per call (permitted-trigger
//! probes re-evaluate them). Hooks are synchronous side effects and must not
//! fire triggers; the engine enforces this with a thread-local scope and
//! fails re-entrant fires deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::core::args::TriggerArgs;
use crate::core::identifiers::GuardName;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TriggerId;

// ============================================================================
// SECTION: Guard Context
// ============================================================================

/// Read-only context passed to guard predicates.
///
/// # Invariants
/// - Values are snapshots; guards must not mutate shared state.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    /// Current leaf state of the evaluating region.
    pub from: &'a StateId,
    /// Trigger under evaluation.
    pub trigger: &'a TriggerId,
    /// Arguments supplied with the fire.
    pub args: &'a TriggerArgs,
}

/// Pure predicate gating one transition rule.
pub trait Guard: Send + Sync {
    /// Returns the symbolic guard name reported in unmet-guard lists.
    fn name(&self) -> &GuardName;

    /// Evaluates the guard against the fire context.
    fn check(&self, ctx: &GuardContext<'_>) -> bool;
}

/// Guard implementation backed by a closure.
struct FnGuard<F> {
    /// Symbolic guard name.
    name: GuardName,
    /// Predicate closure.
    predicate: F,
}

impl<F> Guard for FnGuard<F>
where
    F: Fn(&GuardContext<'_>) -> bool + Send + Sync,
{
    fn name(&self) -> &GuardName {
        &self.name
    }

    fn check(&self, ctx: &GuardContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

/// Creates a guard from a symbolic name and a predicate closure.
#[must_use]
pub fn guard<F>(name: impl Into<GuardName>, predicate: F) -> Arc<dyn Guard>
where
    F: Fn(&GuardContext<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(FnGuard {
        name: name.into(),
        predicate,
    })
}

impl fmt::Debug for dyn Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.name().as_str()).finish()
    }
}

// ============================================================================
// SECTION: Hook Context
// ============================================================================

/// Read-only context passed to entry and exit hooks.
///
/// # Invariants
/// - `state` is the state being entered or exited, which may be an ancestor
///   of `to`/`from` on multi-level transitions.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// State the hook is bound to.
    pub state: &'a StateId,
    /// Source leaf state of the transition.
    pub from: &'a StateId,
    /// Target state of the transition.
    pub to: &'a StateId,
    /// Trigger that caused the transition.
    pub trigger: &'a TriggerId,
    /// Arguments supplied with the fire.
    pub args: &'a TriggerArgs,
}

/// Synchronous side effect invoked when a state is entered.
pub trait EntryHook: Send + Sync {
    /// Returns the symbolic hook name.
    fn name(&self) -> &str;

    /// Invokes the hook. Must not fire triggers.
    fn on_entry(&self, ctx: &HookContext<'_>);
}

/// Synchronous side effect invoked when a state is exited.
pub trait ExitHook: Send + Sync {
    /// Returns the symbolic hook name.
    fn name(&self) -> &str;

    /// Invokes the hook. Must not fire triggers.
    fn on_exit(&self, ctx: &HookContext<'_>);
}

/// Entry hook backed by a closure.
struct FnEntryHook<F> {
    /// Symbolic hook name.
    name: String,
    /// Hook closure.
    action: F,
}

impl<F> EntryHook for FnEntryHook<F>
where
    F: Fn(&HookContext<'_>) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_entry(&self, ctx: &HookContext<'_>) {
        (self.action)(ctx);
    }
}

/// Exit hook backed by a closure.
struct FnExitHook<F> {
    /// Symbolic hook name.
    name: String,
    /// Hook closure.
    action: F,
}

impl<F> ExitHook for FnExitHook<F>
where
    F: Fn(&HookContext<'_>) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_exit(&self, ctx: &HookContext<'_>) {
        (self.action)(ctx);
    }
}

/// Creates an entry hook from a symbolic name and a closure.
#[must_use]
pub fn entry_hook<F>(name: impl Into<String>, action: F) -> Arc<dyn EntryHook>
where
    F: Fn(&HookContext<'_>) + Send + Sync + 'static,
{
    Arc::new(FnEntryHook {
        name: name.into(),
        action,
    })
}

/// Creates an exit hook from a symbolic name and a closure.
#[must_use]
pub fn exit_hook<F>(name: impl Into<String>, action: F) -> Arc<dyn ExitHook>
where
    F: Fn(&HookContext<'_>) + Send + Sync + 'static,
{
    Arc::new(FnExitHook {
        name: name.into(),
        action,
    })
}

impl fmt::Debug for dyn EntryHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntryHook").field(&self.name()).finish()
    }
}

impl fmt::Debug for dyn ExitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExitHook").field(&self.name()).finish()
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
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::GuardContext;
    use super::HookContext;
    use super::entry_hook;
    use super::guard;
    use crate::core::args::TriggerArgs;
    use crate::core::identifiers::StateId;
    use crate::core::identifiers::TriggerId;

    #[test]
    fn fn_guard_reports_name_and_evaluates() {
        let items = guard("items > 0", |ctx: &GuardContext<'_>| {
            ctx.args.arg::<i64>(0).is_ok_and(|count| count > 0)
        });
        let from = StateId::new("Draft");
        let trigger = TriggerId::new("Submit");
        let args = TriggerArgs::one(3).expect("args");
        let ctx = GuardContext {
            from: &from,
            trigger: &trigger,
            args: &args,
        };
        assert_eq!(items.name().as_str(), "items > 0");
        assert!(items.check(&ctx));
    }

    #[test]
    fn fn_entry_hook_runs_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let hook = entry_hook("count-entries", move |_: &HookContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let state = StateId::new("Paid");
        let from = StateId::new("PaymentPending");
        let trigger = TriggerId::new("Pay");
        let args = TriggerArgs::none();
        hook.on_entry(&HookContext {
            state: &state,
            from: &from,
            to: &state,
            trigger: &trigger,
            args: &args,
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
