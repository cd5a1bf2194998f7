// crates/statecraft-core/tests/engine.rs
// ============================================================================
// Module: Machine Engine Tests
// Description: Validate fire semantics, hierarchy, regions, and re-entrancy.
// Purpose: Ensure the evaluator is deterministic and side-effect free on
//          refusal.
// Dependencies: statecraft-core
// ============================================================================

//! Behavior tests for the pure machine engine.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use statecraft_core::DefinitionBuilder;
use statecraft_core::DefinitionVersion;
use statecraft_core::Machine;
use statecraft_core::MachineDefinition;
use statecraft_core::StateId;
use statecraft_core::TransitionError;
use statecraft_core::TriggerArgs;
use statecraft_core::TriggerId;
use statecraft_core::entry_hook;
use statecraft_core::exit_hook;
use statecraft_core::guard;

/// Builds the order machine used by most tests.
fn order_definition() -> Arc<MachineDefinition> {
    DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
        .state("Created")
        .state("PaymentPending")
        .state("Paid")
        .state("Shipped")
        .state("Completed")
        .initial("Created")
        .transition("Created", "Submit", "PaymentPending")
        .transition("PaymentPending", "Pay", "Paid")
        .transition("Paid", "Ship", "Shipped")
        .transition("Shipped", "Deliver", "Completed")
        .build()
        .expect("build order definition")
}

#[test]
fn fires_walk_the_happy_path() {
    let mut machine = Machine::new(order_definition());
    let args = TriggerArgs::none();
    for trigger in ["Submit", "Pay", "Ship", "Deliver"] {
        machine.fire(&TriggerId::new(trigger), &args).expect("fire");
    }
    assert_eq!(machine.current(), &StateId::new("Completed"));
}

#[test]
fn undeclared_rule_is_no_transition() {
    let mut machine = Machine::new(order_definition());
    let err = machine.fire(&TriggerId::new("Deliver"), &TriggerArgs::none());
    assert!(matches!(
        err,
        Err(TransitionError::NoTransition { ref from, .. }) if from.as_str() == "Created"
    ));
    assert_eq!(machine.current(), &StateId::new("Created"));
}

#[test]
fn guard_rejection_reports_unmet_names_and_keeps_state() {
    let definition = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
        .state("Draft")
        .state("Submitted")
        .initial("Draft")
        .trigger_with_arity("Submit", 1)
        .guarded_transition(
            "Draft",
            "Submit",
            "Submitted",
            guard("items > 0", |ctx| ctx.args.arg::<i64>(0).is_ok_and(|items| items > 0)),
        )
        .build()
        .expect("build definition");
    let mut machine = Machine::new(definition);
    let empty_cart = TriggerArgs::one(0).expect("args");

    let probe = machine.can_fire(&TriggerId::new("Submit"), &empty_cart);
    assert!(!probe.allowed);
    assert_eq!(probe.unmet_guards.len(), 1);
    assert_eq!(probe.unmet_guards[0].as_str(), "items > 0");

    let err = machine.fire(&TriggerId::new("Submit"), &empty_cart);
    assert!(matches!(err, Err(TransitionError::GuardRejected { .. })));
    assert_eq!(machine.current(), &StateId::new("Draft"));

    let full_cart = TriggerArgs::one(2).expect("args");
    machine.fire(&TriggerId::new("Submit"), &full_cart).expect("fire");
    assert_eq!(machine.current(), &StateId::new("Submitted"));
}

#[test]
fn first_declared_satisfied_guard_wins() {
    let definition = DefinitionBuilder::new("Router", DefinitionVersion::INITIAL)
        .state("Start")
        .state("Low")
        .state("High")
        .initial("Start")
        .trigger_with_arity("Route", 1)
        .guarded_transition("Start", "Route", "Low", guard("always", |_| true))
        .guarded_transition("Start", "Route", "High", guard("also always", |_| true))
        .build()
        .expect("build definition");
    for _ in 0 .. 16 {
        let mut machine = Machine::new(Arc::clone(&definition));
        let args = TriggerArgs::one(1).expect("args");
        machine.fire(&TriggerId::new("Route"), &args).expect("fire");
        assert_eq!(machine.current(), &StateId::new("Low"));
    }
}

#[test]
fn arity_mismatch_is_reported_precisely() {
    let definition = DefinitionBuilder::new("Order", DefinitionVersion::INITIAL)
        .state("Draft")
        .state("Submitted")
        .initial("Draft")
        .trigger_with_arity("Submit", 2)
        .transition("Draft", "Submit", "Submitted")
        .build()
        .expect("build definition");
    let mut machine = Machine::new(definition);
    let err = machine.fire(&TriggerId::new("Submit"), &TriggerArgs::none());
    assert!(matches!(
        err,
        Err(TransitionError::ArityMismatch { expected: 2, actual: 0, .. })
    ));
}

#[test]
fn hierarchy_resolves_transitions_and_hook_order() {
    let trace: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let note = |label: &str| {
        let trace = Arc::clone(&trace);
        let label = label.to_string();
        move |_: &statecraft_core::HookContext<'_>| {
            if let Ok(mut log) = trace.lock() {
                log.push(label.clone());
            }
        }
    };

    let definition = DefinitionBuilder::new("Worker", DefinitionVersion::INITIAL)
        .state_with("Active", |state| {
            state
                .on_entry(entry_hook("enter-active", note("enter Active")))
                .on_exit(exit_hook("exit-active", note("exit Active")))
        })
        .state_with("Processing", |state| {
            state
                .substate_of("Active")
                .on_entry(entry_hook("enter-processing", note("enter Processing")))
                .on_exit(exit_hook("exit-processing", note("exit Processing")))
        })
        .state_with("Waiting", |state| {
            state
                .substate_of("Active")
                .on_entry(entry_hook("enter-waiting", note("enter Waiting")))
        })
        .state_with("Idle", |state| state.on_entry(entry_hook("enter-idle", note("enter Idle"))))
        .initial("Processing")
        // Declared on the parent: available from every Active substate.
        .transition("Active", "Stop", "Idle")
        .transition("Processing", "Hold", "Waiting")
        .build()
        .expect("build definition");
    let mut machine = Machine::new(definition);

    assert!(machine.is_in(&StateId::new("Active")));
    assert!(machine.is_in(&StateId::new("Processing")));
    assert!(!machine.is_in(&StateId::new("Idle")));

    // Sibling move under the shared parent: only the leaf hooks run.
    machine.fire(&TriggerId::new("Hold"), &TriggerArgs::none()).expect("fire Hold");
    assert_eq!(machine.current(), &StateId::new("Waiting"));

    // Parent-declared rule fires from the substate and exits the chain.
    machine.fire(&TriggerId::new("Stop"), &TriggerArgs::none()).expect("fire Stop");
    assert_eq!(machine.current(), &StateId::new("Idle"));

    let log = trace.lock().expect("trace");
    assert_eq!(
        log.as_slice(),
        ["exit Processing", "enter Waiting", "exit Active", "enter Idle"]
    );
}

#[test]
fn regions_fan_out_and_reject_atomically() {
    let definition = DefinitionBuilder::new("Fulfillment", DefinitionVersion::INITIAL)
        .state("Pending")
        .state("Charged")
        .initial("Pending")
        .trigger_with_arity("Complete", 1)
        .guarded_transition(
            "Pending",
            "Complete",
            "Charged",
            guard("amount > 0", |ctx| ctx.args.arg::<i64>(0).is_ok_and(|amount| amount > 0)),
        )
        .region("shipping", |region| {
            region
                .state("Boxed")
                .state("Sent")
                .initial("Boxed")
                .transition("Boxed", "Complete", "Sent")
        })
        .build()
        .expect("build definition");
    let mut machine = Machine::new(definition);

    // A rejecting guard in one region aborts the whole fire.
    let zero = TriggerArgs::one(0).expect("args");
    let err = machine.fire(&TriggerId::new("Complete"), &zero);
    assert!(matches!(err, Err(TransitionError::GuardRejected { .. })));
    assert_eq!(machine.region_states(), &[StateId::new("Pending"), StateId::new("Boxed")]);

    // Both regions advance when every guard passes.
    let paid = TriggerArgs::one(10).expect("args");
    let plan = machine.fire(&TriggerId::new("Complete"), &paid).expect("fire");
    assert_eq!(plan.regions.len(), 2);
    assert_eq!(machine.region_states(), &[StateId::new("Charged"), StateId::new("Sent")]);
}

#[test]
fn self_transition_runs_no_hooks() {
    let trace: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let trace_entry = Arc::clone(&trace);
    let trace_exit = Arc::clone(&trace);
    let definition = DefinitionBuilder::new("Heartbeat", DefinitionVersion::INITIAL)
        .state_with("Alive", |state| {
            state
                .on_entry(entry_hook("enter-alive", move |_| {
                    if let Ok(mut log) = trace_entry.lock() {
                        log.push("entry".to_string());
                    }
                }))
                .on_exit(exit_hook("exit-alive", move |_| {
                    if let Ok(mut log) = trace_exit.lock() {
                        log.push("exit".to_string());
                    }
                }))
        })
        .initial("Alive")
        .transition("Alive", "Beat", "Alive")
        .build()
        .expect("build definition");
    let mut machine = Machine::new(definition);
    machine.fire(&TriggerId::new("Beat"), &TriggerArgs::none()).expect("fire");
    assert_eq!(machine.current(), &StateId::new("Alive"));
    assert!(trace.lock().expect("trace").is_empty());
}

#[test]
fn hooks_cannot_fire_triggers() {
    let observed: Arc<Mutex<Option<TransitionError>>> = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&observed);

    // A second evaluator over the same definition, captured by the hook.
    let probe_definition = order_definition();
    let definition = DefinitionBuilder::new("Reentrant", DefinitionVersion::INITIAL)
        .state("Outside")
        .state_with("Inside", |state| {
            state.on_entry(entry_hook("reenter", move |_| {
                let mut other = Machine::new(Arc::clone(&probe_definition));
                let result = other.fire(&TriggerId::new("Submit"), &TriggerArgs::none());
                if let (Err(err), Ok(mut slot)) = (result, capture.lock()) {
                    *slot = Some(err);
                }
            }))
        })
        .initial("Outside")
        .transition("Outside", "Enter", "Inside")
        .build()
        .expect("build definition");

    let mut machine = Machine::new(definition);
    machine.fire(&TriggerId::new("Enter"), &TriggerArgs::none()).expect("fire");
    let captured = observed.lock().expect("observed").clone();
    assert!(matches!(captured, Some(TransitionError::ReentrancyViolation { .. })));
}

#[test]
fn restored_machines_resume_at_the_given_leaf() {
    let definition = order_definition();
    let machine =
        Machine::restored(Arc::clone(&definition), &[StateId::new("Paid")]).expect("restore");
    assert_eq!(machine.current(), &StateId::new("Paid"));

    let unknown = Machine::restored(Arc::clone(&definition), &[StateId::new("Nowhere")]);
    assert!(matches!(unknown, Err(TransitionError::UnknownRestoredState(_))));

    let wrong_count = Machine::restored(definition, &[]);
    assert!(matches!(wrong_count, Err(TransitionError::RegionCountMismatch { .. })));
}

#[test]
fn permitted_reflects_guards_and_state() {
    let mut machine = Machine::new(order_definition());
    let args = TriggerArgs::none();
    let initial: Vec<String> =
        machine.permitted(&args).iter().map(|trigger| trigger.to_string()).collect();
    assert_eq!(initial, vec!["Submit".to_string()]);

    machine.fire(&TriggerId::new("Submit"), &args).expect("fire");
    let next: Vec<String> =
        machine.permitted(&args).iter().map(|trigger| trigger.to_string()).collect();
    assert_eq!(next, vec!["Pay".to_string()]);
}
