// crates/statecraft-saga/tests/saga.rs
// ============================================================================
// Module: Saga Executor Tests
// Description: Validate ordering, retries, conditions, and compensation.
// Purpose: Ensure runs honor the DAG and roll back in reverse order.
// Dependencies: statecraft-saga, statecraft-core, tokio
// ============================================================================

//! Behavior tests for the saga orchestrator.

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
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use statecraft_core::CorrelationId;
use statecraft_core::StepName;
use statecraft_saga::SagaBuilder;
use statecraft_saga::SagaData;
use statecraft_saga::SagaExecutor;
use statecraft_saga::SagaStatus;
use statecraft_saga::StepOutcome;
use statecraft_saga::condition;
use statecraft_saga::step;
use statecraft_saga::step_with_compensation;

/// Shared trace of step and compensation invocations.
type Trace = Arc<Mutex<Vec<String>>>;

/// Records `label` into the trace.
fn note(trace: &Trace, label: impl Into<String>) {
    if let Ok(mut log) = trace.lock() {
        log.push(label.into());
    }
}

/// A step that succeeds and records itself.
fn traced_step(trace: &Trace, label: &str) -> Arc<dyn statecraft_saga::StepHandler> {
    let exec_trace = Arc::clone(trace);
    let comp_trace = Arc::clone(trace);
    let exec_label = label.to_string();
    let comp_label = format!("undo {label}");
    step_with_compensation(
        move |_ctx| {
            let trace = Arc::clone(&exec_trace);
            let label = exec_label.clone();
            async move {
                note(&trace, label);
                StepOutcome::Success(json!("ok"))
            }
        },
        move |_ctx| {
            let trace = Arc::clone(&comp_trace);
            let label = comp_label.clone();
            async move {
                note(&trace, label);
                statecraft_saga::CompensationOutcome::done()
            }
        },
    )
}

#[tokio::test]
async fn diamond_happy_path_completes_in_dependency_order() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let config = SagaBuilder::new("fulfillment")
        .step("A", traced_step(&trace, "A"))
        .step_with("B", traced_step(&trace, "B"), |options| options.depends_on("A"))
        .step_with("C", traced_step(&trace, "C"), |options| options.depends_on("A"))
        .step_with("D", traced_step(&trace, "D"), |options| {
            options.depends_on("B").depends_on("C")
        })
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-1"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Completed);
    assert_eq!(report.completed.len(), 4);
    assert!(report.failed.is_empty());
    assert!(report.compensations.is_empty());

    let log = trace.lock().expect("trace");
    let position =
        |label: &str| log.iter().position(|entry| entry == label).expect("step ran");
    assert!(position("A") < position("B"));
    assert!(position("A") < position("C"));
    assert!(position("D") > position("B"));
    assert!(position("D") > position("C"));

    // Dependency property: every successful step started after its
    // dependencies completed.
    let a = report.step_result(&StepName::new("A")).expect("A result");
    let d = report.step_result(&StepName::new("D")).expect("D result");
    assert!(d.executed_at >= a.executed_at);
}

#[tokio::test]
async fn business_failure_compensates_in_reverse_completion_order() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let failing = step(|_ctx| async { StepOutcome::BusinessFailure("card declined".to_string()) });
    let config = SagaBuilder::new("fulfillment")
        .step("A", traced_step(&trace, "A"))
        .step_with("B", traced_step(&trace, "B"), |options| options.depends_on("A"))
        .step_with("C", failing, |options| options.depends_on("A"))
        .step_with("D", traced_step(&trace, "D"), |options| {
            options.depends_on("B").depends_on("C")
        })
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-2"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Failed);
    assert_eq!(report.failed, vec![StepName::new("C")]);
    let c = report.step_result(&StepName::new("C")).expect("C result");
    assert!(c.is_business_failure);
    assert!(!c.is_technical_failure);

    // D never executed.
    assert!(report.step_result(&StepName::new("D")).is_none());

    // Compensations run in reverse completion order.
    let compensated: Vec<&str> =
        report.compensations.iter().map(|(name, _)| name.as_str()).collect();
    let mut expected: Vec<&str> =
        report.completed.iter().map(statecraft_core::StepName::as_str).collect();
    expected.reverse();
    assert_eq!(compensated, expected);
    assert_eq!(report.compensation_succeeded, Some(true));

    let log = trace.lock().expect("trace");
    assert!(log.iter().any(|entry| entry == "undo A"));
    assert!(!log.iter().any(|entry| entry == "D"));
}

#[tokio::test]
async fn technical_failures_retry_with_backoff() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = step(move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 3 {
                StepOutcome::TechnicalFailure("connection reset".to_string())
            } else {
                StepOutcome::Success(json!(attempt))
            }
        }
    });
    let config = SagaBuilder::new("retry")
        .step_with("Flaky", flaky, |options| {
            options.max_attempts(5).retry_delay(Duration::from_millis(5))
        })
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-3"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Completed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let result = report.step_result(&StepName::new("Flaky")).expect("result");
    assert!(result.success);
}

#[tokio::test]
async fn business_failures_never_retry() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let refusing = step(move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            StepOutcome::BusinessFailure("not eligible".to_string())
        }
    });
    let config = SagaBuilder::new("no-retry")
        .step_with("Refuse", refusing, |options| {
            options.max_attempts(5).retry_delay(Duration::from_millis(1))
        })
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-4"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn conditions_skip_steps_without_failing_the_run() {
    let config = SagaBuilder::new("conditional")
        .step("A", step(|ctx| async move {
            ctx.saga_data.put("express", false);
            StepOutcome::done()
        }))
        .step_with("ExpressShip", step(|_ctx| async { StepOutcome::done() }), |options| {
            options.depends_on("A").condition(condition("express requested", |ctx| {
                ctx.saga_data.get::<bool>("express").unwrap_or(false)
            }))
        })
        .step_with("StandardShip", step(|_ctx| async { StepOutcome::done() }), |options| {
            options.depends_on("A").condition(condition("standard requested", |ctx| {
                !ctx.saga_data.get::<bool>("express").unwrap_or(false)
            }))
        })
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-5"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Completed);
    assert_eq!(report.skipped, vec![StepName::new("ExpressShip")]);
    assert!(report.completed.contains(&StepName::new("StandardShip")));
    // Skipped is not successful: it never enters the completed set.
    assert!(!report.completed.contains(&StepName::new("ExpressShip")));
}

#[tokio::test]
async fn continue_on_failure_defers_compensation_to_the_end() {
    let trace: Trace = Arc::new(Mutex::new(Vec::new()));
    let failing =
        step(|_ctx| async { StepOutcome::TechnicalFailure("best effort failed".to_string()) });
    let config = SagaBuilder::new("lenient")
        .step("A", traced_step(&trace, "A"))
        .step_with("Notify", failing, |options| {
            options.depends_on("A").continue_on_failure()
        })
        .step_with("B", traced_step(&trace, "B"), |options| options.depends_on("A"))
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-6"), SagaData::new())
        .await
        .expect("run");

    // The failed continuable step leaves the run compensated at the end.
    assert_eq!(report.status, SagaStatus::Compensated);
    assert_eq!(report.failed, vec![StepName::new("Notify")]);
    assert!(report.completed.contains(&StepName::new("B")));
    assert_eq!(report.compensation_succeeded, Some(true));
}

#[tokio::test]
async fn step_timeouts_count_as_technical_failures() {
    let slow = step(|_ctx| async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        StepOutcome::done()
    });
    let config = SagaBuilder::new("slow")
        .step("Slow", slow)
        .step_timeout(Duration::from_millis(20))
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-7"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Failed);
    let result = report.step_result(&StepName::new("Slow")).expect("result");
    assert!(result.is_technical_failure);
    assert!(result.error_message.as_deref().is_some_and(|message| message.contains("timed out")));
}

#[tokio::test]
async fn saga_data_flows_between_steps() {
    let config = SagaBuilder::new("data-flow")
        .step("Reserve", step(|ctx| async move {
            ctx.saga_data.put("reservation", json!({"id": "res-9"}));
            StepOutcome::done()
        }))
        .step_with("Charge", step(|ctx| async move {
            match ctx.saga_data.get::<serde_json::Value>("reservation") {
                Some(reservation) => StepOutcome::Success(reservation),
                None => StepOutcome::BusinessFailure("missing reservation".to_string()),
            }
        }), |options| options.depends_on("Reserve"))
        .build();

    let report = SagaExecutor::new()
        .run(&config, CorrelationId::new("run-8"), SagaData::new())
        .await
        .expect("run");

    assert_eq!(report.status, SagaStatus::Completed);
    let charge = report.step_result(&StepName::new("Charge")).expect("charge");
    assert_eq!(charge.result, json!({"id": "res-9"}));
}
