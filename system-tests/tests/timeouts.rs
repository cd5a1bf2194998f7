// system-tests/tests/timeouts.rs
// ============================================================================
// Module: Timer Timeout Scenarios
// Description: Time-driven transitions and timer/user races.
// Purpose: Exercise the timer layer through the full actor stack.
// Dependencies: system-tests, statecraft-actor, statecraft-core
// ============================================================================

//! End-to-end state-timeout scenarios on in-process timers.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use statecraft_actor::MachineActor;
use statecraft_actor::TokioTimerService;
use statecraft_actor::configure_timeout;
use statecraft_core::DefinitionBuilder;
use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::MachineDefinition;
use statecraft_core::StateId;
use statecraft_core::interfaces::EventStore;
use statecraft_core::runtime::InMemoryEventStore;

/// Processing machine with a watchdog back to idle.
fn processing_definition() -> Arc<MachineDefinition> {
    DefinitionBuilder::new("Job", DefinitionVersion::new(1, 0, 0))
        .state("Idle")
        .state("Processing")
        .initial("Idle")
        .transition("Idle", "Start", "Processing")
        .transition("Processing", "Timeout", "Idle")
        .transition("Processing", "Finish", "Idle")
        .build()
        .expect("build processing definition")
}

#[tokio::test]
async fn processing_times_out_back_to_idle() {
    let store = InMemoryEventStore::new();
    let actor = MachineActor::builder("job-1", processing_definition())
        .event_store(Arc::new(store.clone()))
        .timer_service(Arc::new(TokioTimerService::new()))
        .state_timeout(
            configure_timeout("Processing")
                .after(Duration::from_millis(50))
                .transition_to("Timeout")
                .use_timer()
                .build()
                .expect("build timeout"),
        )
        .activate()
        .await
        .expect("activate");

    actor.fire("Start").await.expect("start");
    assert_eq!(actor.current_state(), StateId::new("Processing"));

    // Past the timeout the watchdog has driven the machine home.
    tokio::time::sleep(Duration::from_millis(140)).await;
    assert_eq!(actor.current_state(), StateId::new("Idle"));

    let log = store.read(&EntityId::new("job-1"), 1, None).await.expect("read");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].event.from, StateId::new("Processing"));
    assert_eq!(log[1].event.to, StateId::new("Idle"));
    assert_eq!(log[1].event.trigger.as_str(), "Timeout");
}

#[tokio::test]
async fn manual_exit_before_the_deadline_drops_the_timer() {
    let store = InMemoryEventStore::new();
    let actor = MachineActor::builder("job-2", processing_definition())
        .event_store(Arc::new(store.clone()))
        .timer_service(Arc::new(TokioTimerService::new()))
        .state_timeout(
            configure_timeout("Processing")
                .after(Duration::from_millis(100))
                .transition_to("Timeout")
                .use_timer()
                .build()
                .expect("build timeout"),
        )
        .activate()
        .await
        .expect("activate");

    actor.fire("Start").await.expect("start");
    // Leave Processing halfway to the deadline.
    tokio::time::sleep(Duration::from_millis(30)).await;
    actor.fire("Finish").await.expect("finish");

    // Wait well past the original deadline: no timeout event may appear.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let log = store.read(&EntityId::new("job-2"), 1, None).await.expect("read");
    let triggers: Vec<&str> = log.iter().map(|record| record.event.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["Start", "Finish"]);
    assert_eq!(actor.current_state(), StateId::new("Idle"));
}

#[tokio::test]
async fn repeating_timers_rearm_until_the_state_is_left() {
    let definition = DefinitionBuilder::new("Job", DefinitionVersion::new(1, 0, 0))
        .state("Idle")
        .state("Polling")
        .initial("Idle")
        .transition("Idle", "Start", "Polling")
        .transition("Polling", "Poll", "Polling")
        .transition("Polling", "Stop", "Idle")
        .build()
        .expect("build polling definition");
    let store = InMemoryEventStore::new();
    let actor = MachineActor::builder("job-3", definition)
        .event_store(Arc::new(store.clone()))
        .timer_service(Arc::new(TokioTimerService::new()))
        .state_timeout(
            configure_timeout("Polling")
                .after(Duration::from_millis(25))
                .transition_to("Poll")
                .use_timer()
                .repeat()
                .build()
                .expect("build timeout"),
        )
        .activate()
        .await
        .expect("activate");

    actor.fire("Start").await.expect("start");
    tokio::time::sleep(Duration::from_millis(120)).await;
    actor.fire("Stop").await.expect("stop");

    let log = store.read(&EntityId::new("job-3"), 1, None).await.expect("read");
    let polls =
        log.iter().filter(|record| record.event.trigger.as_str() == "Poll").count();
    assert!(polls >= 2, "expected repeated polls, saw {polls}");
    assert_eq!(actor.current_state(), StateId::new("Idle"));
}
