// crates/statecraft-actor/tests/timers.rs
// ============================================================================
// Module: Timer and Reminder Tests
// Description: Validate state timeouts, race drops, and durable reminders.
// Purpose: Ensure timer fires serialize with user fires and never race.
// Dependencies: statecraft-actor, statecraft-core, tokio
// ============================================================================

//! Behavior tests for the timer/reminder layer.

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

use statecraft_actor::InMemoryReminderService;
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

/// Worker machine with a processing timeout back to idle.
fn worker_definition() -> Arc<MachineDefinition> {
    DefinitionBuilder::new("Worker", DefinitionVersion::INITIAL)
        .state("Idle")
        .state("Processing")
        .initial("Idle")
        .transition("Idle", "Start", "Processing")
        .transition("Processing", "Timeout", "Idle")
        .transition("Processing", "Finish", "Idle")
        .build()
        .expect("build worker definition")
}

#[tokio::test]
async fn state_timeout_fires_its_trigger() {
    let store = InMemoryEventStore::new();
    let timeout = configure_timeout("Processing")
        .after(Duration::from_millis(40))
        .transition_to("Timeout")
        .use_timer()
        .build()
        .expect("build timeout");
    let actor = MachineActor::builder("worker-1", worker_definition())
        .event_store(Arc::new(store.clone()))
        .timer_service(Arc::new(TokioTimerService::new()))
        .state_timeout(timeout)
        .activate()
        .await
        .expect("activate");

    actor.fire("Start").await.expect("start");
    assert_eq!(actor.current_state(), StateId::new("Processing"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(actor.current_state(), StateId::new("Idle"));

    let records = store.read(&EntityId::new("worker-1"), 1, None).await.expect("read");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].event.trigger.as_str(), "Timeout");
    assert_eq!(records[1].event.from, StateId::new("Processing"));
    assert_eq!(records[1].event.to, StateId::new("Idle"));
}

#[tokio::test]
async fn racing_manual_transition_drops_the_timer_fire() {
    let store = InMemoryEventStore::new();
    let timeout = configure_timeout("Processing")
        .after(Duration::from_millis(80))
        .transition_to("Timeout")
        .use_timer()
        .build()
        .expect("build timeout");
    let actor = MachineActor::builder("worker-2", worker_definition())
        .event_store(Arc::new(store.clone()))
        .timer_service(Arc::new(TokioTimerService::new()))
        .state_timeout(timeout)
        .activate()
        .await
        .expect("activate");

    actor.fire("Start").await.expect("start");
    // Leave Processing well before the timer is due.
    tokio::time::sleep(Duration::from_millis(10)).await;
    actor.fire("Finish").await.expect("finish");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(actor.current_state(), StateId::new("Idle"));

    // Only Start and Finish made the log; the stale timeout was dropped.
    let records = store.read(&EntityId::new("worker-2"), 1, None).await.expect("read");
    let triggers: Vec<&str> =
        records.iter().map(|record| record.event.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["Start", "Finish"]);
}

#[tokio::test]
async fn durable_reminders_survive_reactivation() {
    let store = InMemoryEventStore::new();
    let snapshots = statecraft_core::runtime::InMemorySnapshotStore::new();
    let reminders = Arc::new(InMemoryReminderService::new());
    let timeout = configure_timeout("Processing")
        .after(Duration::from_millis(60))
        .transition_to("Timeout")
        .use_durable_reminder()
        .build()
        .expect("build timeout");

    let actor = MachineActor::builder("worker-3", worker_definition())
        .event_store(Arc::new(store.clone()))
        .snapshot_store(Arc::new(snapshots.clone()))
        .reminder_service(Arc::clone(&reminders) as Arc<dyn statecraft_core::interfaces::ReminderService>)
        .state_timeout(timeout.clone())
        .activate()
        .await
        .expect("activate");
    reminders.attach(&EntityId::new("worker-3"), actor.reminder_handler());

    actor.fire("Start").await.expect("start");
    // Deactivate while the reminder is pending; the registration outlives
    // the activation.
    actor.deactivate().await.expect("deactivate");

    let reactivated = MachineActor::builder("worker-3", worker_definition())
        .event_store(Arc::new(store.clone()))
        .snapshot_store(Arc::new(snapshots.clone()))
        .reminder_service(Arc::clone(&reminders) as Arc<dyn statecraft_core::interfaces::ReminderService>)
        .state_timeout(timeout)
        .activate()
        .await
        .expect("reactivate");
    reminders.attach(&EntityId::new("worker-3"), reactivated.reminder_handler());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reactivated.current_state(), StateId::new("Idle"));
    let records = store.read(&EntityId::new("worker-3"), 1, None).await.expect("read");
    assert_eq!(records.last().map(|record| record.event.trigger.as_str()), Some("Timeout"));
}
