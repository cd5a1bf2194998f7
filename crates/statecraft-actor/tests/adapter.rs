// crates/statecraft-actor/tests/adapter.rs
// ============================================================================
// Module: Actor Adapter Tests
// Description: Validate event sourcing, replay, idempotency, and streams.
// Purpose: Ensure the adapter keeps the durable log authoritative.
// Dependencies: statecraft-actor, statecraft-core, tokio
// ============================================================================

//! Behavior tests for the event-sourced actor adapter.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use async_trait::async_trait;
use statecraft_actor::BroadcastStreamSink;
use statecraft_actor::EventSourcingOptions;
use statecraft_actor::FireRequest;
use statecraft_actor::MachineActor;
use statecraft_core::DefinitionBuilder;
use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::MachineDefinition;
use statecraft_core::StateId;
use statecraft_core::StateTransitionEvent;
use statecraft_core::StreamNamespace;
use statecraft_core::Timestamp;
use statecraft_core::TriggerArgs;
use statecraft_core::guard;
use statecraft_core::interfaces::EventStore;
use statecraft_core::interfaces::EventStoreError;
use statecraft_core::interfaces::FireError;
use statecraft_core::interfaces::SnapshotStore;
use statecraft_core::runtime::InMemoryEventStore;
use statecraft_core::runtime::InMemorySnapshotStore;
use statecraft_core::runtime::ManualClock;
use tokio_stream::StreamExt;

/// Order machine shared by most tests.
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

/// Builds an actor over fresh in-memory backends.
async fn activate_order_actor(
    entity: &str,
    store: &InMemoryEventStore,
    snapshots: &InMemorySnapshotStore,
    clock: &ManualClock,
    options: EventSourcingOptions,
) -> MachineActor {
    MachineActor::builder(entity, order_definition())
        .event_store(Arc::new(store.clone()))
        .snapshot_store(Arc::new(snapshots.clone()))
        .clock(Arc::new(clock.clone()))
        .options(options)
        .activate()
        .await
        .expect("activate actor")
}

#[tokio::test]
async fn happy_path_confirms_dense_sequences_with_increasing_timestamps() {
    let store = InMemoryEventStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(1_000));
    let actor = activate_order_actor(
        "order-1",
        &store,
        &snapshots,
        &clock,
        EventSourcingOptions::default(),
    )
    .await;

    for trigger in ["Submit", "Pay", "Ship", "Deliver"] {
        clock.advance_millis(10);
        actor.fire(trigger).await.expect("fire");
    }

    assert_eq!(actor.current_state(), StateId::new("Completed"));
    assert_eq!(actor.info().transition_count, 4);

    let records = store
        .read(&EntityId::new("order-1"), 1, None)
        .await
        .expect("read log");
    let seqs: Vec<u64> = records.iter().map(|record| record.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    for window in records.windows(2) {
        assert!(window[0].event.timestamp < window[1].event.timestamp);
    }
}

#[tokio::test]
async fn guard_rejection_appends_no_event() {
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
    let store = InMemoryEventStore::new();
    let actor = MachineActor::builder("order-2", definition)
        .event_store(Arc::new(store.clone()))
        .activate()
        .await
        .expect("activate");

    let probe = actor.can_fire(
        &statecraft_core::TriggerId::new("Submit"),
        &TriggerArgs::one(0).expect("args"),
    );
    assert!(!probe.allowed);
    assert_eq!(probe.unmet_guards[0].as_str(), "items > 0");

    let refused = actor
        .fire_with(
            FireRequest::new("Submit").with_args(TriggerArgs::one(0).expect("args")),
        )
        .await;
    assert!(matches!(refused, Err(FireError::Transition(_))));
    assert_eq!(actor.current_state(), StateId::new("Draft"));
    assert_eq!(store.log_len(&EntityId::new("order-2")).expect("len"), 0);
}

#[tokio::test]
async fn dedupe_keys_absorb_retries_across_reactivation() {
    let store = InMemoryEventStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(0));
    let options = EventSourcingOptions::with_idempotency();
    let actor =
        activate_order_actor("order-3", &store, &snapshots, &clock, options.clone()).await;

    actor.fire("Submit").await.expect("submit");
    let first = actor
        .fire_with(FireRequest::new("Pay").with_dedupe("txn-42"))
        .await
        .expect("pay");
    assert!(!first.deduplicated);

    let retry = actor
        .fire_with(FireRequest::new("Pay").with_dedupe("txn-42"))
        .await
        .expect("retry");
    assert!(retry.deduplicated);
    assert_eq!(store.log_len(&EntityId::new("order-3")).expect("len"), 2);

    actor.deactivate().await.expect("deactivate");
    let reactivated =
        activate_order_actor("order-3", &store, &snapshots, &clock, options).await;
    assert_eq!(reactivated.current_state(), StateId::new("Paid"));

    // The dedupe window survives via replay.
    let replayed_retry = reactivated
        .fire_with(FireRequest::new("Pay").with_dedupe("txn-42"))
        .await
        .expect("replayed retry");
    assert!(replayed_retry.deduplicated);
    assert_eq!(store.log_len(&EntityId::new("order-3")).expect("len"), 2);
}

#[tokio::test]
async fn replay_rebuilds_state_and_counts() {
    let store = InMemoryEventStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(500));
    let actor = activate_order_actor(
        "order-4",
        &store,
        &snapshots,
        &clock,
        EventSourcingOptions::default(),
    )
    .await;
    actor.fire("Submit").await.expect("submit");
    actor.fire("Pay").await.expect("pay");
    actor.deactivate().await.expect("deactivate");

    let reactivated = activate_order_actor(
        "order-4",
        &store,
        &snapshots,
        &clock,
        EventSourcingOptions::default(),
    )
    .await;
    assert_eq!(reactivated.current_state(), StateId::new("Paid"));
    let info = reactivated.info();
    assert_eq!(info.transition_count, 2);
    assert!(reactivated.is_in(&StateId::new("Paid")));
}

#[tokio::test]
async fn snapshots_are_written_on_the_configured_cadence() {
    let store = InMemoryEventStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(0));
    let options = EventSourcingOptions {
        snapshot_interval: 2,
        ..EventSourcingOptions::default()
    };
    let actor = activate_order_actor("order-5", &store, &snapshots, &clock, options).await;

    actor.fire("Submit").await.expect("submit");
    actor.fire("Pay").await.expect("pay");

    let snapshot = snapshots
        .load(&EntityId::new("order-5"))
        .await
        .expect("load snapshot")
        .expect("snapshot written");
    assert_eq!(snapshot.last_seq, 2);
    assert_eq!(snapshot.current_states, vec![StateId::new("Paid")]);
}

#[tokio::test]
async fn batch_confirm_buffers_until_checkpoint() {
    let store = InMemoryEventStore::new();
    let snapshots = InMemorySnapshotStore::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(0));
    let actor = activate_order_actor(
        "order-6",
        &store,
        &snapshots,
        &clock,
        EventSourcingOptions::batch_confirm(),
    )
    .await;

    actor.fire("Submit").await.expect("submit");
    actor.fire("Pay").await.expect("pay");
    assert_eq!(store.log_len(&EntityId::new("order-6")).expect("len"), 0);
    assert_eq!(actor.current_state(), StateId::new("Paid"));

    let confirmed = actor.checkpoint().await.expect("checkpoint");
    assert_eq!(confirmed, 2);
    assert_eq!(store.log_len(&EntityId::new("order-6")).expect("len"), 2);
}

#[tokio::test]
async fn stream_publication_follows_confirmation() {
    let store = InMemoryEventStore::new();
    let sink = Arc::new(BroadcastStreamSink::default());
    let mut subscription = sink.subscribe();
    let options = EventSourcingOptions {
        publish_to_stream: true,
        stream_namespace: Some(StreamNamespace::new("orders")),
        ..EventSourcingOptions::default()
    };
    let actor = MachineActor::builder("order-7", order_definition())
        .event_store(Arc::new(store.clone()))
        .stream_sink(sink)
        .options(options)
        .activate()
        .await
        .expect("activate");

    actor.fire("Submit").await.expect("submit");

    let published = subscription.next().await.expect("stream item").expect("broadcast ok");
    assert_eq!(published.namespace.as_str(), "orders");
    assert_eq!(published.entity.as_str(), "order-7");
    assert_eq!(published.record.seq, 1);
    assert_eq!(published.record.event.to, StateId::new("PaymentPending"));
}

#[tokio::test]
async fn correlation_ids_stamp_subsequent_events() {
    let store = InMemoryEventStore::new();
    let actor = MachineActor::builder("order-8", order_definition())
        .event_store(Arc::new(store.clone()))
        .activate()
        .await
        .expect("activate");

    actor
        .set_correlation(Some(statecraft_core::CorrelationId::new("corr-7")))
        .await;
    actor.fire("Submit").await.expect("submit");

    let records = store.read(&EntityId::new("order-8"), 1, None).await.expect("read");
    assert_eq!(
        records[0].event.correlation_id.as_ref().map(statecraft_core::CorrelationId::as_str),
        Some("corr-7")
    );
}

// ============================================================================
// SECTION: Storage Failure Stub
// ============================================================================

/// Event store that fails every append.
#[derive(Debug, Default)]
struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append(
        &self,
        _entity: &EntityId,
        _events: &[StateTransitionEvent],
        _expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        Err(EventStoreError::Io("disk unplugged".to_string()))
    }

    async fn read(
        &self,
        _entity: &EntityId,
        _from_seq: u64,
        _to_seq: Option<u64>,
    ) -> Result<Vec<statecraft_core::RecordedEvent>, EventStoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_append_rolls_the_state_back() {
    let actor = MachineActor::builder("order-9", order_definition())
        .event_store(Arc::new(FailingEventStore))
        .activate()
        .await
        .expect("activate");

    let result = actor.fire("Submit").await;
    assert!(matches!(result, Err(FireError::Storage(_))));
    // The engine state still matches the (empty) confirmed log.
    assert_eq!(actor.current_state(), StateId::new("Created"));
    assert_eq!(actor.info().transition_count, 0);
}
