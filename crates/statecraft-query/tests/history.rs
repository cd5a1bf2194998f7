// crates/statecraft-query/tests/history.rs
// ============================================================================
// Module: History Query Tests
// Description: Validate the filter pipeline against an in-memory log.
// Purpose: Ensure filters compose, ordering pages, and terminals agree.
// Dependencies: statecraft-query, statecraft-core, tokio
// ============================================================================

//! Behavior tests for the history query pipeline.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use statecraft_core::CorrelationId;
use statecraft_core::DefinitionVersion;
use statecraft_core::EntityId;
use statecraft_core::StateId;
use statecraft_core::StateTransitionEvent;
use statecraft_core::Timestamp;
use statecraft_core::TriggerId;
use statecraft_core::interfaces::EventStore;
use statecraft_core::runtime::InMemoryEventStore;
use statecraft_query::HistoryQuery;
use statecraft_query::TimeOrder;

/// Seeds a six-event order history starting at `base` milliseconds.
async fn seed_log(base: i64) -> (InMemoryEventStore, EntityId) {
    let store = InMemoryEventStore::new();
    let entity = EntityId::new("order-q");
    let hops = [
        ("Created", "PaymentPending", "Submit", None),
        ("PaymentPending", "Paid", "Pay", Some("corr-1")),
        ("Paid", "Shipped", "Ship", Some("corr-1")),
        ("Shipped", "Delivered", "Deliver", None),
        ("Delivered", "Completed", "Close", None),
        ("Completed", "Archived", "Archive", None),
    ];
    let events: Vec<StateTransitionEvent> = hops
        .iter()
        .enumerate()
        .map(|(index, (from, to, trigger, correlation))| StateTransitionEvent {
            from: StateId::new(*from),
            to: StateId::new(*to),
            trigger: TriggerId::new(*trigger),
            timestamp: Timestamp::from_unix_millis(base + (index as i64) * 60_000),
            correlation_id: correlation.map(CorrelationId::new),
            dedupe_key: None,
            definition_version: DefinitionVersion::INITIAL,
            metadata: BTreeMap::new(),
        })
        .collect();
    store.append(&entity, &events, 0).await.expect("seed");
    (store, entity)
}

#[tokio::test]
async fn content_filters_compose_conjunctively() {
    let (store, entity) = seed_log(1_700_000_000_000).await;
    let matched = HistoryQuery::new()
        .from_state("PaymentPending")
        .with_trigger("Pay")
        .fetch(&store, &entity)
        .await
        .expect("fetch");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].event.to, StateId::new("Paid"));
}

#[tokio::test]
async fn correlation_filter_matches_stamped_events() {
    let (store, entity) = seed_log(1_700_000_000_000).await;
    let count = HistoryQuery::new()
        .with_correlation("corr-1")
        .count(&store, &entity)
        .await
        .expect("count");
    assert_eq!(count, 2);
}

#[tokio::test]
async fn temporal_windows_bound_the_results() {
    let base = 1_700_000_000_000;
    let (store, entity) = seed_log(base).await;
    let now = Timestamp::from_unix_millis(base + 5 * 60_000);

    let last_two_minutes = HistoryQuery::new()
        .last_hours(0, now)
        .count(&store, &entity)
        .await
        .expect("zero window");
    assert_eq!(last_two_minutes, 1);

    let after_third = HistoryQuery::new()
        .after(Timestamp::from_unix_millis(base + 2 * 60_000))
        .count(&store, &entity)
        .await
        .expect("after");
    assert_eq!(after_third, 3);

    let ranged = HistoryQuery::new()
        .in_range(
            Timestamp::from_unix_millis(base + 60_000),
            Timestamp::from_unix_millis(base + 3 * 60_000),
        )
        .count(&store, &entity)
        .await
        .expect("range");
    assert_eq!(ranged, 3);
}

#[tokio::test]
async fn ordering_and_pagination_shape_the_list() {
    let (store, entity) = seed_log(1_700_000_000_000).await;
    let newest_first = HistoryQuery::new()
        .order(TimeOrder::Descending)
        .take(2)
        .fetch(&store, &entity)
        .await
        .expect("fetch");
    let triggers: Vec<&str> =
        newest_first.iter().map(|record| record.event.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["Archive", "Close"]);

    let middle = HistoryQuery::new()
        .skip(2)
        .take(2)
        .fetch(&store, &entity)
        .await
        .expect("fetch");
    let triggers: Vec<&str> = middle.iter().map(|record| record.event.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["Ship", "Deliver"]);
}

#[tokio::test]
async fn terminal_forms_agree() {
    let (store, entity) = seed_log(1_700_000_000_000).await;
    let query = HistoryQuery::new().with_trigger("Ship");
    assert!(query.any(&store, &entity).await.expect("any"));
    assert_eq!(query.count(&store, &entity).await.expect("count"), 1);
    let first = query.first(&store, &entity).await.expect("first").expect("present");
    assert_eq!(first.event.from, StateId::new("Paid"));

    let none = HistoryQuery::new().with_trigger("Refund");
    assert!(!none.any(&store, &entity).await.expect("any"));
}

#[tokio::test]
async fn today_filter_uses_calendar_bounds() {
    // 2023-11-14T22:13:20Z base; the last two events spill past midnight.
    let base = 1_700_000_000_000;
    let (store, entity) = seed_log(base).await;
    let now = Timestamp::from_unix_millis(base);
    let today = HistoryQuery::new().today(now).count(&store, &entity).await.expect("today");
    // Events at +0..+5 minutes all land before midnight on this base.
    assert_eq!(today, 6);

    let tomorrow = Timestamp::from_unix_millis(base + 24 * 3_600_000);
    let none = HistoryQuery::new()
        .today(tomorrow)
        .count(&store, &entity)
        .await
        .expect("tomorrow");
    assert_eq!(none, 0);
}

#[tokio::test]
async fn version_range_filters_by_producing_definition() {
    let store = InMemoryEventStore::new();
    let entity = EntityId::new("order-v");
    let mut events = Vec::new();
    for (index, version) in [
        DefinitionVersion::new(1, 0, 0),
        DefinitionVersion::new(1, 1, 0),
        DefinitionVersion::new(2, 0, 0),
    ]
    .iter()
    .enumerate()
    {
        events.push(StateTransitionEvent {
            from: StateId::new("A"),
            to: StateId::new("B"),
            trigger: TriggerId::new("go"),
            timestamp: Timestamp::from_unix_millis(index as i64),
            correlation_id: None,
            dedupe_key: None,
            definition_version: *version,
            metadata: BTreeMap::new(),
        });
    }
    store.append(&entity, &events, 0).await.expect("seed");

    let matched = HistoryQuery::new()
        .in_version_range(DefinitionVersion::new(1, 0, 0), DefinitionVersion::new(1, 9, 9))
        .count(&store, &entity)
        .await
        .expect("count");
    assert_eq!(matched, 2);
}
