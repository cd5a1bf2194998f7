// system-tests/tests/batch_dispatch.rs
// ============================================================================
// Module: Batch Dispatch Scenarios
// Description: Fan-out over real actors with stop-on-first-failure.
// Purpose: Exercise the dispatcher against the full actor stack.
// Dependencies: system-tests, statecraft-batch, statecraft-actor
// ============================================================================

//! End-to-end batch scenario: ten entities, bounded parallelism, one
//! deterministic failure, stop-on-first-failure semantics.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use statecraft_actor::EventSourcingOptions;
use statecraft_actor::LocalEntityRegistry;
use statecraft_batch::BatchOptions;
use statecraft_batch::BatchRequest;
use statecraft_batch::execute_batch;
use statecraft_core::MachineTypeId;
use system_tests::Harness;

#[tokio::test]
async fn batch_with_stop_on_first_failure_accounts_for_every_item() {
    let harness = Harness::new();
    let registry = Arc::new(LocalEntityRegistry::new());
    let machine_type = MachineTypeId::new("Order");

    // Ten orders; all but #4 are submitted, so `Pay` fails only on #4.
    for index in 0 .. 10 {
        let actor = harness
            .order_actor(&format!("order-{index}"), EventSourcingOptions::default())
            .await;
        if index != 4 {
            actor.fire("Submit").await.expect("submit");
        }
        registry.register(&machine_type, actor);
    }

    let requests: Vec<BatchRequest> = (0 .. 10)
        .map(|index| {
            BatchRequest::new(format!("order-{index}"), "Pay").with_correlation("batch-7")
        })
        .collect();
    let options = BatchOptions {
        max_parallelism: 3,
        stop_on_first_failure: true,
        ..BatchOptions::default()
    };
    let result = execute_batch(registry, machine_type, requests, options).await;

    assert_eq!(result.total, 10);
    assert_eq!(
        result.success_count + result.failure_count + result.skipped_count,
        10
    );
    assert!(result.failure_count >= 1);

    // Items report their submission index regardless of scheduling order.
    let indexes: Vec<usize> = result.items.iter().map(|item| item.batch_index).collect();
    assert_eq!(indexes, (0 .. 10).collect::<Vec<_>>());

    // The deterministic refusal names entity #4.
    let failed = result
        .items
        .iter()
        .find(|item| !item.success && !item.is_skipped())
        .expect("failed item");
    assert_eq!(failed.entity_id.as_str(), "order-4");
    assert_eq!(failed.error_kind.as_deref(), Some("transition"));

    // Successful items carry the transition endpoints and correlation.
    let succeeded = result.items.iter().find(|item| item.success).expect("successful item");
    assert_eq!(succeeded.from.as_ref().map(statecraft_core::StateId::as_str), Some("PaymentPending"));
    assert_eq!(succeeded.to.as_ref().map(statecraft_core::StateId::as_str), Some("Paid"));
    assert_eq!(
        succeeded.correlation.as_ref().map(statecraft_core::CorrelationId::as_str),
        Some("batch-7")
    );
}
