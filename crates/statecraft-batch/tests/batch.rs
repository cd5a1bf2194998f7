// crates/statecraft-batch/tests/batch.rs
// ============================================================================
// Module: Batch Dispatcher Tests
// Description: Validate fan-out, retries, skipping, and aggregation.
// Purpose: Ensure per-item isolation and stop-on-first-failure semantics.
// Dependencies: statecraft-batch, statecraft-core, tokio
// ============================================================================

//! Behavior tests for the batch dispatcher.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use statecraft_batch::BatchOptions;
use statecraft_batch::BatchRequest;
use statecraft_batch::execute_batch;
use statecraft_core::CorrelationId;
use statecraft_core::DedupeKey;
use statecraft_core::EntityId;
use statecraft_core::MachineTypeId;
use statecraft_core::StateId;
use statecraft_core::Timestamp;
use statecraft_core::TransitionError;
use statecraft_core::TriggerArgs;
use statecraft_core::TriggerId;
use statecraft_core::interfaces::EntityRef;
use statecraft_core::interfaces::EntityResolver;
use statecraft_core::interfaces::FireError;
use statecraft_core::interfaces::FireReceipt;
use statecraft_core::interfaces::ResolveError;

// ============================================================================
// SECTION: Stub Entities
// ============================================================================

/// Scripted behavior for one stub entity.
#[derive(Debug, Clone)]
enum Script {
    /// Succeed immediately.
    Ok,
    /// Refuse deterministically.
    Refuse,
    /// Fail with a storage error `failures` times, then succeed.
    FlakyStorage(u32),
    /// Sleep before succeeding.
    Slow(Duration),
}

/// Stub entity executing its script.
struct StubEntity {
    /// Scripted behavior.
    script: Script,
    /// Remaining scripted failures.
    remaining_failures: AtomicU32,
    /// Number of fire calls observed.
    calls: AtomicU32,
    /// Concurrency probe shared across entities.
    in_flight: Arc<AtomicUsize>,
    /// Highest concurrency observed.
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl EntityRef for StubEntity {
    async fn fire(
        &self,
        _trigger: &TriggerId,
        _args: &TriggerArgs,
        correlation: Option<&CorrelationId>,
        _dedupe: Option<&DedupeKey>,
    ) -> Result<FireReceipt, FireError> {
        let _ = correlation;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let result = match &self.script {
            Script::Ok => Ok(receipt()),
            Script::Refuse => Err(FireError::Transition(TransitionError::NoTransition {
                trigger: TriggerId::new("go"),
                from: StateId::new("Idle"),
            })),
            Script::FlakyStorage(_) => {
                if self.remaining_failures.load(Ordering::SeqCst) > 0 {
                    self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                    Err(FireError::Storage("transient".to_string()))
                } else {
                    Ok(receipt())
                }
            }
            Script::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(receipt())
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn current_state(&self) -> Result<StateId, FireError> {
        Ok(StateId::new("Idle"))
    }
}

/// Receipt returned by successful stub fires.
fn receipt() -> FireReceipt {
    FireReceipt {
        from: StateId::new("Idle"),
        to: StateId::new("Done"),
        deduplicated: false,
        fired_at: Timestamp::from_unix_millis(0),
    }
}

/// Resolver over scripted stub entities.
#[derive(Default)]
struct StubResolver {
    /// Scripted entities by id.
    entities: Mutex<HashMap<String, Arc<StubEntity>>>,
    /// Concurrency probe shared across entities.
    in_flight: Arc<AtomicUsize>,
    /// Highest concurrency observed.
    peak: Arc<AtomicUsize>,
}

impl StubResolver {
    /// Registers a scripted entity.
    fn script(&self, entity: &str, script: Script) {
        let failures = match script {
            Script::FlakyStorage(count) => count,
            _ => 0,
        };
        if let Ok(mut entities) = self.entities.lock() {
            entities.insert(
                entity.to_string(),
                Arc::new(StubEntity {
                    script,
                    remaining_failures: AtomicU32::new(failures),
                    calls: AtomicU32::new(0),
                    in_flight: Arc::clone(&self.in_flight),
                    peak: Arc::clone(&self.peak),
                }),
            );
        }
    }

    /// Returns the observed call count for an entity.
    fn calls(&self, entity: &str) -> u32 {
        self.entities
            .lock()
            .ok()
            .and_then(|entities| {
                entities.get(entity).map(|stub| stub.calls.load(Ordering::SeqCst))
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntityResolver for StubResolver {
    async fn resolve(
        &self,
        machine_type: &MachineTypeId,
        entity: &EntityId,
    ) -> Result<Arc<dyn EntityRef>, ResolveError> {
        let entities = self
            .entities
            .lock()
            .map_err(|_| ResolveError::Backend("stub registry poisoned".to_string()))?;
        entities
            .get(entity.as_str())
            .map(|stub| Arc::clone(stub) as Arc<dyn EntityRef>)
            .ok_or_else(|| ResolveError::Unknown {
                machine_type: machine_type.clone(),
                entity: entity.clone(),
            })
    }
}

/// Builds a resolver with `count` scripted entities named `e0..`.
fn resolver_with(count: usize, script: &Script) -> Arc<StubResolver> {
    let resolver = Arc::new(StubResolver::default());
    for index in 0 .. count {
        resolver.script(&format!("e{index}"), script.clone());
    }
    resolver
}

/// Builds `count` requests addressed to `e0..`.
fn requests(count: usize) -> Vec<BatchRequest> {
    (0 .. count).map(|index| BatchRequest::new(format!("e{index}"), "go")).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn fan_out_aggregates_and_preserves_submission_order() {
    let resolver = resolver_with(10, &Script::Ok);
    let result = execute_batch(
        resolver,
        MachineTypeId::new("Order"),
        requests(10),
        BatchOptions::default(),
    )
    .await;

    assert_eq!(result.total, 10);
    assert_eq!(result.success_count, 10);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.skipped_count, 0);
    let indexes: Vec<usize> = result.items.iter().map(|item| item.batch_index).collect();
    assert_eq!(indexes, (0 .. 10).collect::<Vec<_>>());
    assert!((result.success_rate() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn parallelism_stays_within_the_semaphore_cap() {
    let resolver = resolver_with(12, &Script::Slow(Duration::from_millis(30)));
    let peak = Arc::clone(&resolver.peak);
    let options = BatchOptions {
        max_parallelism: 3,
        ..BatchOptions::default()
    };
    let result =
        execute_batch(resolver, MachineTypeId::new("Order"), requests(12), options).await;

    assert_eq!(result.success_count, 12);
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn technical_failures_retry_and_business_failures_do_not() {
    let resolver = Arc::new(StubResolver::default());
    resolver.script("flaky", Script::FlakyStorage(2));
    resolver.script("refusing", Script::Refuse);
    let options = BatchOptions {
        retry_attempts: 4,
        retry_delay: Duration::from_millis(2),
        ..BatchOptions::default()
    };
    let batch = vec![
        BatchRequest::new("flaky", "go"),
        BatchRequest::new("refusing", "go"),
    ];
    let result =
        execute_batch(
            Arc::clone(&resolver) as Arc<dyn EntityResolver>,
            MachineTypeId::new("Order"),
            batch,
            options,
        )
        .await;

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    // Two storage failures then success.
    assert_eq!(resolver.calls("flaky"), 3);
    // Deterministic refusals never retry.
    assert_eq!(resolver.calls("refusing"), 1);
    let refusal = result.items.iter().find(|item| item.entity_id.as_str() == "refusing");
    assert_eq!(
        refusal.and_then(|item| item.error_kind.as_deref()),
        Some("transition")
    );
}

#[tokio::test]
async fn stop_on_first_failure_skips_later_items() {
    let resolver = Arc::new(StubResolver::default());
    for index in 0 .. 10 {
        let script = if index == 4 {
            Script::Refuse
        } else {
            Script::Slow(Duration::from_millis(10))
        };
        resolver.script(&format!("e{index}"), script);
    }
    let options = BatchOptions {
        max_parallelism: 1,
        stop_on_first_failure: true,
        ..BatchOptions::default()
    };
    let result =
        execute_batch(resolver, MachineTypeId::new("Order"), requests(10), options).await;

    assert_eq!(result.total, 10);
    assert_eq!(
        result.success_count + result.failure_count + result.skipped_count,
        10
    );
    assert_eq!(result.failure_count, 1);
    assert!(result.skipped_count >= 1);
    // Every item reports its original index regardless of outcome.
    let indexes: Vec<usize> = result.items.iter().map(|item| item.batch_index).collect();
    assert_eq!(indexes, (0 .. 10).collect::<Vec<_>>());
}

#[tokio::test]
async fn overall_timeout_promotes_waiting_items_to_skipped() {
    let resolver = resolver_with(6, &Script::Slow(Duration::from_millis(60)));
    let options = BatchOptions {
        max_parallelism: 1,
        overall_timeout: Some(Duration::from_millis(100)),
        ..BatchOptions::default()
    };
    let result =
        execute_batch(resolver, MachineTypeId::new("Order"), requests(6), options).await;

    assert_eq!(result.total, 6);
    assert!(result.skipped_count >= 1);
    assert!(result.success_count >= 1);
    assert_eq!(
        result.success_count + result.failure_count + result.skipped_count,
        6
    );
}

#[tokio::test]
async fn priority_ordering_runs_high_priority_first() {
    let resolver = resolver_with(3, &Script::Ok);
    let options = BatchOptions {
        max_parallelism: 1,
        order_by_priority: true,
        ..BatchOptions::default()
    };
    let batch = vec![
        BatchRequest::new("e0", "go").with_priority(1),
        BatchRequest::new("e1", "go").with_priority(9),
        BatchRequest::new("e2", "go").with_priority(5),
    ];
    let result = execute_batch(resolver, MachineTypeId::new("Order"), batch, options).await;

    assert_eq!(result.success_count, 3);
    // Submission order is preserved in the aggregate regardless of the
    // scheduling order.
    let entities: Vec<&str> =
        result.items.iter().map(|item| item.entity_id.as_str()).collect();
    assert_eq!(entities, vec!["e0", "e1", "e2"]);
}

#[tokio::test]
async fn unknown_entities_fail_without_poisoning_the_batch() {
    let resolver = Arc::new(StubResolver::default());
    resolver.script("known", Script::Ok);
    let batch = vec![
        BatchRequest::new("known", "go"),
        BatchRequest::new("ghost", "go"),
    ];
    let result = execute_batch(
        resolver,
        MachineTypeId::new("Order"),
        batch,
        BatchOptions::default(),
    )
    .await;

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    let ghost = result.items.iter().find(|item| item.entity_id.as_str() == "ghost");
    assert_eq!(ghost.and_then(|item| item.error_kind.as_deref()), Some("not_found"));
}
