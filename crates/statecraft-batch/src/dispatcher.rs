// crates/statecraft-batch/src/dispatcher.rs
// ============================================================================
// Module: Batch Dispatcher
// Description: Bounded-parallelism fan-out of trigger requests.
// Purpose: Drive many entities with retries, timeouts, and aggregation.
// Dependencies: statecraft-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! The dispatcher fans trigger requests out to many entities under a
//! counting semaphore, optionally pre-sorted by descending priority. Each
//! operation may retry technical failures with exponential backoff;
//! deterministic transition refusals never retry. Items are isolated: one
//! failure never poisons the batch unless stop-on-first-failure is set.
//! The overall timeout is a hard deadline converting still-waiting items
//! to skipped; in-flight items run to their per-operation timeout.
//! Per-entity serialization is the adapter's job; the dispatcher only
//! bounds cross-entity parallelism.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use statecraft_core::CorrelationId;
use statecraft_core::EntityId;
use statecraft_core::MachineTypeId;
use statecraft_core::StateId;
use statecraft_core::Timestamp;
use statecraft_core::TriggerArgs;
use statecraft_core::TriggerId;
use statecraft_core::interfaces::Clock;
use statecraft_core::interfaces::EntityResolver;
use statecraft_core::interfaces::FireError;
use statecraft_core::runtime::SystemClock;

// ============================================================================
// SECTION: Wire Identity
// ============================================================================

/// Stable wire id for [`BatchRequest`].
pub const BATCH_REQUEST_WIRE_ID: &str = "statecraft.batch.request.v1";

/// Stable wire id for [`BatchItemResult`].
pub const BATCH_ITEM_WIRE_ID: &str = "statecraft.batch.item.v1";

/// Stable wire id for [`BatchResult`].
pub const BATCH_RESULT_WIRE_ID: &str = "statecraft.batch.result.v1";

/// `error_kind` label for items skipped before execution.
pub const SKIPPED_ERROR_KIND: &str = "skipped";

// ============================================================================
// SECTION: Requests
// ============================================================================

/// One trigger request addressed to one entity.
///
/// Wire id `statecraft.batch.request.v1`; field numbers are part of the
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Field 0: target entity.
    pub entity_id: EntityId,
    /// Field 1: trigger to fire.
    pub trigger: TriggerId,
    /// Field 2: positional trigger arguments as JSON values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Field 3: optional correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,
    /// Field 4: optional metadata for the caller's bookkeeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Field 5: scheduling priority; higher runs earlier when priority
    /// ordering is enabled.
    #[serde(default)]
    pub priority: i32,
}

impl BatchRequest {
    /// Creates a request with default priority and no payload.
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, trigger: impl Into<TriggerId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            trigger: trigger.into(),
            args: Vec::new(),
            correlation: None,
            metadata: None,
            priority: 0,
        }
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches a correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation: impl Into<CorrelationId>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Batch execution options.
#[derive(Clone)]
pub struct BatchOptions {
    /// Concurrent operation cap.
    pub max_parallelism: usize,
    /// Stop scheduling new operations after the first failure.
    pub stop_on_first_failure: bool,
    /// Hard deadline for the whole batch.
    pub overall_timeout: Option<Duration>,
    /// Bound on one operation attempt.
    pub per_op_timeout: Option<Duration>,
    /// Maximum attempts per operation (at least 1).
    pub retry_attempts: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Double the delay per attempt (otherwise constant).
    pub exponential_backoff: bool,
    /// Pre-sort requests by descending priority.
    pub order_by_priority: bool,
    /// Cancellation token; stops scheduling of new operations.
    pub cancellation: CancellationToken,
    /// Time source for the aggregate timestamps.
    pub clock: Arc<dyn Clock>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            stop_on_first_failure: false,
            overall_timeout: None,
            per_op_timeout: None,
            retry_attempts: 1,
            retry_delay: Duration::from_millis(100),
            exponential_backoff: true,
            order_by_priority: false,
            cancellation: CancellationToken::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOptions")
            .field("max_parallelism", &self.max_parallelism)
            .field("stop_on_first_failure", &self.stop_on_first_failure)
            .field("overall_timeout", &self.overall_timeout)
            .field("per_op_timeout", &self.per_op_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("order_by_priority", &self.order_by_priority)
            .finish()
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome of one batch item.
///
/// Wire id `statecraft.batch.item.v1`; field numbers are part of the
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Field 0: target entity.
    pub entity_id: EntityId,
    /// Field 1: whether the trigger was applied.
    pub success: bool,
    /// Field 2: source state on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<StateId>,
    /// Field 3: target state on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<StateId>,
    /// Field 4: failure message when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Field 5: failure classification label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Field 6: wall time spent on the item in milliseconds.
    pub duration_ms: u64,
    /// Field 7: correlation id echoed from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,
    /// Field 8: original submission index.
    pub batch_index: usize,
}

impl BatchItemResult {
    /// Returns `true` when the item was skipped before execution.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.error_kind.as_deref() == Some(SKIPPED_ERROR_KIND)
    }
}

/// Aggregate outcome of one batch.
///
/// Wire id `statecraft.batch.result.v1`; field numbers are part of the
/// contract.
///
/// # Invariants
/// - `success_count + failure_count + skipped_count == total`.
/// - `items` is ordered by `batch_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Field 0: submitted request count.
    pub total: usize,
    /// Field 1: applied trigger count.
    pub success_count: usize,
    /// Field 2: failed item count.
    pub failure_count: usize,
    /// Field 3: skipped item count.
    pub skipped_count: usize,
    /// Field 4: wall time for the whole batch in milliseconds.
    pub duration_ms: u64,
    /// Field 5: when the batch started.
    pub started_at: Timestamp,
    /// Field 6: when the batch finished.
    pub completed_at: Timestamp,
    /// Field 7: per-item results ordered by submission index.
    pub items: Vec<BatchItemResult>,
}

impl BatchResult {
    /// Returns the success rate in `0.0 ..= 1.0`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "Batch sizes are far below the f64 integer bound."
    )]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.total as f64
    }
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Executes a batch of trigger requests against `machine_type` entities.
#[allow(
    clippy::too_many_lines,
    reason = "Single linear flow keeps scheduling and aggregation auditable."
)]
pub async fn execute_batch(
    resolver: Arc<dyn EntityResolver>,
    machine_type: MachineTypeId,
    requests: Vec<BatchRequest>,
    options: BatchOptions,
) -> BatchResult {
    let started_at = options.clock.now();
    let batch_start = Instant::now();
    let total = requests.len();
    let deadline = options.overall_timeout.map(|timeout| batch_start + timeout);

    let mut indexed: Vec<(usize, BatchRequest)> = requests.into_iter().enumerate().collect();
    if options.order_by_priority {
        indexed.sort_by_key(|(_, request)| std::cmp::Reverse(request.priority));
    }

    let semaphore = Arc::new(Semaphore::new(options.max_parallelism.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let mut join: JoinSet<BatchItemResult> = JoinSet::new();

    for (batch_index, request) in indexed {
        let resolver = Arc::clone(&resolver);
        let machine_type = machine_type.clone();
        let semaphore = Arc::clone(&semaphore);
        let stop = Arc::clone(&stop);
        let options = options.clone();
        join.spawn(async move {
            let item_start = Instant::now();
            let permit = match deadline {
                Some(deadline) => tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    () = tokio::time::sleep_until(deadline.into()) => None,
                    () = options.cancellation.cancelled() => None,
                },
                None => tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    () = options.cancellation.cancelled() => None,
                },
            };
            let still_schedulable = permit.is_some()
                && !stop.load(Ordering::SeqCst)
                && !options.cancellation.is_cancelled()
                && deadline.is_none_or(|deadline| Instant::now() < deadline);
            if !still_schedulable {
                return skipped_item(&request, batch_index, item_start);
            }

            let result =
                run_item(&*resolver, &machine_type, &request, batch_index, &options, item_start)
                    .await;
            if !result.success && options.stop_on_first_failure {
                stop.store(true, Ordering::SeqCst);
            }
            result
        });
    }

    let mut items: Vec<BatchItemResult> = Vec::with_capacity(total);
    while let Some(joined) = join.join_next().await {
        if let Ok(item) = joined {
            items.push(item);
        }
    }
    items.sort_by_key(|item| item.batch_index);

    let success_count = items.iter().filter(|item| item.success).count();
    let skipped_count = items.iter().filter(|item| item.is_skipped()).count();
    let failure_count = items.len() - success_count - skipped_count;
    BatchResult {
        total,
        success_count,
        failure_count,
        skipped_count,
        duration_ms: u64::try_from(batch_start.elapsed().as_millis()).unwrap_or(u64::MAX),
        started_at,
        completed_at: options.clock.now(),
        items,
    }
}

/// Runs one item with per-attempt timeout and retry-on-technical-failure.
async fn run_item(
    resolver: &dyn EntityResolver,
    machine_type: &MachineTypeId,
    request: &BatchRequest,
    batch_index: usize,
    options: &BatchOptions,
    item_start: Instant,
) -> BatchItemResult {
    let args = match TriggerArgs::from_values(&request.args) {
        Ok(args) => args,
        Err(err) => {
            return failed_item(request, batch_index, item_start, &err.to_string(), "arguments");
        }
    };
    let entity = match resolver.resolve(machine_type, &request.entity_id).await {
        Ok(entity) => entity,
        Err(err) => {
            return failed_item(request, batch_index, item_start, &err.to_string(), "not_found");
        }
    };

    let max_attempts = options.retry_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let fire = entity.fire(&request.trigger, &args, request.correlation.as_ref(), None);
        let outcome = match options.per_op_timeout {
            Some(per_op) => match tokio::time::timeout(per_op, fire).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FireError::Timeout),
            },
            None => fire.await,
        };

        match outcome {
            Ok(receipt) => {
                return BatchItemResult {
                    entity_id: request.entity_id.clone(),
                    success: true,
                    from: Some(receipt.from),
                    to: Some(receipt.to),
                    error: None,
                    error_kind: None,
                    duration_ms: elapsed_ms(item_start),
                    correlation: request.correlation.clone(),
                    batch_index,
                };
            }
            Err(err) => {
                let retryable = !err.is_business() && attempt < max_attempts;
                if !retryable {
                    return failed_item(
                        request,
                        batch_index,
                        item_start,
                        &err.to_string(),
                        error_kind(&err),
                    );
                }
                let delay = if options.exponential_backoff {
                    let shift = (attempt - 1).min(16);
                    options.retry_delay.saturating_mul(1u32 << shift)
                } else {
                    options.retry_delay
                };
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Builds a skipped item result.
fn skipped_item(request: &BatchRequest, batch_index: usize, item_start: Instant) -> BatchItemResult {
    BatchItemResult {
        entity_id: request.entity_id.clone(),
        success: false,
        from: None,
        to: None,
        error: Some("skipped before execution".to_string()),
        error_kind: Some(SKIPPED_ERROR_KIND.to_string()),
        duration_ms: elapsed_ms(item_start),
        correlation: request.correlation.clone(),
        batch_index,
    }
}

/// Builds a failed item result.
fn failed_item(
    request: &BatchRequest,
    batch_index: usize,
    item_start: Instant,
    error: &str,
    kind: &str,
) -> BatchItemResult {
    BatchItemResult {
        entity_id: request.entity_id.clone(),
        success: false,
        from: None,
        to: None,
        error: Some(error.to_string()),
        error_kind: Some(kind.to_string()),
        duration_ms: elapsed_ms(item_start),
        correlation: request.correlation.clone(),
        batch_index,
    }
}

/// Classifies a fire error into a stable label.
fn error_kind(err: &FireError) -> &'static str {
    match err {
        FireError::Transition(_) => "transition",
        FireError::Storage(_) => "storage",
        FireError::NotFound(_) => "not_found",
        FireError::Cancelled => "cancelled",
        FireError::Timeout => "timeout",
    }
}

/// Elapsed wall time in milliseconds.
fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
