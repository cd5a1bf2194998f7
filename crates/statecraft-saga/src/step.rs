// crates/statecraft-saga/src/step.rs
// ============================================================================
// Module: Saga Steps
// Description: Step handlers, outcomes, conditions, and shared saga data.
// Purpose: Define the executable surface one workflow step exposes.
// Dependencies: statecraft-core, async-trait, serde_json, tokio, tokio-util
// ============================================================================

//! ## Overview
//! A step is an interface value pairing an execute action with an optional
//! compensation. Outcomes classify failures: business failures are
//! deterministic and never retried, technical failures are retryable.
//! Conditions gate steps against the run context (completed and failed
//! step sets plus the shared saga data) and are evaluated just before the
//! step's level runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use statecraft_core::CorrelationId;
use statecraft_core::StepName;

// ============================================================================
// SECTION: Saga Data
// ============================================================================

/// Shared, JSON-valued key/value data visible to every step of one run.
///
/// # Invariants
/// - Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct SagaData {
    /// Shared map guarded for cross-task mutation.
    values: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl SagaData {
    /// Creates empty saga data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a serializable value under `key`.
    pub fn put(&self, key: impl Into<String>, value: impl serde::Serialize) {
        if let (Ok(mut values), Ok(json)) = (self.values.write(), serde_json::to_value(value)) {
            values.insert(key.into(), json);
        }
    }

    /// Reads the value under `key`, when present and deserializable.
    #[must_use]
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.read().ok()?;
        values.get(key).cloned().and_then(|value| serde_json::from_value(value).ok())
    }

    /// Returns a point-in-time copy of the whole map.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.read().map(|values| values.clone()).unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of one step execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded with a result value.
    Success(Value),
    /// Deterministic refusal; never retried, triggers compensation.
    BusinessFailure(String),
    /// Transient failure; retried with backoff, then compensation.
    TechnicalFailure(String),
}

impl StepOutcome {
    /// A success with no payload.
    #[must_use]
    pub const fn done() -> Self {
        Self::Success(Value::Null)
    }
}

/// Result of one compensation invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationOutcome {
    /// Whether the compensation succeeded.
    pub success: bool,
    /// Failure detail when it did not.
    pub error: Option<String>,
}

impl CompensationOutcome {
    /// A successful compensation.
    #[must_use]
    pub const fn done() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed compensation.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// SECTION: Contexts
// ============================================================================

/// Context passed to step executions.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Step under execution.
    pub step: StepName,
    /// Correlation id of the run.
    pub correlation_id: CorrelationId,
    /// Shared saga data.
    pub saga_data: SagaData,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancellation token for the run.
    pub cancellation: CancellationToken,
}

/// Context passed to compensations.
#[derive(Debug, Clone)]
pub struct CompensationContext {
    /// Step being compensated.
    pub step: StepName,
    /// Correlation id of the run.
    pub correlation_id: CorrelationId,
    /// Shared saga data.
    pub saga_data: SagaData,
    /// Result value the step originally produced.
    pub original_result: Value,
}

/// Context for condition evaluation.
#[derive(Debug, Clone)]
pub struct ConditionContext<'a> {
    /// Steps completed so far.
    pub completed: &'a BTreeSet<StepName>,
    /// Steps failed so far.
    pub failed: &'a BTreeSet<StepName>,
    /// Shared saga data.
    pub saga_data: &'a SagaData,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// One workflow step: an execute action with an optional compensation.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Executes the step. Each retry attempt calls this again with a fresh
    /// context.
    async fn execute(&self, ctx: StepContext) -> StepOutcome;

    /// Undoes the step after a downstream failure. Defaults to a no-op
    /// success for steps with nothing to undo.
    async fn compensate(&self, ctx: CompensationContext) -> CompensationOutcome {
        let _ = ctx;
        CompensationOutcome::done()
    }
}

/// Boxed step future.
type StepFuture = Pin<Box<dyn Future<Output = StepOutcome> + Send>>;

/// Boxed compensation future.
type CompensationFuture = Pin<Box<dyn Future<Output = CompensationOutcome> + Send>>;

/// Handler assembled from closures.
struct FnStepHandler {
    /// Execute closure.
    execute: Arc<dyn Fn(StepContext) -> StepFuture + Send + Sync>,
    /// Optional compensation closure.
    compensate: Option<Arc<dyn Fn(CompensationContext) -> CompensationFuture + Send + Sync>>,
}

#[async_trait]
impl StepHandler for FnStepHandler {
    async fn execute(&self, ctx: StepContext) -> StepOutcome {
        (self.execute)(ctx).await
    }

    async fn compensate(&self, ctx: CompensationContext) -> CompensationOutcome {
        match &self.compensate {
            Some(compensate) => compensate(ctx).await,
            None => CompensationOutcome::done(),
        }
    }
}

/// Creates a step handler from an async execute closure.
#[must_use]
pub fn step<F, Fut>(execute: F) -> Arc<dyn StepHandler>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepOutcome> + Send + 'static,
{
    Arc::new(FnStepHandler {
        execute: Arc::new(move |ctx| Box::pin(execute(ctx))),
        compensate: None,
    })
}

/// Creates a step handler with a compensation closure.
#[must_use]
pub fn step_with_compensation<F, Fut, C, CFut>(execute: F, compensate: C) -> Arc<dyn StepHandler>
where
    F: Fn(StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepOutcome> + Send + 'static,
    C: Fn(CompensationContext) -> CFut + Send + Sync + 'static,
    CFut: Future<Output = CompensationOutcome> + Send + 'static,
{
    Arc::new(FnStepHandler {
        execute: Arc::new(move |ctx| Box::pin(execute(ctx))),
        compensate: Some(Arc::new(move |ctx| Box::pin(compensate(ctx)))),
    })
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Gate deciding whether a step runs in the current context.
pub trait StepCondition: Send + Sync {
    /// Returns the symbolic condition name (used in skip reporting).
    fn name(&self) -> &str;

    /// Evaluates the condition.
    fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool;
}

/// Condition backed by a closure.
struct FnCondition<F> {
    /// Symbolic condition name.
    name: String,
    /// Predicate closure.
    predicate: F,
}

impl<F> StepCondition for FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

/// Creates a condition from a symbolic name and a predicate closure.
#[must_use]
pub fn condition<F>(name: impl Into<String>, predicate: F) -> Arc<dyn StepCondition>
where
    F: Fn(&ConditionContext<'_>) -> bool + Send + Sync + 'static,
{
    Arc::new(FnCondition {
        name: name.into(),
        predicate,
    })
}

impl fmt::Debug for dyn StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StepCondition").field(&self.name()).finish()
    }
}
