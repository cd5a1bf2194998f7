// crates/statecraft-saga/src/executor.rs
// ============================================================================
// Module: Saga Executor
// Description: Level-parallel execution with retry, timeout, compensation.
// Purpose: Drive a validated workflow to completion or compensated rollback.
// Dependencies: statecraft-core, crate::{builder, graph, report, step}, tokio
// ============================================================================

//! ## Overview
//! The executor is single-threaded per run: it walks the execution levels
//! in order, gates each step on its condition, runs one level's ready
//! steps concurrently, and collects results in completion order. Technical
//! failures retry with exponential backoff (capped at 30 seconds between
//! attempts); business failures never retry. A failure on a
//! non-continuable step compensates every completed step in reverse
//! completion order and fails the run; failures on continuable steps defer
//! compensation to the end of the run.
//!
//! Per-entity serialization is not this component's job: cross-entity
//! calls inside step handlers go through the actor adapter, whose mutex
//! guarantees the orchestrator never drives concurrent fires into one
//! entity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use statecraft_core::CorrelationId;
use statecraft_core::StepName;
use statecraft_core::interfaces::Clock;
use statecraft_core::runtime::SystemClock;

use crate::builder::StepConfig;
use crate::builder::WorkflowConfig;
use crate::graph::ExecutionGraph;
use crate::graph::GraphError;
use crate::report::CompensationRecord;
use crate::report::SagaReport;
use crate::report::SagaStatus;
use crate::report::SagaStepResult;
use crate::step::CompensationContext;
use crate::step::ConditionContext;
use crate::step::SagaData;
use crate::step::StepContext;
use crate::step::StepOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cap on the delay between retry attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Options
// ============================================================================

/// Run-level options for the executor.
#[derive(Clone)]
pub struct SagaOptions {
    /// Cancellation token observed between levels and inside attempts.
    pub cancellation: CancellationToken,
    /// Time source for report timestamps.
    pub clock: Arc<dyn Clock>,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for SagaOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOptions")
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Level-parallel saga executor.
#[derive(Debug, Default)]
pub struct SagaExecutor {
    /// Run-level options.
    options: SagaOptions,
}

impl SagaExecutor {
    /// Creates an executor with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with explicit options.
    #[must_use]
    pub const fn with_options(options: SagaOptions) -> Self {
        Self {
            options,
        }
    }

    /// Runs the workflow to a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] when the workflow fails validation; execution
    /// failures are reported inside the [`SagaReport`], not as errors.
    #[allow(
        clippy::too_many_lines,
        reason = "Single linear flow keeps the ordered run bookkeeping auditable."
    )]
    pub async fn run(
        &self,
        config: &WorkflowConfig,
        correlation: CorrelationId,
        saga_data: SagaData,
    ) -> Result<SagaReport, GraphError> {
        let graph = ExecutionGraph::build(config)?;
        let by_name: BTreeMap<StepName, StepConfig> =
            config.steps.iter().map(|step| (step.name.clone(), step.clone())).collect();

        let started_at = self.options.clock.now();
        let run_start = Instant::now();
        let deadline = config.overall_timeout.map(|timeout| run_start + timeout);

        let mut completed: Vec<StepName> = Vec::new();
        let mut completed_set: BTreeSet<StepName> = BTreeSet::new();
        let mut failed: Vec<StepName> = Vec::new();
        let mut failed_set: BTreeSet<StepName> = BTreeSet::new();
        let mut skipped: Vec<StepName> = Vec::new();
        let mut step_results: Vec<(StepName, SagaStepResult)> = Vec::new();
        let mut original_results: BTreeMap<StepName, Value> = BTreeMap::new();
        let mut abort: Option<SagaStatus> = None;

        // The run is `Started` until the first level is scheduled and
        // `Running` from then on; only terminal statuses reach the report.
        for level in &graph.levels {
            if self.options.cancellation.is_cancelled() {
                abort = Some(SagaStatus::Cancelled);
                break;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        abort = Some(SagaStatus::Failed);
                        break;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            // Conditions gate against the context accumulated so far.
            let mut ready: Vec<StepConfig> = Vec::new();
            for name in level {
                let Some(step) = by_name.get(name) else {
                    continue;
                };
                let runnable = step.condition.as_ref().is_none_or(|condition| {
                    condition.evaluate(&ConditionContext {
                        completed: &completed_set,
                        failed: &failed_set,
                        saga_data: &saga_data,
                    })
                });
                if runnable {
                    ready.push(step.clone());
                } else {
                    skipped.push(name.clone());
                }
            }

            // One level runs concurrently; results arrive in completion
            // order, which compensation later reverses.
            let mut join: JoinSet<(StepName, SagaStepResult)> = JoinSet::new();
            for step in ready {
                let ctx_correlation = correlation.clone();
                let ctx_data = saga_data.clone();
                let cancellation = self.options.cancellation.clone();
                let clock = Arc::clone(&self.options.clock);
                let attempt_timeout = remaining.map_or(config.step_timeout, |remaining| {
                    config.step_timeout.min(remaining)
                });
                join.spawn(async move {
                    let name = step.name.clone();
                    let result = execute_with_retry(
                        &step,
                        ctx_correlation,
                        ctx_data,
                        cancellation,
                        clock,
                        attempt_timeout,
                    )
                    .await;
                    (name, result)
                });
            }

            let mut level_abort = false;
            while let Some(joined) = join.join_next().await {
                let Ok((name, result)) = joined else {
                    // A panicked step task counts as a technical failure of
                    // the level; the run cannot attribute it to one step.
                    level_abort = true;
                    continue;
                };
                if result.success {
                    completed.push(name.clone());
                    completed_set.insert(name.clone());
                    original_results.insert(name.clone(), result.result.clone());
                } else {
                    failed.push(name.clone());
                    failed_set.insert(name.clone());
                    let continuable =
                        by_name.get(&name).is_some_and(|step| step.continue_on_failure);
                    if !continuable {
                        level_abort = true;
                    }
                }
                step_results.push((name, result));
            }
            if level_abort {
                abort = Some(SagaStatus::Failed);
                break;
            }
        }

        // Terminal status and compensation policy.
        let (final_status, run_compensation) = match abort {
            Some(SagaStatus::Cancelled) => (SagaStatus::Cancelled, true),
            Some(_) => (SagaStatus::Failed, true),
            None if failed.is_empty() => (SagaStatus::Completed, false),
            None => (SagaStatus::Compensated, true),
        };

        let mut compensations: Vec<(StepName, CompensationRecord)> = Vec::new();
        let mut compensation_succeeded = None;
        if run_compensation && !completed.is_empty() {
            let mut all_ok = true;
            for name in completed.iter().rev() {
                let Some(step) = by_name.get(name) else {
                    continue;
                };
                let compensated_at = self.options.clock.now();
                let compensation_start = Instant::now();
                let outcome = step
                    .handler
                    .compensate(CompensationContext {
                        step: name.clone(),
                        correlation_id: correlation.clone(),
                        saga_data: saga_data.clone(),
                        original_result: original_results
                            .get(name)
                            .cloned()
                            .unwrap_or(Value::Null),
                    })
                    .await;
                all_ok &= outcome.success;
                compensations.push((name.clone(), CompensationRecord {
                    success: outcome.success,
                    error: outcome.error,
                    exception: None,
                    compensated_at,
                    duration_ms: u64::try_from(compensation_start.elapsed().as_millis())
                        .unwrap_or(u64::MAX),
                }));
            }
            compensation_succeeded = Some(all_ok);
        }

        Ok(SagaReport {
            workflow: config.name.clone(),
            correlation_id: correlation,
            status: final_status,
            started_at,
            completed_at: self.options.clock.now(),
            completed,
            failed,
            skipped,
            step_results,
            compensations,
            compensation_succeeded,
            warnings: graph.warnings,
        })
    }
}

// ============================================================================
// SECTION: Retry Loop
// ============================================================================

/// Executes one step with retry-on-technical-failure semantics.
async fn execute_with_retry(
    step: &StepConfig,
    correlation: CorrelationId,
    saga_data: SagaData,
    cancellation: CancellationToken,
    clock: Arc<dyn Clock>,
    attempt_timeout: Duration,
) -> SagaStepResult {
    let mut attempt = 1u32;
    loop {
        if cancellation.is_cancelled() {
            return cancelled_result(&clock);
        }
        let executed_at = clock.now();
        let attempt_start = Instant::now();
        let ctx = StepContext {
            step: step.name.clone(),
            correlation_id: correlation.clone(),
            saga_data: saga_data.clone(),
            attempt,
            cancellation: cancellation.clone(),
        };

        let outcome = tokio::select! {
            outcome = tokio::time::timeout(attempt_timeout, step.handler.execute(ctx)) => outcome,
            () = cancellation.cancelled() => return cancelled_result(&clock),
        };
        let duration_ms =
            u64::try_from(attempt_start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let technical_detail = match outcome {
            Ok(StepOutcome::Success(result)) => {
                return SagaStepResult {
                    success: true,
                    is_business_failure: false,
                    is_technical_failure: false,
                    result,
                    error_message: None,
                    exception_info: None,
                    executed_at,
                    duration_ms,
                };
            }
            Ok(StepOutcome::BusinessFailure(message)) => {
                return SagaStepResult {
                    success: false,
                    is_business_failure: true,
                    is_technical_failure: false,
                    result: Value::Null,
                    error_message: Some(message),
                    exception_info: None,
                    executed_at,
                    duration_ms,
                };
            }
            Ok(StepOutcome::TechnicalFailure(message)) => message,
            Err(_) => format!("attempt timed out after {attempt_timeout:?}"),
        };

        if attempt >= step.max_attempts {
            return SagaStepResult {
                success: false,
                is_business_failure: false,
                is_technical_failure: true,
                result: Value::Null,
                error_message: Some(technical_detail),
                exception_info: Some("technical failure after retries".to_string()),
                executed_at,
                duration_ms,
            };
        }
        // Exponential backoff: retry_delay * 2^(attempt-1), capped.
        let shift = (attempt - 1).min(16);
        let delay = step.retry_delay.saturating_mul(1u32 << shift).min(MAX_RETRY_DELAY);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Builds the cancelled step result.
fn cancelled_result(clock: &Arc<dyn Clock>) -> SagaStepResult {
    SagaStepResult {
        success: false,
        is_business_failure: false,
        is_technical_failure: false,
        result: Value::Null,
        error_message: Some("run cancelled".to_string()),
        exception_info: Some("cancelled".to_string()),
        executed_at: clock.now(),
        duration_ms: 0,
    }
}
