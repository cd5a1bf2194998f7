// crates/statecraft-saga/src/report.rs
// ============================================================================
// Module: Saga Reports
// Description: Run status, step results, and compensation records.
// Purpose: Provide stable, serializable run outcomes with wire identity.
// Dependencies: statecraft-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A run produces one [`SagaReport`]: the final status, ordered completed
//! and failed step sets, per-step results, and the compensation records
//! collected on rollback. Step results and compensation records carry
//! stable wire ids with field-numbered schemas; field numbers are part of
//! the contract.
//!
//! Both `Started` and `Running` exist as statuses; `Running` is the
//! canonical in-flight state, `Started` only covers the window before the
//! first level is scheduled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use statecraft_core::CorrelationId;
use statecraft_core::StepName;
use statecraft_core::Timestamp;

// ============================================================================
// SECTION: Wire Identity
// ============================================================================

/// Stable wire id for [`SagaStepResult`].
pub const SAGA_STEP_RESULT_WIRE_ID: &str = "statecraft.saga.step_result.v1";

/// Stable wire id for [`CompensationRecord`].
pub const COMPENSATION_RECORD_WIRE_ID: &str = "statecraft.saga.compensation.v1";

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of one saga run.
///
/// # Invariants
/// - Variants are stable for serialization and programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Run accepted, first level not yet scheduled.
    Started,
    /// Levels executing; the canonical in-flight state.
    Running,
    /// Every step completed or was skipped by its condition.
    Completed,
    /// A non-continuable step failed; completed steps were compensated.
    Failed,
    /// Continuable steps failed; completed steps were compensated at the
    /// end of the run.
    Compensated,
    /// The run was cancelled; completed steps were compensated.
    Cancelled,
}

// ============================================================================
// SECTION: Step Results
// ============================================================================

/// Outcome of one step, in its stable wire form.
///
/// Wire id `statecraft.saga.step_result.v1`; field numbers are part of the
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStepResult {
    /// Field 0: whether the step succeeded.
    pub success: bool,
    /// Field 1: deterministic business refusal.
    pub is_business_failure: bool,
    /// Field 2: transient technical failure (after retries).
    pub is_technical_failure: bool,
    /// Field 3: result value produced on success.
    pub result: Value,
    /// Field 4: failure message when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Field 5: failure classification detail (timeout, cancelled, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_info: Option<String>,
    /// Field 6: when the last attempt started.
    pub executed_at: Timestamp,
    /// Field 7: duration of the last attempt in milliseconds.
    pub duration_ms: u64,
}

impl SagaStepResult {
    /// Returns `true` when the step neither succeeded nor failed for
    /// business reasons, i.e. retrying the run could help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.is_technical_failure
    }
}

// ============================================================================
// SECTION: Compensation Records
// ============================================================================

/// Outcome of one compensation invocation, in its stable wire form.
///
/// Wire id `statecraft.saga.compensation.v1`; field numbers are part of
/// the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    /// Field 0: whether the compensation succeeded.
    pub success: bool,
    /// Field 1: failure message when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Field 2: failure classification detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Field 3: when the compensation ran.
    pub compensated_at: Timestamp,
    /// Field 4: compensation duration in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// SECTION: Saga Report
// ============================================================================

/// Full outcome of one saga run.
///
/// # Invariants
/// - `completed` preserves completion order; compensations run in its
///   reverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaReport {
    /// Workflow name.
    pub workflow: String,
    /// Correlation id of the run.
    pub correlation_id: CorrelationId,
    /// Final status.
    pub status: SagaStatus,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub completed_at: Timestamp,
    /// Successful steps in completion order.
    pub completed: Vec<StepName>,
    /// Failed steps in failure order.
    pub failed: Vec<StepName>,
    /// Steps skipped by their conditions.
    pub skipped: Vec<StepName>,
    /// Per-step results keyed by step name.
    pub step_results: Vec<(StepName, SagaStepResult)>,
    /// Compensation records in invocation order (reverse completion).
    pub compensations: Vec<(StepName, CompensationRecord)>,
    /// Whether every invoked compensation succeeded (`None` when none
    /// ran).
    pub compensation_succeeded: Option<bool>,
    /// Graph warnings surfaced at build time.
    pub warnings: Vec<String>,
}

impl SagaReport {
    /// Returns the result recorded for `step`, when present.
    #[must_use]
    pub fn step_result(&self, step: &StepName) -> Option<&SagaStepResult> {
        self.step_results
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, result)| result)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use serde_json::json;
    use statecraft_core::Timestamp;

    use super::SagaStepResult;

    #[test]
    fn step_results_round_trip() {
        let result = SagaStepResult {
            success: true,
            is_business_failure: false,
            is_technical_failure: false,
            result: json!({"reserved": 3}),
            error_message: None,
            exception_info: None,
            executed_at: Timestamp::from_unix_millis(10),
            duration_ms: 12,
        };
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(!json.contains("error_message"));
        let back: SagaStepResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, result);
    }
}
