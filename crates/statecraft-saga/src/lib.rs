// crates/statecraft-saga/src/lib.rs
// ============================================================================
// Module: Statecraft Saga
// Description: DAG workflow orchestrator with compensation.
// Purpose: Run dependency-ordered, retryable steps across many entities.
// Dependencies: statecraft-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! `statecraft-saga` orchestrates multi-entity workflows as validated
//! DAGs: dependency-ordered parallel levels, conditional steps, retry with
//! exponential backoff, and reverse-completion-order compensation on
//! failure. Cross-entity calls go through the core entity resolver; the
//! per-entity adapter serializes them, so the orchestrator never drives
//! concurrent fires into one entity.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod builder;
pub mod executor;
pub mod graph;
pub mod report;
pub mod step;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builder::DEFAULT_MAX_ATTEMPTS;
pub use builder::DEFAULT_RETRY_DELAY;
pub use builder::DEFAULT_STEP_TIMEOUT;
pub use builder::SagaBuilder;
pub use builder::StepConfig;
pub use builder::StepOptions;
pub use builder::WorkflowConfig;
pub use executor::MAX_RETRY_DELAY;
pub use executor::SagaExecutor;
pub use executor::SagaOptions;
pub use graph::ExecutionGraph;
pub use graph::GraphError;
pub use graph::GraphStats;
pub use report::COMPENSATION_RECORD_WIRE_ID;
pub use report::CompensationRecord;
pub use report::SAGA_STEP_RESULT_WIRE_ID;
pub use report::SagaReport;
pub use report::SagaStatus;
pub use report::SagaStepResult;
pub use step::CompensationContext;
pub use step::CompensationOutcome;
pub use step::ConditionContext;
pub use step::SagaData;
pub use step::StepCondition;
pub use step::StepContext;
pub use step::StepHandler;
pub use step::StepOutcome;
pub use step::condition;
pub use step::step;
pub use step::step_with_compensation;
