// crates/statecraft-saga/src/builder.rs
// ============================================================================
// Module: Saga Builder
// Description: Fluent construction of workflow configurations.
// Purpose: Declare steps, dependencies, conditions, and retry policies.
// Dependencies: statecraft-core, crate::step
// ============================================================================

//! ## Overview
//! The builder assembles a [`WorkflowConfig`]: named steps with handlers,
//! dependency edges, optional conditions, per-step retry policies, and
//! continue-on-failure flags. Structural validation (missing dependencies,
//! cycles) happens when the execution graph is built, before anything
//! runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use statecraft_core::StepName;

use crate::step::StepCondition;
use crate::step::StepHandler;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bound on one step execution attempt.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Default maximum execution attempts per step.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

// ============================================================================
// SECTION: Step Configuration
// ============================================================================

/// One configured workflow step.
#[derive(Clone)]
pub struct StepConfig {
    /// Step name, unique within the workflow.
    pub name: StepName,
    /// Execute/compensate handler.
    pub handler: Arc<dyn StepHandler>,
    /// Steps that must complete before this one starts.
    pub depends_on: Vec<StepName>,
    /// Optional gate evaluated against the run context.
    pub condition: Option<Arc<dyn StepCondition>>,
    /// Continue the run when this step fails.
    pub continue_on_failure: bool,
    /// Maximum execution attempts (at least 1).
    pub max_attempts: u32,
    /// Base delay between attempts; doubles per attempt, capped by the
    /// executor.
    pub retry_delay: Duration,
}

impl fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepConfig")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("has_condition", &self.condition.is_some())
            .field("continue_on_failure", &self.continue_on_failure)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

// ============================================================================
// SECTION: Workflow Configuration
// ============================================================================

/// One saga workflow: named steps with dependency edges and timeouts.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Workflow name for reporting.
    pub name: String,
    /// Configured steps in declaration order.
    pub steps: Vec<StepConfig>,
    /// Bound on one step execution attempt.
    pub step_timeout: Duration,
    /// Bound on the whole run.
    pub overall_timeout: Option<Duration>,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Per-step configurator used inside [`SagaBuilder::step_with`].
#[derive(Default)]
pub struct StepOptions {
    /// Declared dependencies.
    depends_on: Vec<StepName>,
    /// Optional gate.
    condition: Option<Arc<dyn StepCondition>>,
    /// Continue-on-failure flag.
    continue_on_failure: bool,
    /// Maximum attempts.
    max_attempts: Option<u32>,
    /// Base retry delay.
    retry_delay: Option<Duration>,
}

impl StepOptions {
    /// Requires `step` to complete before this one starts.
    #[must_use]
    pub fn depends_on(mut self, step: impl Into<StepName>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    /// Requires every step of `steps` to complete first.
    #[must_use]
    pub fn depends_on_all(mut self, steps: impl IntoIterator<Item = StepName>) -> Self {
        self.depends_on.extend(steps);
        self
    }

    /// Gates the step behind `condition`.
    #[must_use]
    pub fn condition(mut self, condition: Arc<dyn StepCondition>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Keeps the run going when this step fails.
    #[must_use]
    pub const fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    /// Allows up to `attempts` executions (technical failures only).
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the base delay between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }
}

/// Fluent builder for [`WorkflowConfig`].
pub struct SagaBuilder {
    /// Workflow name.
    name: String,
    /// Steps declared so far.
    steps: Vec<StepConfig>,
    /// Step attempt bound.
    step_timeout: Duration,
    /// Whole-run bound.
    overall_timeout: Option<Duration>,
}

impl SagaBuilder {
    /// Starts a builder for a named workflow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            overall_timeout: None,
        }
    }

    /// Declares a step with default options.
    #[must_use]
    pub fn step(self, name: impl Into<StepName>, handler: Arc<dyn StepHandler>) -> Self {
        self.step_with(name, handler, |options| options)
    }

    /// Declares a step with configured options.
    #[must_use]
    pub fn step_with(
        mut self,
        name: impl Into<StepName>,
        handler: Arc<dyn StepHandler>,
        configure: impl FnOnce(StepOptions) -> StepOptions,
    ) -> Self {
        let options = configure(StepOptions::default());
        self.steps.push(StepConfig {
            name: name.into(),
            handler,
            depends_on: options.depends_on,
            condition: options.condition,
            continue_on_failure: options.continue_on_failure,
            max_attempts: options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            retry_delay: options.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        });
        self
    }

    /// Bounds one step execution attempt.
    #[must_use]
    pub const fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Bounds the whole run.
    #[must_use]
    pub const fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> WorkflowConfig {
        WorkflowConfig {
            name: self.name,
            steps: self.steps,
            step_timeout: self.step_timeout,
            overall_timeout: self.overall_timeout,
        }
    }
}
