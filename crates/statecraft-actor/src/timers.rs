// crates/statecraft-actor/src/timers.rs
// ============================================================================
// Module: State Timeout Configuration
// Description: Timer and reminder configurations bound to machine states.
// Purpose: Describe time-driven transitions declaratively per state.
// Dependencies: statecraft-core, thiserror
// ============================================================================

//! ## Overview
//! A state timeout binds a trigger to a state with a delay: entering the
//! state arms the timer, leaving it cancels the timer, and firing drives a
//! regular `fire` through the per-entity mutex. Short timeouts run on
//! in-process timers; long ones default to durable cluster reminders that
//! survive deactivation. The fluent builder mirrors how hosts declare
//! timeouts next to their machine definitions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

use statecraft_core::PersistedReminder;
use statecraft_core::StateId;
use statecraft_core::TimerName;
use statecraft_core::TriggerId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timeouts above this threshold default to durable reminders.
pub const DURABLE_TIMEOUT_THRESHOLD: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timeout configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutConfigError {
    /// No delay was configured.
    #[error("state timeout for {0} declares no delay")]
    MissingDelay(StateId),
    /// No trigger was configured.
    #[error("state timeout for {0} declares no trigger")]
    MissingTrigger(StateId),
}

// ============================================================================
// SECTION: Durability
// ============================================================================

/// Where a state timeout lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerDurability {
    /// Pick automatically: durable above
    /// [`DURABLE_TIMEOUT_THRESHOLD`], in-memory below.
    #[default]
    Auto,
    /// Always an in-process timer; dies with the activation.
    InMemory,
    /// Always a durable reminder; survives deactivation.
    Durable,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// One state timeout: fire `trigger` after `timeout` inside `state`.
///
/// # Invariants
/// - `name` is unique within one entity's registered timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTimeoutConfig {
    /// Timer name keying registration and cancellation.
    pub name: TimerName,
    /// State the timeout is bound to.
    pub state: StateId,
    /// Delay from state entry to firing.
    pub timeout: Duration,
    /// Re-arm after each firing while the state is still active.
    pub repeating: bool,
    /// Timer placement policy.
    pub durability: TimerDurability,
    /// Trigger fired on timeout.
    pub trigger: TriggerId,
}

impl StateTimeoutConfig {
    /// Returns `true` when this timeout runs as a durable reminder.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        match self.durability {
            TimerDurability::Durable => true,
            TimerDurability::InMemory => false,
            TimerDurability::Auto => self.timeout > DURABLE_TIMEOUT_THRESHOLD,
        }
    }

    /// Converts the configuration into its persisted reminder form.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedReminder {
        PersistedReminder {
            timer_name: self.name.as_str().to_string(),
            state: self.state.clone(),
            trigger: self.trigger.clone(),
            due_millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            repeating: self.repeating,
        }
    }

    /// Rebuilds a durable configuration from its persisted form.
    #[must_use]
    pub fn from_persisted(persisted: &PersistedReminder) -> Self {
        Self {
            name: TimerName::new(persisted.timer_name.clone()),
            state: persisted.state.clone(),
            timeout: Duration::from_millis(persisted.due_millis),
            repeating: persisted.repeating,
            durability: TimerDurability::Durable,
            trigger: persisted.trigger.clone(),
        }
    }
}

// ============================================================================
// SECTION: Fluent Builder
// ============================================================================

/// Starts a timeout declaration for `state`.
#[must_use]
pub fn configure_timeout(state: impl Into<StateId>) -> TimeoutBuilder {
    TimeoutBuilder {
        state: state.into(),
        delay: None,
        trigger: None,
        repeating: false,
        durability: TimerDurability::Auto,
        name: None,
    }
}

/// Fluent builder for [`StateTimeoutConfig`].
#[derive(Debug)]
pub struct TimeoutBuilder {
    /// State the timeout binds to.
    state: StateId,
    /// Configured delay.
    delay: Option<Duration>,
    /// Configured trigger.
    trigger: Option<TriggerId>,
    /// Repeat flag.
    repeating: bool,
    /// Placement policy.
    durability: TimerDurability,
    /// Optional explicit timer name.
    name: Option<TimerName>,
}

impl TimeoutBuilder {
    /// Sets the delay from state entry to firing.
    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the trigger fired on timeout.
    #[must_use]
    pub fn transition_to(mut self, trigger: impl Into<TriggerId>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Forces an in-process timer.
    #[must_use]
    pub const fn use_timer(mut self) -> Self {
        self.durability = TimerDurability::InMemory;
        self
    }

    /// Forces a durable reminder.
    #[must_use]
    pub const fn use_durable_reminder(mut self) -> Self {
        self.durability = TimerDurability::Durable;
        self
    }

    /// Re-arms the timeout after each firing.
    #[must_use]
    pub const fn repeat(mut self) -> Self {
        self.repeating = true;
        self
    }

    /// Names the timer explicitly. Defaults to `timeout-<state>`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<TimerName>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutConfigError`] when the delay or trigger is missing.
    pub fn build(self) -> Result<StateTimeoutConfig, TimeoutConfigError> {
        let timeout = self.delay.ok_or_else(|| TimeoutConfigError::MissingDelay(self.state.clone()))?;
        let trigger =
            self.trigger.ok_or_else(|| TimeoutConfigError::MissingTrigger(self.state.clone()))?;
        let name = self
            .name
            .unwrap_or_else(|| TimerName::new(format!("timeout-{}", self.state.as_str())));
        Ok(StateTimeoutConfig {
            name,
            state: self.state,
            timeout,
            repeating: self.repeating,
            durability: self.durability,
            trigger,
        })
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
    use std::time::Duration;

    use super::TimeoutConfigError;
    use super::TimerDurability;
    use super::configure_timeout;

    #[test]
    fn builder_assembles_a_complete_config() {
        let config = configure_timeout("Processing")
            .after(Duration::from_secs(2))
            .transition_to("Timeout")
            .use_timer()
            .with_name("processing-watchdog")
            .build()
            .expect("build timeout");
        assert_eq!(config.state.as_str(), "Processing");
        assert_eq!(config.trigger.as_str(), "Timeout");
        assert_eq!(config.name.as_str(), "processing-watchdog");
        assert!(!config.is_durable());
    }

    #[test]
    fn missing_pieces_are_rejected() {
        let no_delay = configure_timeout("Processing").transition_to("Timeout").build();
        assert!(matches!(no_delay, Err(TimeoutConfigError::MissingDelay(_))));
        let no_trigger = configure_timeout("Processing").after(Duration::from_secs(1)).build();
        assert!(matches!(no_trigger, Err(TimeoutConfigError::MissingTrigger(_))));
    }

    #[test]
    fn auto_durability_follows_the_five_minute_rule() {
        let short = configure_timeout("Processing")
            .after(Duration::from_secs(30))
            .transition_to("Timeout")
            .build()
            .expect("build short");
        let long = configure_timeout("Dormant")
            .after(Duration::from_secs(3_600))
            .transition_to("Expire")
            .build()
            .expect("build long");
        assert!(!short.is_durable());
        assert!(long.is_durable());
        assert_eq!(short.durability, TimerDurability::Auto);
    }

    #[test]
    fn default_names_derive_from_the_state() {
        let config = configure_timeout("Paid")
            .after(Duration::from_secs(1))
            .transition_to("Expire")
            .build()
            .expect("build");
        assert_eq!(config.name.as_str(), "timeout-Paid");
    }

    #[test]
    fn persisted_round_trip_preserves_the_config() {
        let config = configure_timeout("Dormant")
            .after(Duration::from_secs(86_400))
            .transition_to("Expire")
            .repeat()
            .use_durable_reminder()
            .build()
            .expect("build");
        let persisted = config.to_persisted();
        let back = super::StateTimeoutConfig::from_persisted(&persisted);
        assert_eq!(back.state, config.state);
        assert_eq!(back.trigger, config.trigger);
        assert_eq!(back.timeout, config.timeout);
        assert_eq!(back.repeating, config.repeating);
        assert!(back.is_durable());
    }
}
