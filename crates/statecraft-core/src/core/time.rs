// crates/statecraft-core/src/core/time.rs
// ============================================================================
// Module: Statecraft Time Model
// Description: Canonical timestamp representation for events and snapshots.
// Purpose: Provide deterministic, replayable time values across Statecraft records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Statecraft embeds explicit time values in every recorded event to keep
//! replay deterministic. The core engine never reads wall-clock time
//! directly; hosts supply timestamps through the
//! [`Clock`](crate::interfaces::Clock) interface or explicit parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Statecraft events and snapshots.
///
/// # Invariants
/// - Unix epoch milliseconds, UTC.
/// - Values are explicitly provided by callers; the core never reads
///   wall-clock time.
/// - Monotonicity within one entity log is an adapter responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by `duration`, saturating on overflow.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp moved back by `duration`, saturating on overflow.
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Returns the elapsed duration since `earlier`, or zero when `earlier`
    /// is not in the past.
    #[must_use]
    pub fn duration_since(self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).map_or(Duration::ZERO, Duration::from_millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
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

    use super::Timestamp;

    #[test]
    fn saturating_add_advances_by_millis() {
        let t = Timestamp::from_unix_millis(1_000);
        assert_eq!(t.saturating_add(Duration::from_secs(2)).as_unix_millis(), 3_000);
    }

    #[test]
    fn duration_since_is_zero_for_future_reference() {
        let early = Timestamp::from_unix_millis(5_000);
        let late = Timestamp::from_unix_millis(9_000);
        assert_eq!(late.duration_since(early), Duration::from_secs(4));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn timestamps_serialize_transparently() {
        let t = Timestamp::from_unix_millis(42);
        let json = serde_json::to_string(&t).expect("serialize timestamp");
        assert_eq!(json, "42");
    }
}
