// crates/statecraft-core/src/core/identifiers.rs
// ============================================================================
// Module: Statecraft Identifiers
// Description: Canonical opaque identifiers for machine definitions and entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Statecraft.
//! Identifiers are opaque UTF-8 strings and serialize transparently on the
//! wire. No normalization or validation is applied by these types; definition
//! builders enforce referential integrity at build time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares an opaque string identifier with the standard surface.
macro_rules! string_identifier {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

string_identifier! {
    /// Machine type identifier naming one machine definition family.
    MachineTypeId
}

string_identifier! {
    /// Entity identifier addressing one state-machine instance.
    EntityId
}

string_identifier! {
    /// State identifier within a machine definition.
    StateId
}

string_identifier! {
    /// Trigger identifier within a machine definition.
    TriggerId
}

string_identifier! {
    /// Region identifier naming one orthogonal region of a definition.
    RegionId
}

string_identifier! {
    /// Symbolic guard name used in unmet-guard reports and serialization.
    GuardName
}

string_identifier! {
    /// Timer name keying in-memory timers and durable reminders.
    TimerName
}

string_identifier! {
    /// Correlation identifier stamped onto recorded events.
    CorrelationId
}

string_identifier! {
    /// Caller-provided deduplication key enabling at-most-once fires.
    DedupeKey
}

string_identifier! {
    /// Saga step name within one workflow configuration.
    StepName
}

string_identifier! {
    /// Stream namespace for event publication.
    StreamNamespace
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
    use super::EntityId;
    use super::StateId;
    use super::TriggerId;

    #[test]
    fn identifiers_round_trip_serde() {
        let id = EntityId::new("order-42");
        let json = serde_json::to_string(&id).expect("serialize identifier");
        assert_eq!(json, "\"order-42\"");
        let back: EntityId = serde_json::from_str(&json).expect("deserialize identifier");
        assert_eq!(back, id);
    }

    #[test]
    fn identifiers_display_and_as_str_agree() {
        let state = StateId::new("Paid");
        assert_eq!(state.to_string(), "Paid");
        assert_eq!(state.as_str(), "Paid");
    }

    #[test]
    fn identifiers_order_by_string_value() {
        let a = TriggerId::new("Deliver");
        let b = TriggerId::new("Ship");
        assert!(a < b);
    }
}
