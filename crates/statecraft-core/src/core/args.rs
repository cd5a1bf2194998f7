// crates/statecraft-core/src/core/args.rs
// ============================================================================
// Module: Statecraft Trigger Arguments
// Description: Positional trigger payload values and declared arities.
// Purpose: Carry 0-3 typed arguments into guards and hooks with arity checks.
// Dependencies: serde, serde_json, smallvec, thiserror
// ============================================================================

//! ## Overview
//! Parameterized triggers carry up to three positional arguments into guard
//! predicates and entry hooks. Arguments are JSON values with typed access;
//! the declared arity of a trigger is validated on every fire before any
//! guard runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of positional trigger arguments.
pub const MAX_TRIGGER_ARITY: usize = 3;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trigger argument access errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    /// Requested argument index is not present.
    #[error("trigger argument {index} is missing (arity {arity})")]
    Missing {
        /// Requested argument index.
        index: usize,
        /// Number of arguments actually supplied.
        arity: usize,
    },
    /// Argument could not be deserialized into the requested type.
    #[error("trigger argument {index} has an unexpected type: {detail}")]
    Type {
        /// Requested argument index.
        index: usize,
        /// Deserialization failure detail.
        detail: String,
    },
    /// More than [`MAX_TRIGGER_ARITY`] arguments were supplied.
    #[error("trigger argument count {0} exceeds the maximum of 3")]
    TooMany(usize),
}

// ============================================================================
// SECTION: Trigger Arity
// ============================================================================

/// Declared argument count for a trigger.
///
/// # Invariants
/// - Values range 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerArity(u8);

impl TriggerArity {
    /// A trigger carrying no arguments.
    pub const NONE: Self = Self(0);

    /// Creates an arity, rejecting counts above [`MAX_TRIGGER_ARITY`].
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::TooMany`] when `count` exceeds the maximum.
    pub fn new(count: usize) -> Result<Self, ArgsError> {
        let bounded = u8::try_from(count)
            .ok()
            .filter(|&value| usize::from(value) <= MAX_TRIGGER_ARITY)
            .ok_or(ArgsError::TooMany(count))?;
        Ok(Self(bounded))
    }

    /// Returns the declared argument count.
    #[must_use]
    pub const fn count(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// SECTION: Trigger Arguments
// ============================================================================

/// Positional trigger arguments supplied to a fire.
///
/// # Invariants
/// - Holds at most [`MAX_TRIGGER_ARITY`] values.
/// - Values are immutable snapshots; guards must not rely on interior
///   mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerArgs {
    /// Positional argument values.
    values: SmallVec<[Value; MAX_TRIGGER_ARITY]>,
}

impl TriggerArgs {
    /// Creates an empty argument list.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates an argument list from serializable values.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::TooMany`] when more than three values are given,
    /// or [`ArgsError::Type`] when a value fails to serialize.
    pub fn from_values<T: Serialize>(values: &[T]) -> Result<Self, ArgsError> {
        if values.len() > MAX_TRIGGER_ARITY {
            return Err(ArgsError::TooMany(values.len()));
        }
        let mut list = SmallVec::new();
        for (index, value) in values.iter().enumerate() {
            let json = serde_json::to_value(value).map_err(|err| ArgsError::Type {
                index,
                detail: err.to_string(),
            })?;
            list.push(json);
        }
        Ok(Self {
            values: list,
        })
    }

    /// Creates a single-argument list.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Type`] when the value fails to serialize.
    pub fn one<T: Serialize>(value: T) -> Result<Self, ArgsError> {
        Self::from_values(&[value])
    }

    /// Returns the number of supplied arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw JSON value at `index` when present.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Deserializes the argument at `index` into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Missing`] when `index` is out of range and
    /// [`ArgsError::Type`] when the value does not deserialize into `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgsError> {
        let value = self.values.get(index).ok_or(ArgsError::Missing {
            index,
            arity: self.values.len(),
        })?;
        serde_json::from_value(value.clone()).map_err(|err| ArgsError::Type {
            index,
            detail: err.to_string(),
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
    use serde_json::json;

    use super::ArgsError;
    use super::TriggerArgs;
    use super::TriggerArity;

    #[test]
    fn typed_access_deserializes_values() {
        let args = TriggerArgs::from_values(&[json!(7), json!("receipt")]).expect("build args");
        assert_eq!(args.arg::<i64>(0).expect("first arg"), 7);
        assert_eq!(args.arg::<String>(1).expect("second arg"), "receipt");
    }

    #[test]
    fn missing_and_mistyped_arguments_are_reported() {
        let args = TriggerArgs::one(true).expect("build args");
        assert!(matches!(args.arg::<bool>(1), Err(ArgsError::Missing { index: 1, arity: 1 })));
        assert!(matches!(args.arg::<i64>(0), Err(ArgsError::Type { index: 0, .. })));
    }

    #[test]
    fn arity_caps_at_three() {
        assert!(TriggerArity::new(3).is_ok());
        assert!(matches!(TriggerArity::new(4), Err(ArgsError::TooMany(4))));
        let overflow = TriggerArgs::from_values(&[json!(1), json!(2), json!(3), json!(4)]);
        assert!(matches!(overflow, Err(ArgsError::TooMany(4))));
    }
}
