// crates/statecraft-core/src/core/version.rs
// ============================================================================
// Module: Statecraft Definition Versions
// Description: Three-part definition version with a stable string wire form.
// Purpose: Identify machine definitions and order them for compatibility checks.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every machine definition is identified by `(machine_type, version)` where
//! the version is `major.minor.patch`. Versions order numerically by part and
//! serialize as the dotted string form. Recorded events carry the version of
//! the definition that produced them so replays and migrations can reason
//! about compatibility.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde::de;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Definition version parse errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// Input does not have exactly three dot-separated parts.
    #[error("definition version must be major.minor.patch: {0}")]
    Malformed(String),
    /// A part is not a valid unsigned integer.
    #[error("definition version part is not a number: {0}")]
    InvalidPart(String),
}

// ============================================================================
// SECTION: Definition Version
// ============================================================================

/// Three-part machine definition version.
///
/// # Invariants
/// - Orders numerically by `(major, minor, patch)`.
/// - Serializes as the dotted string form, e.g. `"1.2.3"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionVersion {
    /// Major version; bumps signal breaking definition changes.
    pub major: u32,
    /// Minor version; bumps signal additive definition changes.
    pub minor: u32,
    /// Patch version; bumps signal behavior-preserving fixes.
    pub patch: u32,
}

impl DefinitionVersion {
    /// Creates a new version from its parts.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The initial `1.0.0` version.
    pub const INITIAL: Self = Self::new(1, 0, 0);
}

impl fmt::Display for DefinitionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for DefinitionVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VersionParseError::Malformed(input.to_string()));
        };
        let parse = |part: &str| {
            part.parse::<u32>().map_err(|_| VersionParseError::InvalidPart(part.to_string()))
        };
        Ok(Self::new(parse(major)?, parse(minor)?, parse(patch)?))
    }
}

impl Serialize for DefinitionVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DefinitionVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
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
    use super::DefinitionVersion;
    use super::VersionParseError;

    #[test]
    fn versions_parse_and_display() {
        let version: DefinitionVersion = "1.2.3".parse().expect("parse version");
        assert_eq!(version, DefinitionVersion::new(1, 2, 3));
        assert_eq!(version.to_string(), "1.2.3");
    }

    #[test]
    fn versions_order_numerically() {
        let a = DefinitionVersion::new(1, 9, 0);
        let b = DefinitionVersion::new(1, 10, 0);
        let c = DefinitionVersion::new(2, 0, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        assert!(matches!(
            "1.2".parse::<DefinitionVersion>(),
            Err(VersionParseError::Malformed(_))
        ));
        assert!(matches!(
            "1.2.x".parse::<DefinitionVersion>(),
            Err(VersionParseError::InvalidPart(_))
        ));
    }

    #[test]
    fn versions_serialize_as_dotted_strings() {
        let version = DefinitionVersion::new(2, 0, 1);
        let json = serde_json::to_string(&version).expect("serialize version");
        assert_eq!(json, "\"2.0.1\"");
        let back: DefinitionVersion = serde_json::from_str(&json).expect("deserialize version");
        assert_eq!(back, version);
    }
}
