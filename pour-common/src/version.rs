// pour-common/src/version.rs
//! Lenient version parsing and minimum-version constraints.
//!
//! Upstream tools rarely publish strict semver (`1.8`, `1.8.0_292`, `17`), so
//! versions are normalized into [`semver::Version`] by taking up to three
//! leading numeric components and padding the rest with zero.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PourError, Result};

/// Parses a loosely formatted version string such as `1.8`, `1.8.0_292`,
/// `11.0.2+9` or `v3.2.7`.
pub fn parse_lenient(raw: &str) -> Result<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let mut parts = [0u64; 3];
    let mut seen = 0;

    for component in trimmed.split(['.', '_', '-', '+']) {
        if seen == parts.len() {
            break;
        }
        let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        parts[seen] = digits
            .parse()
            .map_err(|e| PourError::Parse("version", format!("'{raw}': {e}")))?;
        seen += 1;
        // Stop at components like "0rc1"; the numeric prefix is all we keep.
        if digits.len() != component.len() {
            break;
        }
    }

    if seen == 0 {
        return Err(PourError::Parse(
            "version",
            format!("'{raw}' does not start with a number"),
        ));
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// A lower bound on an installed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    minimum: Version,
}

impl VersionConstraint {
    pub fn at_least(minimum: Version) -> Self {
        Self { minimum }
    }

    /// Accepts `1.8+`, `>= 1.8`, `>=1.8` and a bare `1.8`.
    pub fn parse(raw: &str) -> Result<Self> {
        let bound = raw.trim();
        let bound = bound
            .strip_prefix(">=")
            .or_else(|| bound.strip_suffix('+'))
            .unwrap_or(bound)
            .trim();
        if bound.is_empty() {
            return Err(PourError::Parse(
                "version constraint",
                format!("'{raw}' is empty"),
            ));
        }
        Ok(Self::at_least(parse_lenient(bound)?))
    }

    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    pub fn is_satisfied_by(&self, installed: &Version) -> bool {
        installed >= &self.minimum
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">= {}", self.minimum)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!(">={}", self.minimum))
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_java_style_versions() {
        assert_eq!(parse_lenient("1.8.0_292").unwrap(), Version::new(1, 8, 0));
        assert_eq!(parse_lenient("11.0.2").unwrap(), Version::new(11, 0, 2));
        assert_eq!(parse_lenient("17").unwrap(), Version::new(17, 0, 0));
        assert_eq!(parse_lenient("21.0.1+12").unwrap(), Version::new(21, 0, 1));
    }

    #[test]
    fn parses_prefixed_and_suffixed_versions() {
        assert_eq!(parse_lenient("v3.2.7").unwrap(), Version::new(3, 2, 7));
        assert_eq!(parse_lenient("2.0rc1").unwrap(), Version::new(2, 0, 0));
        assert!(parse_lenient("latest").is_err());
        assert!(parse_lenient("").is_err());
    }

    #[test]
    fn constraint_forms_are_equivalent() {
        let expected = VersionConstraint::at_least(Version::new(1, 8, 0));
        assert_eq!(VersionConstraint::parse("1.8+").unwrap(), expected);
        assert_eq!(VersionConstraint::parse(">= 1.8").unwrap(), expected);
        assert_eq!(VersionConstraint::parse(">=1.8").unwrap(), expected);
        assert_eq!(VersionConstraint::parse("1.8").unwrap(), expected);
        assert!(VersionConstraint::parse("+").is_err());
    }

    #[test]
    fn newer_major_satisfies_old_java_minimum() {
        let constraint = VersionConstraint::parse("1.8+").unwrap();
        assert!(constraint.is_satisfied_by(&Version::new(11, 0, 2)));
        assert!(constraint.is_satisfied_by(&Version::new(1, 8, 0)));
        assert!(!constraint.is_satisfied_by(&Version::new(1, 7, 0)));
        assert_eq!(constraint.to_string(), ">= 1.8.0");
    }
}
