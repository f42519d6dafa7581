//! Version resolution against the buildpack catalog
//!
//! Matches a constraint string against the flat list of versions the
//! catalog offers for one dependency and picks the single highest match.

mod constraint;
mod gem_version;

pub use constraint::Constraint;
pub use gem_version::{GemVersion, Segment};

use thiserror::Error;

/// Errors from parsing versions or resolving constraints
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("no match found for {constraint} in {candidates:?}")]
    NoMatchingVersion {
        constraint: String,
        candidates: Vec<String>,
    },

    #[error("invalid version constraint '{constraint}': {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),
}

/// Pick the highest candidate satisfying `constraint`.
///
/// Candidates that do not parse as versions are ignored. Equal versions
/// written differently (`1.0` and `1.0.0`) are broken by string order so the
/// result never depends on candidate order.
///
/// Fails with [`VersionError::NoMatchingVersion`] when nothing matches and
/// with [`VersionError::InvalidConstraint`] when the constraint does not
/// parse. Callers treat both as a failure to resolve the dependency; the
/// supply pipeline wraps either one in `SupplyError::Resolution`.
pub fn find_matching_version<S: AsRef<str>>(
    constraint: &str,
    candidates: &[S],
) -> Result<String, VersionError> {
    let parsed = Constraint::parse(constraint)?;

    candidates
        .iter()
        .filter_map(|c| GemVersion::parse(c.as_ref()).ok())
        .filter(|v| parsed.matches(v))
        .max_by(|a, b| a.cmp(b).then_with(|| a.as_str().cmp(b.as_str())))
        .map(|v| v.as_str().to_string())
        .ok_or_else(|| VersionError::NoMatchingVersion {
            constraint: constraint.to_string(),
            candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
}

/// Check whether a single version satisfies a constraint
pub fn satisfies(version: &str, constraint: &str) -> Result<bool, VersionError> {
    let version = GemVersion::parse(version)?;
    Ok(Constraint::parse(constraint)?.matches(&version))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLER: &[&str] = &["1.17.2", "1.17.3", "2.1.4", "2.0.2", "1.9.0"];

    #[test]
    fn picks_highest_wildcard_match() {
        assert_eq!(find_matching_version("1.X.X", BUNDLER).unwrap(), "1.17.3");
        assert_eq!(find_matching_version("2.X.X", BUNDLER).unwrap(), "2.1.4");
        assert_eq!(find_matching_version("x", BUNDLER).unwrap(), "2.1.4");
    }

    #[test]
    fn result_is_a_maximal_member() {
        for constraint in ["1.X.X", ">= 1.9", "~> 1.17", "< 2", "x"] {
            let picked = find_matching_version(constraint, BUNDLER).unwrap();
            assert!(BUNDLER.contains(&picked.as_str()));
            let picked = GemVersion::parse(&picked).unwrap();
            let c = Constraint::parse(constraint).unwrap();
            for other in BUNDLER {
                let other = GemVersion::parse(other).unwrap();
                if c.matches(&other) {
                    assert!(other <= picked, "{} beats {} for {}", other, picked, constraint);
                }
            }
        }
    }

    #[test]
    fn no_match_fails() {
        let err = find_matching_version("3.X.X", BUNDLER).unwrap_err();
        assert!(matches!(err, VersionError::NoMatchingVersion { .. }));
        assert!(find_matching_version("x", &[] as &[&str]).is_err());
    }

    #[test]
    fn invalid_constraint_fails() {
        let err = find_matching_version("1.X.3", BUNDLER).unwrap_err();
        assert!(matches!(err, VersionError::InvalidConstraint { .. }));
    }

    #[test]
    fn deterministic_regardless_of_order() {
        let forward = ["1.0", "1.0.0", "0.9"];
        let backward = ["0.9", "1.0.0", "1.0"];
        assert_eq!(
            find_matching_version("x", &forward).unwrap(),
            find_matching_version("x", &backward).unwrap()
        );
    }

    #[test]
    fn unparseable_candidates_are_skipped() {
        let candidates = ["nightly", "2.6.6", "2.7.1"];
        assert_eq!(find_matching_version("2.X.X", &candidates).unwrap(), "2.7.1");
    }

    #[test]
    fn satisfies_single_version() {
        assert!(satisfies("3.1.4", ">= 3.0.8").unwrap());
        assert!(!satisfies("2.7.6", ">= 3.0.8").unwrap());
        assert!(satisfies("bogus", ">= 1").is_err());
    }
}
