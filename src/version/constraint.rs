//! Version constraint parsing and matching
//!
//! Supported forms, combinable with commas (all must hold):
//! - exact: `2.7.1`
//! - trailing wildcards: `1.X.X`, `2.x`, `x`, `*`
//! - comparisons: `= != > >= < <=`
//! - pessimistic: `~> 2.7` (at least 2.7, below 3)

use super::gem_version::GemVersion;
use super::VersionError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

impl Op {
    /// Longest prefixes first so `>=` is not read as `>`
    const PREFIXES: [(&'static str, Op); 7] = [
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("!=", Op::Ne),
        ("~>", Op::Pessimistic),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("=", Op::Eq),
    ];
}

#[derive(Debug, Clone)]
enum Requirement {
    /// Leading numeric components that must match exactly; the rest is free
    Wildcard(Vec<u64>),
    Compare(Op, GemVersion),
}

impl Requirement {
    fn matches(&self, version: &GemVersion) -> bool {
        match self {
            Self::Wildcard(prefix) => {
                !version.is_prerelease()
                    && prefix
                        .iter()
                        .enumerate()
                        .all(|(i, want)| version.number_at(i) == Some(*want))
            }
            Self::Compare(op, bound) => match op {
                Op::Eq => version == bound,
                Op::Ne => version != bound,
                Op::Gt => version > bound,
                Op::Ge => version >= bound,
                Op::Lt => version < bound,
                Op::Le => version <= bound,
                Op::Pessimistic => version >= bound && *version < bound.bump(),
            },
        }
    }
}

/// A parsed version constraint
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    requirements: Vec<Requirement>,
}

impl Constraint {
    /// Parse a constraint string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = |reason: &str| VersionError::InvalidConstraint {
            constraint: input.to_string(),
            reason: reason.to_string(),
        };

        let mut requirements = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty requirement"));
            }
            requirements.push(parse_requirement(part).map_err(|reason| invalid(&reason))?);
        }

        Ok(Self {
            raw: input.trim().to_string(),
            requirements,
        })
    }

    /// Whether `version` satisfies every requirement
    pub fn matches(&self, version: &GemVersion) -> bool {
        self.requirements.iter().all(|r| r.matches(version))
    }

    /// The constraint as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn is_wildcard(segment: &str) -> bool {
    matches!(segment, "x" | "X" | "*")
}

fn parse_requirement(part: &str) -> Result<Requirement, String> {
    for (prefix, op) in Op::PREFIXES {
        if let Some(rest) = part.strip_prefix(prefix) {
            let rest = rest.trim();
            if rest.split('.').any(is_wildcard) {
                return Err(format!("wildcards cannot follow the {} operator", prefix));
            }
            let version = GemVersion::parse(rest).map_err(|e| e.to_string())?;
            return Ok(Requirement::Compare(op, version));
        }
    }

    let segments: Vec<&str> = part.split('.').collect();
    let Some(first_wild) = segments.iter().position(|s| is_wildcard(s)) else {
        let version = GemVersion::parse(part).map_err(|e| e.to_string())?;
        return Ok(Requirement::Compare(Op::Eq, version));
    };

    if !segments[first_wild..].iter().all(|s| is_wildcard(s)) {
        return Err("wildcards are only allowed in trailing positions".to_string());
    }

    let prefix = segments[..first_wild]
        .iter()
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| format!("'{}' is not a numeric version component", s))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Requirement::Wildcard(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(constraint: &str, version: &str) -> bool {
        Constraint::parse(constraint)
            .unwrap()
            .matches(&GemVersion::parse(version).unwrap())
    }

    #[test]
    fn exact_match() {
        assert!(matches("2.7.1", "2.7.1"));
        assert!(matches("2.7", "2.7.0"));
        assert!(!matches("2.7.1", "2.7.2"));
    }

    #[test]
    fn trailing_wildcards() {
        assert!(matches("1.X.X", "1.17.3"));
        assert!(!matches("1.X.X", "2.1.4"));
        assert!(matches("2.x", "2.1.4"));
        assert!(matches("x", "12.18.3"));
        assert!(matches("*", "0.1"));
        assert!(!matches("2.X.X", "2.0.0.pre.3"));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(">=4.1.0.beta1", "4.1.0"));
        assert!(matches(">= 4.1.0.beta1", "4.1.0.beta1"));
        assert!(!matches(">=4.1.0.beta1", "4.0.13"));
        assert!(matches("> 1.0", "1.0.1"));
        assert!(matches("< 3", "2.99"));
        assert!(matches("<= 2.7", "2.7.0"));
        assert!(matches("!= 2.7.0", "2.7.1"));
        assert!(matches("= 2.7.0", "2.7"));
    }

    #[test]
    fn pessimistic_operator() {
        assert!(matches("~> 2.7", "2.9.1"));
        assert!(!matches("~> 2.7", "3.0.0"));
        assert!(matches("~> 2.7.1", "2.7.8"));
        assert!(!matches("~> 2.7.1", "2.8.0"));
    }

    #[test]
    fn conjunctions() {
        assert!(matches(">= 1.0, < 2", "1.17.3"));
        assert!(!matches(">= 1.0, < 2", "2.1.4"));
    }

    #[test]
    fn invalid_syntax() {
        assert!(Constraint::parse("").is_err());
        assert!(Constraint::parse("1.X.3").is_err());
        assert!(Constraint::parse(">= 1.x").is_err());
        assert!(Constraint::parse("a.X").is_err());
        assert!(Constraint::parse("1.0,").is_err());
        assert!(Constraint::parse("latest").is_err());
    }
}
