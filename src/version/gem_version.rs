//! Rubygems-style version values
//!
//! Versions are split into numeric and alphabetic segments (`4.1.0.beta1`
//! becomes `4 1 0 beta 1`). Numeric segments compare numerically, an
//! alphabetic segment sorts below any number so prereleases precede their
//! release, and missing trailing segments count as zero.

use super::VersionError;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+([.-][0-9A-Za-z]+)*$").expect("version pattern is valid")
});

static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+|[A-Za-z]+").expect("segment pattern is valid"));

/// One component of a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Numeric component (`1`, `13`)
    Number(u64),
    /// Alphabetic component marking a prerelease (`beta`, `rc`)
    Tag(String),
}

impl Segment {
    fn cmp_segment(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Tag(a), Self::Tag(b)) => a.cmp(b),
            (Self::Tag(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Tag(_)) => Ordering::Greater,
        }
    }
}

/// A parsed dependency version
#[derive(Debug, Clone)]
pub struct GemVersion {
    raw: String,
    segments: Vec<Segment>,
}

impl GemVersion {
    /// Parse a version string such as `2.7.1` or `4.1.0.beta1`
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let raw = input.trim();
        if !VERSION_PATTERN.is_match(raw) {
            return Err(VersionError::InvalidVersion(input.to_string()));
        }

        let mut segments = Vec::new();
        for token in SEGMENT_PATTERN.find_iter(raw) {
            let text = token.as_str();
            let segment = match text.parse::<u64>() {
                Ok(n) => Segment::Number(n),
                Err(_) if text.chars().all(|c| c.is_ascii_digit()) => {
                    return Err(VersionError::InvalidVersion(input.to_string()))
                }
                Err(_) => Segment::Tag(text.to_ascii_lowercase()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The version as written in the catalog
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment is alphabetic
    pub fn is_prerelease(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Tag(_)))
    }

    /// Numeric segment at `index`, zero when absent
    pub fn number_at(&self, index: usize) -> Option<u64> {
        match self.segments.get(index) {
            Some(Segment::Number(n)) => Some(*n),
            Some(Segment::Tag(_)) => None,
            None => Some(0),
        }
    }

    /// Leading major component
    pub fn major(&self) -> u64 {
        self.number_at(0).unwrap_or(0)
    }

    /// Upper bound used by the pessimistic operator: `2.7.1` bumps to `2.8`,
    /// `2` bumps to `3`.
    pub(crate) fn bump(&self) -> GemVersion {
        let mut numbers: Vec<u64> = self
            .segments
            .iter()
            .take_while(|s| matches!(s, Segment::Number(_)))
            .map(|s| match s {
                Segment::Number(n) => *n,
                Segment::Tag(_) => 0,
            })
            .collect();
        if numbers.len() > 1 {
            numbers.pop();
        }
        if let Some(last) = numbers.last_mut() {
            *last += 1;
        }
        let raw = numbers
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        GemVersion {
            raw,
            segments: numbers.into_iter().map(Segment::Number).collect(),
        }
    }
}

impl Ord for GemVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let zero = Segment::Number(0);
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).unwrap_or(&zero);
            let b = other.segments.get(i).unwrap_or(&zero);
            match a.cmp_segment(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for GemVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GemVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GemVersion {}

impl FromStr for GemVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> GemVersion {
        GemVersion::parse(s).unwrap()
    }

    #[test]
    fn numeric_ordering() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0") > v("1.99.99"));
        assert!(v("9.2.13.0") > v("9.2.9.0"));
    }

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("1.0.1") > v("1"));
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("4.1.0.beta1") < v("4.1.0"));
        assert!(v("4.1.0.beta1") > v("4.0.13"));
        assert!(v("4.1.0.beta1") < v("4.1.0.rc1"));
        assert!(v("1.0.0-rc1") < v("1.0.0"));
        assert!(v("4.1.0.beta1").is_prerelease());
        assert!(!v("4.1.0").is_prerelease());
    }

    #[test]
    fn rejects_garbage() {
        assert!(GemVersion::parse("").is_err());
        assert!(GemVersion::parse("latest").is_err());
        assert!(GemVersion::parse("1..2").is_err());
        assert!(GemVersion::parse(">= 1.0").is_err());
    }

    #[test]
    fn bump_for_pessimistic_bounds() {
        assert_eq!(v("2.7.1").bump().as_str(), "2.8");
        assert_eq!(v("2.7").bump().as_str(), "3");
        assert_eq!(v("2").bump().as_str(), "3");
    }

    #[test]
    fn display_keeps_catalog_text() {
        assert_eq!(v(" 2.6.6 ").to_string(), "2.6.6");
        assert_eq!(v("2.6.6").major(), 2);
    }
}
