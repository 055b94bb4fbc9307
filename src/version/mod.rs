// src/version/mod.rs

//! Version and version range value types
//!
//! Versions follow major.minor.micro[.qualifier] ordering: the three numeric
//! segments compare numerically, the qualifier lexicographically. Ranges are
//! floor/ceiling pairs with inclusive/exclusive flags; a missing ceiling
//! means unbounded, and an exact version is a degenerate range with equal
//! inclusive floor and ceiling.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A module version: three numeric segments plus an optional qualifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = qualifier.to_string();
        self
    }

    /// Parse a version string
    ///
    /// Format: major[.minor[.micro[.qualifier]]]
    /// Examples:
    /// - "1" → 1.0.0
    /// - "1.2" → 1.2.0
    /// - "1.2.3" → 1.2.3
    /// - "1.2.3.RELEASE" → 1.2.3 with qualifier "RELEASE"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidVersion {
                input: s.to_string(),
                reason: "empty version string".to_string(),
            });
        }

        let mut parts = s.splitn(4, '.');
        let numeric = |segment: Option<&str>| -> Result<u32> {
            match segment {
                None => Ok(0),
                Some(p) => p.parse::<u32>().map_err(|e| Error::InvalidVersion {
                    input: s.to_string(),
                    reason: format!("segment '{}': {}", p, e),
                }),
            }
        };

        let major = numeric(parts.next())?;
        let minor = numeric(parts.next())?;
        let micro = numeric(parts.next())?;
        let qualifier = parts.next().unwrap_or("").to_string();

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

/// A version range with inclusive/exclusive boundary flags
///
/// `ceiling == None` means unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub floor: Version,
    pub ceiling: Option<Version>,
    pub floor_inclusive: bool,
    pub ceiling_inclusive: bool,
}

impl VersionRange {
    /// The range matching every version: [0.0.0, ∞)
    pub fn any() -> Self {
        Self {
            floor: Version::default(),
            ceiling: None,
            floor_inclusive: true,
            ceiling_inclusive: false,
        }
    }

    /// The degenerate range matching exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            floor: version.clone(),
            ceiling: Some(version),
            floor_inclusive: true,
            ceiling_inclusive: true,
        }
    }

    /// A range with an inclusive floor and no ceiling: [floor, ∞)
    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            ceiling: None,
            floor_inclusive: true,
            ceiling_inclusive: false,
        }
    }

    /// Parse a version range string
    ///
    /// Examples:
    /// - "1.0" → [1.0.0, ∞)
    /// - "[1.0, 2.0)" → 1.0.0 inclusive to 2.0.0 exclusive
    /// - "(1.0, 2.0]" → 1.0.0 exclusive to 2.0.0 inclusive
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        let floor_inclusive = match s.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => {
                // Bare version: inclusive floor, unbounded ceiling
                return Ok(Self::at_least(Version::parse(s)?));
            }
        };

        let ceiling_inclusive = match s.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => {
                return Err(Error::InvalidVersionRange {
                    input: s.to_string(),
                    reason: "missing closing bracket".to_string(),
                });
            }
        };

        let interior = &s[1..s.len() - 1];
        let parts: Vec<&str> = interior.split(',').map(|p| p.trim()).collect();
        if parts.len() != 2 {
            return Err(Error::InvalidVersionRange {
                input: s.to_string(),
                reason: "expected exactly one comma".to_string(),
            });
        }

        let floor = Version::parse(parts[0])?;
        let ceiling = Version::parse(parts[1])?;
        if floor > ceiling {
            return Err(Error::InvalidVersionRange {
                input: s.to_string(),
                reason: format!("floor {} exceeds ceiling {}", floor, ceiling),
            });
        }

        Ok(Self {
            floor,
            ceiling: Some(ceiling),
            floor_inclusive,
            ceiling_inclusive,
        })
    }

    /// Check whether a version falls inside this range
    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        if !above_floor {
            return false;
        }

        match &self.ceiling {
            None => true,
            Some(ceiling) => {
                if self.ceiling_inclusive {
                    *version <= *ceiling
                } else {
                    *version < *ceiling
                }
            }
        }
    }

    /// If this is a degenerate point range, return the single version it matches
    pub fn as_exact(&self) -> Option<&Version> {
        match &self.ceiling {
            Some(ceiling)
                if self.floor_inclusive && self.ceiling_inclusive && *ceiling == self.floor =>
            {
                Some(&self.floor)
            }
            _ => None,
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{}, {}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' },
            ),
        }
    }
}
