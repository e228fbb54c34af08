// Dotted numeric version strings ("2.31.3", "1.0").
//
// Comparison is component-wise, left to right, with missing trailing components
// treated as zero, so "1.2" == "1.2.0". Any component that is not a non-negative
// integer is a format error.

use crate::error::FormatError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// An immutable, parsed version.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    components: Vec<u64>,
}

impl Version {
    pub fn parse(input: &str) -> Result<Version, FormatError> {
        let raw = input.trim();
        let components = raw
            .split('.')
            .map(|part| {
                let invalid = || FormatError::InvalidVersion {
                    input: raw.to_string(),
                    component: part.to_string(),
                };
                // Digits only; `u64::from_str` also takes a leading '+'.
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version {
            raw: raw.to_string(),
            components,
        })
    }

    pub fn is_at_least(&self, other: &Version) -> bool {
        self >= other
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let ours = self.components.get(i).copied().unwrap_or(0);
            let theirs = other.components.get(i).copied().unwrap_or(0);
            match ours.cmp(&theirs) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Compares two optional version strings. A missing comparand sorts lowest.
pub fn compare(a: Option<&str>, b: Option<&str>) -> Result<Ordering, FormatError> {
    match (a, b) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(b)) => Version::parse(b).map(|_| Ordering::Less),
        (Some(a), None) => Version::parse(a).map(|_| Ordering::Greater),
        (Some(a), Some(b)) => Ok(Version::parse(a)?.cmp(&Version::parse(b)?)),
    }
}

/// `true` when `version >= minimum`.
pub fn is_at_least(version: &str, minimum: &str) -> Result<bool, FormatError> {
    Ok(Version::parse(version)?.is_at_least(&Version::parse(minimum)?))
}
