//! Versions and version ranges for package declarations.
//!
//! A [`Version`] has three numeric fields, each of which may be left
//! unspecified. How unspecified fields compare is a process-wide setting
//! (see [`VersionMode`]): in fuzzy mode they count as `0`, in strict mode
//! they sort below every specified value.

use std::cmp::Ordering;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

static FUZZY_COMPARISON: AtomicBool = AtomicBool::new(true);

/// How unspecified version fields take part in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionMode {
    /// Unspecified fields compare as `0`.
    #[default]
    Fuzzy,
    /// Unspecified fields compare as `-1`.
    Strict,
}

/// Set the process-wide comparison mode.
pub fn set_version_mode(mode: VersionMode) {
    FUZZY_COMPARISON.store(mode == VersionMode::Fuzzy, AtomicOrdering::Relaxed);
}

/// The current process-wide comparison mode.
#[must_use]
pub fn version_mode() -> VersionMode {
    if FUZZY_COMPARISON.load(AtomicOrdering::Relaxed) {
        VersionMode::Fuzzy
    } else {
        VersionMode::Strict
    }
}

/// A `major.minor.micro` version whose fields may each be unspecified.
///
/// Equality is structural: `1.2` and `1.2.0` are different values even when
/// fuzzy comparison orders them as equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: Option<u32>,
    minor: Option<u32>,
    micro: Option<u32>,
}

impl Version {
    /// The version with no field specified.
    pub const EMPTY: Self = Self {
        major: None,
        minor: None,
        micro: None,
    };

    /// Creates a fully specified version.
    #[must_use]
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major: Some(major),
            minor: Some(minor),
            micro: Some(micro),
        }
    }

    /// Creates a version with explicitly (un)specified fields.
    #[must_use]
    pub const fn partial(major: Option<u32>, minor: Option<u32>, micro: Option<u32>) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// Parse `"X"`, `"X.Y"` or `"X.Y.Z"`. Surrounding whitespace and double
    /// quotes are ignored and the empty string yields [`Version::EMPTY`].
    ///
    /// # Errors
    ///
    /// Returns an error for more than three fields, an empty field, or a
    /// field that is not a non-negative integer.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        s.parse()
    }

    /// Major field, if specified.
    #[must_use]
    pub fn major(&self) -> Option<u32> {
        self.major
    }

    /// Minor field, if specified.
    #[must_use]
    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    /// Micro field, if specified.
    #[must_use]
    pub fn micro(&self) -> Option<u32> {
        self.micro
    }

    /// Whether no field is specified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.major.is_none() && self.minor.is_none() && self.micro.is_none()
    }

    /// Compare using the process-wide [`VersionMode`].
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.compare_with(other, version_mode())
    }

    /// Compare field by field using an explicit mode.
    #[must_use]
    pub fn compare_with(&self, other: &Self, mode: VersionMode) -> Ordering {
        let key = |field: Option<u32>| match (field, mode) {
            (Some(v), _) => i64::from(v),
            (None, VersionMode::Fuzzy) => 0,
            (None, VersionMode::Strict) => -1,
        };
        key(self.major)
            .cmp(&key(other.major))
            .then_with(|| key(self.minor).cmp(&key(other.minor)))
            .then_with(|| key(self.micro).cmp(&key(other.micro)))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in [self.major, self.minor, self.micro] {
            let Some(v) = field else { break };
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Error returned when parsing a version or version range fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    /// The text does not have the expected shape.
    #[error("invalid version format: {0}")]
    InvalidFormat(String),
    /// A numeric field could not be parsed.
    #[error("invalid version number: {0}")]
    InvalidNumber(#[from] ParseIntError),
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = unquote(s);
        if text.is_empty() {
            return Ok(Self::EMPTY);
        }
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(VersionParseError::InvalidFormat(s.to_string()));
        }
        let mut fields = [None; 3];
        for (slot, part) in fields.iter_mut().zip(&parts) {
            *slot = Some(part.trim().parse::<u32>()?);
        }
        Ok(Self::partial(fields[0], fields[1], fields[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

fn unquote(s: &str) -> &str {
    let t = s.trim();
    t.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(t)
        .trim()
}

/// The constraint an import places on an exporter's version.
///
/// Either an interval such as `[1.0,2.0)` or a bare version `V`, which
/// means "at least `V`". [`VersionRange::ANY`] accepts every version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    low: Version,
    low_inclusive: bool,
    high: Option<Version>,
    high_inclusive: bool,
}

impl VersionRange {
    /// A range accepting every version.
    pub const ANY: Self = Self {
        low: Version::EMPTY,
        low_inclusive: true,
        high: None,
        high_inclusive: false,
    };

    /// `[v, infinity)`.
    #[must_use]
    pub const fn at_least(v: Version) -> Self {
        Self {
            low: v,
            low_inclusive: true,
            high: None,
            high_inclusive: false,
        }
    }

    /// An explicit interval.
    #[must_use]
    pub const fn between(
        low: Version,
        low_inclusive: bool,
        high: Version,
        high_inclusive: bool,
    ) -> Self {
        Self {
            low,
            low_inclusive,
            high: Some(high),
            high_inclusive,
        }
    }

    /// Parse an interval (`[a,b]`, `[a,b)`, `(a,b]`, `(a,b)`) or a bare version.
    ///
    /// # Errors
    ///
    /// Returns an error if either end is not a valid version or the
    /// brackets are unbalanced.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        s.parse()
    }

    /// The lower bound; used to rank duplicate import declarations.
    #[must_use]
    pub fn low(&self) -> &Version {
        &self.low
    }

    /// The upper bound, if any.
    #[must_use]
    pub fn high(&self) -> Option<&Version> {
        self.high.as_ref()
    }

    /// Whether this range accepts every version.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.low.is_empty() && self.high.is_none()
    }

    /// Whether `v` lies inside the range under the process-wide mode.
    #[must_use]
    pub fn contains(&self, v: &Version) -> bool {
        self.contains_with(v, version_mode())
    }

    /// Whether `v` lies inside the range under an explicit mode.
    #[must_use]
    pub fn contains_with(&self, v: &Version, mode: VersionMode) -> bool {
        let low = v.compare_with(&self.low, mode);
        let low_ok = if self.low_inclusive {
            low != Ordering::Less
        } else {
            low == Ordering::Greater
        };
        if !low_ok {
            return false;
        }
        match &self.high {
            None => true,
            Some(high) => {
                let hi = v.compare_with(high, mode);
                if self.high_inclusive {
                    hi != Ordering::Greater
                } else {
                    hi == Ordering::Less
                }
            },
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = unquote(s);
        if text.is_empty() {
            return Ok(Self::ANY);
        }
        let opening = text.chars().next();
        if !matches!(opening, Some('[' | '(')) {
            return Ok(Self::at_least(text.parse()?));
        }
        let low_inclusive = opening == Some('[');
        let high_inclusive = match text.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(VersionParseError::InvalidFormat(s.to_string())),
        };
        // Both delimiters are single-byte ASCII.
        let inner = text
            .get(1..text.len().saturating_sub(1))
            .ok_or_else(|| VersionParseError::InvalidFormat(s.to_string()))?;
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| VersionParseError::InvalidFormat(s.to_string()))?;
        Ok(Self::between(
            low.parse()?,
            low_inclusive,
            high.parse()?,
            high_inclusive,
        ))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.high {
            None if self.low_inclusive => write!(f, "{}", self.low),
            None => write!(f, "({},)", self.low),
            Some(high) => write!(
                f,
                "{}{},{}{}",
                if self.low_inclusive { '[' } else { '(' },
                self.low,
                high,
                if self.high_inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(r: VersionRange) -> Self {
        r.to_string()
    }
}
