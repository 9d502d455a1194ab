use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A byte quantity that parses the way configuration values are written:
/// "4096", "64kb", "100mb", "8gb".  Suffixes are case-insensitive and use
/// 1024-based multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct ByteSize(u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid byte size: {0:?}")]
pub struct ByteSizeParseError(String);

const SUFFIXES: &[(&str, u64)] = &[
    ("tb", 1 << 40),
    ("gb", 1 << 30),
    ("mb", 1 << 20),
    ("kb", 1 << 10),
    ("t", 1 << 40),
    ("g", 1 << 30),
    ("m", 1 << 20),
    ("k", 1 << 10),
    ("b", 1),
];

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ByteSizeParseError(s.to_string()));
        }

        let (digits, multiplier) = SUFFIXES
            .iter()
            .find_map(|&(suffix, multiplier)| normalized.strip_suffix(suffix).map(|d| (d, multiplier)))
            .unwrap_or((normalized.as_str(), 1));

        let value: f64 = digits.trim().parse().map_err(|_| ByteSizeParseError(s.to_string()))?;

        if !value.is_finite() || value < 0. {
            return Err(ByteSizeParseError(s.to_string()));
        }

        Ok(Self((value * multiplier as f64).round() as u64))
    }
}

impl From<&str> for ByteSize {
    /// Panics on a malformed literal; use `FromStr` for untrusted input.
    fn from(s: &str) -> Self {
        s.parse().expect("byte size literal")
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(suffix, multiplier) in SUFFIXES {
            if multiplier > 1 && self.0 >= multiplier && self.0 % multiplier == 0 {
                return write!(f, "{}{}", self.0 / multiplier, suffix);
            }
        }
        write!(f, "{}", self.0)
    }
}
