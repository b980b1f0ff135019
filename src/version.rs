use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static VERSION_TRIPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid version regex"));

/// A `major.minor.patch` version reported by the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ToolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ToolVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Take the first `N.N.N` group found anywhere in `text`.
    ///
    /// Never fails: text without a version (or with components too large
    /// to represent) parses as `0.0.0`.
    pub fn parse(text: &str) -> Self {
        VERSION_TRIPLE
            .captures(text)
            .and_then(|caps| {
                Some(Self {
                    major: caps[1].parse().ok()?,
                    minor: caps[2].parse().ok()?,
                    patch: caps[3].parse().ok()?,
                })
            })
            .unwrap_or_default()
    }

    /// Compatibility gate: compare component by component and stop at the
    /// first one that differs.
    pub fn is_compatible_with(&self, required: &ToolVersion) -> bool {
        if self.major != required.major {
            return self.major > required.major;
        }
        if self.minor != required.minor {
            return self.minor > required.minor;
        }
        self.patch >= required.patch
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ToolVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// String form of the gate, for versions that have not been parsed yet.
pub fn is_version_compatible(installed: &str, required: &str) -> bool {
    ToolVersion::parse(installed).is_compatible_with(&ToolVersion::parse(required))
}
