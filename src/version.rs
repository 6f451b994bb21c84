//! `ikemenversion` handling and the idempotency guard
//!
//! A screenpack declares the engine version it targets with an
//! `ikemenversion` key in its `[Info]` section. Files already at or above the
//! target version are left alone.

use crate::ini::{ConfigDocument, KeyValue};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const INFO_SECTION: &str = "Info";
pub const VERSION_KEY: &str = "ikemenversion";

/// Errors parsing a dotted version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Empty version string
    Empty,
    /// A component that is not an unsigned integer (e.g. "1.x")
    InvalidComponent { value: String, component: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Empty => write!(f, "empty version"),
            VersionError::InvalidComponent { value, component } => {
                write!(f, "invalid version '{}': '{}' is not a number", value, component)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// A version made of integers separated by dots, such as `1.0` or `0.99.1`.
///
/// Missing trailing components compare as zero, so `1`, `1.0` and `1.0.0`
/// are all equal.
#[derive(Debug, Clone)]
pub struct DottedVersion(Vec<u64>);

impl DottedVersion {
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for DottedVersion {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }
        text.split('.')
            .map(|component| {
                component
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| VersionError::InvalidComponent {
                        value: text.to_string(),
                        component: component.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|idx| {
                let a = self.0.get(idx).copied().unwrap_or(0);
                let b = other.0.get(idx).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Why a document needs patching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchReason {
    NoInfoSection,
    NoVersionKey,
    Unparseable { raw: String },
    Outdated { found: DottedVersion },
}

impl fmt::Display for PatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchReason::NoInfoSection => write!(f, "no [Info] section present"),
            PatchReason::NoVersionKey => write!(f, "no ikemenversion entry in [Info]"),
            PatchReason::Unparseable { raw } => {
                write!(f, "unable to parse ikemenversion '{}'", raw)
            }
            PatchReason::Outdated { found } => write!(f, "ikemenversion {} is outdated", found),
        }
    }
}

/// Outcome of the idempotency guard
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "VersionCheck decides whether the file may be rewritten"]
pub enum VersionCheck {
    NeedsPatch(PatchReason),
    AlreadyPatched { found: DottedVersion },
}

impl VersionCheck {
    pub fn needs_patch(&self) -> bool {
        matches!(self, VersionCheck::NeedsPatch(_))
    }
}

/// Value of the version marker with wrapping quotes removed.
pub fn marker_value(kv: &KeyValue) -> &str {
    let value = kv.value.trim();
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
        .trim()
}

/// The first `[Info]` section's `ikemenversion` entry, if any.
pub fn find_marker(doc: &ConfigDocument) -> Option<&KeyValue> {
    doc.section(INFO_SECTION)?.find(VERSION_KEY)
}

/// Decide whether `doc` must be patched to reach `target`.
///
/// Must run before any rewrite: an `AlreadyPatched` result means the file is
/// not touched at all.
pub fn check(doc: &ConfigDocument, target: &DottedVersion) -> VersionCheck {
    if doc.section(INFO_SECTION).is_none() {
        return VersionCheck::NeedsPatch(PatchReason::NoInfoSection);
    }
    let Some(marker) = find_marker(doc) else {
        return VersionCheck::NeedsPatch(PatchReason::NoVersionKey);
    };

    let raw = marker_value(marker);
    let found = match raw.parse::<DottedVersion>() {
        Ok(version) => version,
        Err(_) => {
            return VersionCheck::NeedsPatch(PatchReason::Unparseable {
                raw: raw.to_string(),
            })
        }
    };

    if found >= *target {
        VersionCheck::AlreadyPatched { found }
    } else {
        VersionCheck::NeedsPatch(PatchReason::Outdated { found })
    }
}
