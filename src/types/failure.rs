//! Failure records accumulated during encoding.
//!
//! A failure never aborts the traversal: one bad branch must not prevent
//! serializing the rest of the graph. Records carry the qualified path to the
//! failing member so the host can locate it, and render to the strings the
//! orchestrator's ignore patterns match against.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Keys longer than this render truncated in qualified path segments.
const KEY_MAX_LEN: usize = 60;
/// Characters kept from each end of a truncated key.
const KEY_KEEP: usize = 30;

/// Why part of the graph could not be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// A non-plain value the Class Registry does not recognize.
    #[serde(rename = "unknown-custom-class")]
    UnknownCustomClass,
    /// A member the host could not capture faithfully.
    #[serde(rename = "read-only-prop")]
    ReadOnlyMember,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCustomClass => write!(f, "unknown-custom-class"),
            Self::ReadOnlyMember => write!(f, "read-only-prop"),
        }
    }
}

/// One accumulated, non-fatal encoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// What went wrong.
    pub reason: FailureReason,
    /// Qualified path segments from the graph root to the failing member,
    /// inclusive.
    pub path: Vec<String>,
}

impl FailureRecord {
    /// Create a record for the given reason and path.
    pub fn new(reason: FailureReason, path: Vec<String>) -> Self {
        Self { reason, path }
    }

    /// Short rendered form: reason plus the failing member's segment.
    ///
    /// This is the string ignore patterns match against and the key warnings
    /// deduplicate on, e.g. `unknown-custom-class assets:Buffer`.
    pub fn head(&self) -> String {
        match self.path.last() {
            Some(segment) => format!("{} {}", self.reason, segment),
            None => self.reason.to_string(),
        }
    }

    /// Full rendered form: the head plus the whole qualified path chain.
    pub fn chain(&self) -> String {
        if self.path.len() < 2 {
            self.head()
        } else {
            format!("{} ({})", self.head(), self.path.join("."))
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head())
    }
}

/// Build a qualified path segment for a member: `key:ShortTypeName`.
///
/// Overly long keys keep a readable prefix and suffix so failure messages
/// stay scannable.
pub fn qualified_segment(key: &str, short_type: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < KEY_MAX_LEN {
        format!("{}:{}", key, short_type)
    } else {
        let prefix: String = chars[..KEY_KEEP].iter().collect();
        let suffix: String = chars[chars.len() - KEY_KEEP..].iter().collect();
        format!("{}...{}:{}", prefix, suffix, short_type)
    }
}
