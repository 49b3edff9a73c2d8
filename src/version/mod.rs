//! Coarse dotted-version comparison for release checks.
//!
//! Release feeds publish tags such as `v1.2.5`; the running application
//! reports `1.2.4`. This module decides whether a candidate is strictly newer
//! by comparing dot-separated numeric segments left to right.
//!
//! # Rules
//!
//! - One leading `v` (or `V`) and surrounding whitespace are ignored.
//! - Missing trailing segments count as `0`, so `1.2` equals `1.2.0`.
//! - A segment that is not a plain unsigned integer counts as `0`. Malformed
//!   tags from a remote feed therefore never panic and never look newer than
//!   a well-formed version with the same leading numbers.
//! - No pre-release semantics: `1.2.0-beta` compares like `1.2.0`.
//!
//! ```rust
//! use taskquest_updater::version::is_newer;
//!
//! assert!(is_newer("v1.2.5", "1.2.4"));
//! assert!(!is_newer("1.2", "1.2.0"));
//! ```

use std::cmp::Ordering;

/// Stateless comparator for dotted numeric versions.
pub struct VersionComparator;

impl VersionComparator {
    /// Strip the optional `v` prefix and whitespace.
    #[must_use]
    pub fn normalize(version: &str) -> &str {
        let trimmed = version.trim();
        trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed)
    }

    /// Split a version into numeric segments, failing closed to `0`.
    #[must_use]
    pub fn segments(version: &str) -> Vec<u64> {
        Self::normalize(version)
            .split('.')
            .map(|segment| segment.trim().parse().unwrap_or(0))
            .collect()
    }

    /// Total ordering between two versions under the coarse rules.
    #[must_use]
    pub fn compare(a: &str, b: &str) -> Ordering {
        let left = Self::segments(a);
        let right = Self::segments(b);

        for i in 0..left.len().max(right.len()) {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            match l.cmp(&r) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        Ordering::Equal
    }

    /// Whether `candidate` is strictly newer than `current`.
    #[must_use]
    pub fn is_newer(candidate: &str, current: &str) -> bool {
        Self::compare(candidate, current) == Ordering::Greater
    }
}

/// Whether `candidate` is strictly newer than `current`.
///
/// Shorthand for [`VersionComparator::is_newer`].
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    VersionComparator::is_newer(candidate, current)
}
