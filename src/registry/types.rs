//! Registry value types: ids, outcomes, stats and sweep reports.

use super::disposer::DisposeError;
use crate::{Error, Result};
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

/// Caller-chosen key of a tracked resource (e.g. `product-card-42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "resource id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A disposer failure attributed to the resource it belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposeFailure {
    /// The resource whose disposer failed.
    pub id: ResourceId,
    /// What went wrong.
    pub error: DisposeError,
}

impl fmt::Display for DisposeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

/// Result of disposing a single resource.
///
/// Both `Disposed` and `Failed` mean the entry is gone from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// No entry was registered under the id.
    Absent,
    /// The entry was removed and its disposer succeeded.
    Disposed,
    /// The entry was removed but its disposer failed.
    Failed(DisposeFailure),
}

impl DisposeOutcome {
    /// Returns `true` if an entry was removed (whether or not cleanup succeeded).
    #[must_use]
    pub const fn removed(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns the failure, if the disposer failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&DisposeFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Absent | Self::Disposed => None,
        }
    }
}

/// Point-in-time registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Number of live entries.
    pub total_tracked: usize,
    /// Age of the least recently touched entry; zero when empty.
    pub oldest_object_age: Duration,
}

/// Result of a sweep (or of disposing everything).
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Entries examined.
    pub checked: usize,
    /// Entries skipped because they were in the exclusion list.
    pub excluded: usize,
    /// Entries removed, including those whose disposer failed.
    pub evicted: Vec<ResourceId>,
    /// Disposer failures recovered during the sweep.
    pub failures: Vec<DisposeFailure>,
    /// The ttl the sweep ran with, in milliseconds.
    pub ttl_ms: u64,
    /// Duration of the sweep in milliseconds.
    pub duration_ms: u64,
}

impl SweepReport {
    /// Number of evicted entries.
    #[must_use]
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }

    /// Returns `true` if every evicted entry was cleaned up without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns a human-readable summary of the sweep.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.evicted.is_empty() {
            return format!(
                "No expired resources ({} checked, {} excluded, ttl {}ms) in {}ms",
                self.checked, self.excluded, self.ttl_ms, self.duration_ms
            );
        }

        let mut summary = format!(
            "Evicted {} of {} resources (ttl {}ms) in {}ms",
            self.evicted.len(),
            self.checked,
            self.ttl_ms,
            self.duration_ms
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(" - {} disposer failures", self.failures.len()));
        }
        summary
    }
}
