//! # Reclaim
//!
//! Resource lifecycle tracking with keep-alive, ttl sweeps and disposal.
//!
//! Owners register named resources together with a disposer, keep them alive
//! by touching them, and either dispose them explicitly or let a sweep evict
//! everything that has not been touched within a ttl window.
//!
//! ## Features
//!
//! - Explicit, injectable [`ResourceRegistry`] (no process-global map)
//! - Typed disposers with per-entry failure isolation during sweeps
//! - [`ResourceHandle`] bound to its owner's lifetime (dispose on drop)
//! - Sweep triggers: intervals, visibility, memory pressure, idle detection
//! - Dashboard surface with stats and manual collection
//!
//! ## Example
//!
//! ```rust,ignore
//! use reclaim::{ResourceRegistry, Disposer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(ResourceRegistry::new());
//! registry.register("product-card-42", Disposer::new(|| Ok(())))?;
//! registry.touch("product-card-42");
//!
//! let report = registry.sweep(Duration::from_secs(30), &[]);
//! println!("{}", report.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod handle;
pub mod observability;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod stores;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ReclaimConfig;
pub use dashboard::{CollectionNotice, Dashboard, DashboardSnapshot, NoticeLevel};
pub use handle::{HandleOptions, ResourceHandle};
pub use registry::{
    Dispose, DisposeError, DisposeFailure, DisposeOutcome, Disposer, RegistryStats,
    ResourceId, ResourceRegistry, SweepReport,
};
pub use scheduler::{SchedulerConfig, SchedulerHandle, Signal, SignalSender, SweepScheduler};

/// Error type for reclaim operations.
///
/// Disposer failures are deliberately absent: they are recovered inside the
/// registry and reported through [`DisposeOutcome`] and [`SweepReport`].
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty resource ids, malformed durations or config values |
/// | `OperationFailed` | Config/store I/O fails, no tokio runtime for a heartbeat, observability init |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for reclaim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Safely converts a `Duration` to milliseconds as u64, capping at `u64::MAX`.
#[inline]
#[must_use]
pub fn duration_to_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
