//! The registry itself.

use super::disposer::Disposer;
use super::types::{DisposeFailure, DisposeOutcome, RegistryStats, ResourceId, SweepReport};
use crate::Result;
use crate::clock::{Clock, MonotonicClock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Converts u64 to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn u64_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

struct ResourceEntry {
    disposer: Disposer,
    /// Last touch, in clock milliseconds.
    touched_at: u64,
    generation: u64,
}

/// Registry of live resources keyed by [`ResourceId`].
///
/// # Thread Safety
///
/// The map lives behind a `Mutex`. The lock is held only while the map is
/// manipulated and never while a disposer runs, so disposers may call back
/// into the registry. A poisoned lock is recovered: every critical section
/// leaves the map consistent.
///
/// Share it with `Arc<ResourceRegistry>`; there is no global instance.
pub struct ResourceRegistry {
    entries: Mutex<HashMap<ResourceId, ResourceEntry>>,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("tracked", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    /// Creates an empty registry on a [`MonotonicClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Creates an empty registry on the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Returns the registry's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceId, ResourceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a resource, stamping it with the current time.
    ///
    /// If `id` is already registered, the previous entry is disposed first
    /// (its disposer runs and any failure is logged), so a replaced cleanup
    /// is never silently leaked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if `id` is empty.
    pub fn register(&self, id: &str, disposer: Disposer) -> Result<()> {
        self.insert(id, disposer).map(|_| ())
    }

    /// Like [`register`](Self::register), but reports what happened to a
    /// previous registration of `id`: `None` if there was none, otherwise
    /// the outcome of its disposer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if `id` is empty.
    pub fn replace(&self, id: &str, disposer: Disposer) -> Result<Option<DisposeOutcome>> {
        self.insert(id, disposer).map(|(_, replaced)| replaced)
    }

    /// Registers a resource and returns the generation assigned to it.
    pub(crate) fn register_tracked(&self, id: &str, disposer: Disposer) -> Result<u64> {
        self.insert(id, disposer).map(|(generation, _)| generation)
    }

    fn insert(&self, id: &str, disposer: Disposer) -> Result<(u64, Option<DisposeOutcome>)> {
        let id = ResourceId::new(id)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = ResourceEntry {
            disposer,
            touched_at: self.clock.now_ms(),
            generation,
        };

        let (previous, tracked) = {
            let mut entries = self.lock();
            let previous = entries.insert(id.clone(), entry);
            (previous, entries.len())
        };

        metrics::counter!("registry_registered_total").increment(1);
        metrics::gauge!("registry_tracked").set(usize_to_f64(tracked));
        debug!(resource_id = %id, generation, "Registered resource");

        let replaced = previous.map(|previous| {
            warn!(
                resource_id = %id,
                replaced_generation = previous.generation,
                "Resource registered twice; disposing previous registration"
            );
            Self::run_disposer(&id, previous.disposer, "replace")
        });

        Ok((generation, replaced))
    }

    /// Refreshes the entry's timestamp. Returns `false` if `id` is not registered.
    ///
    /// Never registers implicitly and never runs the disposer.
    pub fn touch(&self, id: &str) -> bool {
        self.touch_where(id, None)
    }

    pub(crate) fn touch_generation(&self, id: &str, generation: u64) -> bool {
        self.touch_where(id, Some(generation))
    }

    fn touch_where(&self, id: &str, generation: Option<u64>) -> bool {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        match entries.get_mut(id) {
            Some(entry) if generation.is_none_or(|g| g == entry.generation) => {
                entry.touched_at = entry.touched_at.max(now);
                true
            },
            _ => false,
        }
    }

    /// Removes the entry and runs its disposer. Absent ids are a no-op.
    ///
    /// Calling this repeatedly is safe: only the first call finds the entry.
    pub fn dispose(&self, id: &str) -> DisposeOutcome {
        self.dispose_where(id, None)
    }

    pub(crate) fn dispose_generation(&self, id: &str, generation: u64) -> DisposeOutcome {
        self.dispose_where(id, Some(generation))
    }

    fn dispose_where(&self, id: &str, generation: Option<u64>) -> DisposeOutcome {
        let (removed, tracked) = {
            let mut entries = self.lock();
            let matches = entries
                .get(id)
                .is_some_and(|entry| generation.is_none_or(|g| g == entry.generation));
            let removed = if matches {
                entries.remove_entry(id)
            } else {
                None
            };
            (removed, entries.len())
        };

        let Some((id, entry)) = removed else {
            return DisposeOutcome::Absent;
        };

        metrics::gauge!("registry_tracked").set(usize_to_f64(tracked));
        Self::run_disposer(&id, entry.disposer, "dispose")
    }

    /// Runs a disposer that has already been detached from the map.
    fn run_disposer(id: &ResourceId, disposer: Disposer, reason: &'static str) -> DisposeOutcome {
        match disposer.run() {
            Ok(()) => {
                metrics::counter!("registry_disposed_total", "reason" => reason).increment(1);
                debug!(resource_id = %id, reason, "Disposed resource");
                DisposeOutcome::Disposed
            },
            Err(error) => {
                metrics::counter!("registry_dispose_failures_total", "reason" => reason)
                    .increment(1);
                warn!(
                    resource_id = %id,
                    reason,
                    error = %error,
                    "Resource disposer failed; entry removed anyway"
                );
                DisposeOutcome::Failed(DisposeFailure {
                    id: id.clone(),
                    error,
                })
            },
        }
    }

    /// Evicts every entry untouched for longer than `ttl`.
    ///
    /// An entry is expired when `now - last_touch > ttl`. Ids in `exclusions`
    /// are never evicted. Disposer failures (errors or panics) are isolated
    /// per entry: the entry is still removed, the failure is logged and
    /// recorded in the report, and the remaining evictions proceed. Eviction
    /// order is unspecified.
    #[instrument(
        name = "reclaim.registry.sweep",
        skip(self, exclusions),
        fields(
            component = "registry",
            operation = "sweep",
            ttl_ms = crate::duration_to_millis(ttl),
            exclusions = exclusions.len()
        )
    )]
    pub fn sweep(&self, ttl: Duration, exclusions: &[&str]) -> SweepReport {
        let start = Instant::now();
        let ttl_ms = crate::duration_to_millis(ttl);
        let now = self.clock.now_ms();

        let mut report = SweepReport {
            ttl_ms,
            ..Default::default()
        };

        let (expired, tracked) = {
            let mut entries = self.lock();
            report.checked = entries.len();
            report.excluded = exclusions
                .iter()
                .filter(|id| entries.contains_key(**id))
                .count();

            let expired_ids: Vec<ResourceId> = entries
                .iter()
                .filter(|(id, _)| !exclusions.contains(&id.as_str()))
                .filter(|(_, entry)| now.saturating_sub(entry.touched_at) > ttl_ms)
                .map(|(id, _)| id.clone())
                .collect();

            let expired: Vec<(ResourceId, ResourceEntry)> = expired_ids
                .iter()
                .filter_map(|id| entries.remove_entry(id))
                .collect();
            (expired, entries.len())
        };

        for (id, entry) in expired {
            debug!(
                resource_id = %id,
                idle_ms = now.saturating_sub(entry.touched_at),
                ttl_ms,
                "Resource expired"
            );
            if let DisposeOutcome::Failed(failure) =
                Self::run_disposer(&id, entry.disposer, "sweep")
            {
                report.failures.push(failure);
            }
            report.evicted.push(id);
        }

        report.duration_ms = crate::duration_to_millis(start.elapsed());

        metrics::gauge!("registry_tracked").set(usize_to_f64(tracked));
        metrics::counter!("sweep_evicted_total").increment(report.evicted.len() as u64);
        metrics::histogram!("sweep_duration_ms").record(u64_to_f64(report.duration_ms));

        info!(
            checked = report.checked,
            evicted = report.evicted.len(),
            excluded = report.excluded,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "Sweep completed"
        );

        report
    }

    /// Disposes every entry regardless of age (application shutdown).
    pub fn dispose_all(&self) -> SweepReport {
        let start = Instant::now();
        let drained: Vec<(ResourceId, ResourceEntry)> = self.lock().drain().collect();

        let mut report = SweepReport {
            checked: drained.len(),
            ..Default::default()
        };
        for (id, entry) in drained {
            if let DisposeOutcome::Failed(failure) =
                Self::run_disposer(&id, entry.disposer, "shutdown")
            {
                report.failures.push(failure);
            }
            report.evicted.push(id);
        }
        report.duration_ms = crate::duration_to_millis(start.elapsed());

        metrics::gauge!("registry_tracked").set(0.0);
        info!(
            disposed = report.evicted.len(),
            failures = report.failures.len(),
            "Disposed all resources"
        );
        report
    }

    /// Returns the live entry count and the age of the least recently touched entry.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let now = self.clock.now_ms();
        let entries = self.lock();
        let oldest = entries.values().map(|entry| entry.touched_at).min();
        RegistryStats {
            total_tracked: entries.len(),
            oldest_object_age: oldest
                .map_or(Duration::ZERO, |t| Duration::from_millis(now.saturating_sub(t))),
        }
    }

    /// Time since `id` was last touched.
    #[must_use]
    pub fn age_of(&self, id: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.lock()
            .get(id)
            .map(|entry| Duration::from_millis(now.saturating_sub(entry.touched_at)))
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Returns the registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
