//! Owner-bound registry handles.
//!
//! A [`ResourceHandle`] registers its resource on construction and disposes
//! it exactly once: either when the owner calls [`ResourceHandle::dispose`]
//! or when the handle is dropped.
//!
//! Keep-alive is the owner's job. It must touch the resource at a cadence
//! shorter than the ttl of every sweep that could see it, either per
//! activation ([`HandleOptions::touch_on_activate`]), manually, or with a
//! heartbeat task ([`ResourceHandle::start_heartbeat`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use reclaim::{Disposer, HandleOptions, ResourceHandle};
//!
//! let handle = ResourceHandle::new(
//!     Arc::clone(&registry),
//!     "product-card-42",
//!     Disposer::infallible(move || thumbnail.release()),
//!     HandleOptions::default().touch_on_activate(true),
//! )?;
//!
//! handle.activate(); // owner re-rendered: keep alive
//! drop(handle);      // owner gone: disposed
//! ```

use crate::registry::{DisposeOutcome, Disposer, ResourceId, ResourceRegistry};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Emits a handle lifecycle event at `info` when verbose, `trace` otherwise.
macro_rules! lifecycle_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

/// Options for a [`ResourceHandle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOptions {
    /// Touch the resource on every [`ResourceHandle::activate`] call.
    pub touch_on_activate: bool,
    /// Log register/touch/dispose events at `info` instead of `trace`.
    pub verbose: bool,
}

impl HandleOptions {
    /// Sets `touch_on_activate`.
    #[must_use]
    pub const fn touch_on_activate(mut self, enabled: bool) -> Self {
        self.touch_on_activate = enabled;
        self
    }

    /// Sets `verbose`.
    #[must_use]
    pub const fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }
}

/// A registry entry whose lifetime is tied to its owner.
///
/// If the same id is registered again elsewhere, this handle loses its claim:
/// it will no longer touch or dispose the newer registration.
#[derive(Debug)]
pub struct ResourceHandle {
    registry: Arc<ResourceRegistry>,
    id: ResourceId,
    generation: u64,
    options: HandleOptions,
    activations: AtomicU64,
    disposed: bool,
    heartbeat: Option<JoinHandle<()>>,
}

impl ResourceHandle {
    /// Registers `id` with `disposer` and returns the owning handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `id` is empty.
    pub fn new(
        registry: Arc<ResourceRegistry>,
        id: &str,
        disposer: Disposer,
        options: HandleOptions,
    ) -> Result<Self> {
        let resource_id = ResourceId::new(id)?;
        let generation = registry.register_tracked(id, disposer)?;
        lifecycle_event!(
            options.verbose,
            resource_id = %resource_id,
            generation,
            "Handle registered resource"
        );

        Ok(Self {
            registry,
            id: resource_id,
            generation,
            options,
            activations: AtomicU64::new(0),
            disposed: false,
            heartbeat: None,
        })
    }

    /// The resource id.
    #[must_use]
    pub const fn id(&self) -> &ResourceId {
        &self.id
    }

    /// The handle's options.
    #[must_use]
    pub const fn options(&self) -> HandleOptions {
        self.options
    }

    /// Number of [`activate`](Self::activate) calls so far.
    #[must_use]
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Returns `true` once the handle has disposed its resource.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Records an activation of the owner (a render, a frame, a request).
    ///
    /// Touches the resource when `touch_on_activate` is set. Returns whether
    /// a touch happened.
    pub fn activate(&self) -> bool {
        self.activations.fetch_add(1, Ordering::Relaxed);
        if self.options.touch_on_activate {
            return self.touch();
        }
        false
    }

    /// Keeps the resource alive. Returns `false` if it is no longer registered
    /// under this handle (disposed, swept or replaced).
    pub fn touch(&self) -> bool {
        if self.disposed {
            return false;
        }
        let touched = self.registry.touch_generation(self.id.as_str(), self.generation);
        lifecycle_event!(
            self.options.verbose,
            resource_id = %self.id,
            touched,
            "Handle touched resource"
        );
        touched
    }

    /// Disposes the resource now. Later calls, and the drop, are no-ops.
    pub fn dispose(&mut self) -> DisposeOutcome {
        if self.disposed {
            return DisposeOutcome::Absent;
        }
        self.disposed = true;
        self.stop_heartbeat();

        let outcome = self
            .registry
            .dispose_generation(self.id.as_str(), self.generation);
        lifecycle_event!(
            self.options.verbose,
            resource_id = %self.id,
            removed = outcome.removed(),
            failed = outcome.failure().is_some(),
            "Handle disposed resource"
        );
        outcome
    }

    /// Spawns a task that touches the resource every `interval`.
    ///
    /// Replaces any running heartbeat. The task stops on its own once the
    /// entry disappears, and is aborted when the handle is disposed or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero interval or a disposed
    /// handle, and [`Error::OperationFailed`] outside a tokio runtime.
    pub fn start_heartbeat(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::InvalidInput(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.disposed {
            return Err(Error::InvalidInput(format!(
                "resource '{}' is already disposed",
                self.id
            )));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::OperationFailed {
                operation: "start_heartbeat".to_string(),
                cause: e.to_string(),
            }
        })?;

        self.stop_heartbeat();

        let registry = Arc::clone(&self.registry);
        let id = self.id.clone();
        let generation = self.generation;
        let verbose = self.options.verbose;
        self.heartbeat = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; registration already stamped the entry.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !registry.touch_generation(id.as_str(), generation) {
                    lifecycle_event!(verbose, resource_id = %id, "Heartbeat stopped; resource gone");
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Returns `true` while a heartbeat task is running.
    #[must_use]
    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if !self.disposed {
            let _ = self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock, MonotonicClock};
    use crate::registry::DisposeError;
    use std::sync::atomic::AtomicUsize;

    fn manual_registry() -> (Arc<ManualClock>, Arc<ResourceRegistry>) {
        let clock = Arc::new(ManualClock::starting_at(0));
        let registry = Arc::new(ResourceRegistry::with_clock(
            Arc::clone(&clock) as Arc<dyn Clock>
        ));
        (clock, registry)
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Disposer {
        let counter = Arc::clone(counter);
        Disposer::infallible(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_new_registers() {
        let (_clock, registry) = manual_registry();
        let handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::noop(),
            HandleOptions::default(),
        )
        .expect("handle");

        assert!(registry.contains("card-1"));
        assert_eq!(handle.id().as_str(), "card-1");
    }

    #[test]
    fn test_drop_disposes_once() {
        let (_clock, registry) = manual_registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            counting(&calls),
            HandleOptions::default(),
        )
        .expect("handle");

        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_manual_dispose_then_drop() {
        let (_clock, registry) = manual_registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            counting(&calls),
            HandleOptions::default().verbose(true),
        )
        .expect("handle");

        assert_eq!(handle.dispose(), DisposeOutcome::Disposed);
        assert_eq!(handle.dispose(), DisposeOutcome::Absent);
        assert!(handle.is_disposed());
        assert!(!handle.touch());
        drop(handle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_activate_touches_when_enabled() {
        let (clock, registry) = manual_registry();
        let handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::noop(),
            HandleOptions::default().touch_on_activate(true),
        )
        .expect("handle");

        clock.advance(Duration::from_secs(20));
        assert!(handle.activate());
        clock.advance(Duration::from_secs(20));

        let report = registry.sweep(Duration::from_secs(30), &[]);
        assert!(report.evicted.is_empty());
        assert_eq!(handle.activations(), 1);
    }

    #[test]
    fn test_activate_without_touch() {
        let (clock, registry) = manual_registry();
        let handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::noop(),
            HandleOptions::default(),
        )
        .expect("handle");

        clock.advance(Duration::from_secs(20));
        assert!(!handle.activate());
        clock.advance(Duration::from_secs(20));

        let report = registry.sweep(Duration::from_secs(30), &[]);
        assert_eq!(report.evicted_count(), 1);
        assert!(!handle.touch());
    }

    #[test]
    fn test_swept_handle_drop_is_noop() {
        let (clock, registry) = manual_registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            counting(&calls),
            HandleOptions::default(),
        )
        .expect("handle");

        clock.advance(Duration::from_secs(60));
        registry.sweep(Duration::from_secs(30), &[]);
        drop(handle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_handle_leaves_newer_registration() {
        let (_clock, registry) = manual_registry();
        let newer_calls = Arc::new(AtomicUsize::new(0));
        let stale = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::noop(),
            HandleOptions::default(),
        )
        .expect("handle");
        let fresh = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            counting(&newer_calls),
            HandleOptions::default(),
        )
        .expect("handle");

        assert!(!stale.touch());
        drop(stale);
        assert!(registry.contains("card-1"));
        assert_eq!(newer_calls.load(Ordering::SeqCst), 0);

        drop(fresh);
        assert_eq!(newer_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_disposer_does_not_panic_owner() {
        let (_clock, registry) = manual_registry();
        let mut handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::new(|| Err(DisposeError::failed("already released"))),
            HandleOptions::default(),
        )
        .expect("handle");

        let outcome = handle.dispose();
        assert!(outcome.removed());
        assert!(outcome.failure().is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_heartbeat_requires_runtime() {
        let (_clock, registry) = manual_registry();
        let mut handle = ResourceHandle::new(
            registry,
            "card-1",
            Disposer::noop(),
            HandleOptions::default(),
        )
        .expect("handle");

        assert!(matches!(
            handle.start_heartbeat(Duration::from_secs(1)),
            Err(Error::OperationFailed { .. })
        ));
        assert!(matches!(
            handle.start_heartbeat(Duration::ZERO),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_resource_alive() {
        let registry = Arc::new(ResourceRegistry::with_clock(Arc::new(MonotonicClock::new())));
        let mut handle = ResourceHandle::new(
            Arc::clone(&registry),
            "card-1",
            Disposer::noop(),
            HandleOptions::default(),
        )
        .expect("handle");
        handle
            .start_heartbeat(Duration::from_secs(10))
            .expect("heartbeat");
        assert!(handle.has_heartbeat());

        tokio::time::sleep(Duration::from_secs(95)).await;

        let report = registry.sweep(Duration::from_secs(30), &[]);
        assert!(report.evicted.is_empty());
        assert!(
            registry
                .age_of("card-1")
                .is_some_and(|age| age <= Duration::from_secs(10))
        );

        handle.dispose();
        assert!(!handle.has_heartbeat());
    }
}
