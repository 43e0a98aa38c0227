//! Synthetic workload driving the registry, handles and scheduler together.
//!
//! Resources come in three flavours, by index:
//!
//! | `i % 4` | Behaviour |
//! |---------|-----------|
//! | 0, 2 | heartbeat every `touch_every` |
//! | 1 | activated by its owner every tick |
//! | 3 | registered once, never touched again |
//!
//! Only the last kind should be evicted by sweeps. Along the way the
//! workload reports user activity and flips visibility so every trigger
//! gets a chance to run.

use crate::config::ReclaimConfig;
use crate::dashboard::{CollectionNotice, Dashboard, DashboardSnapshot};
use crate::handle::{HandleOptions, ResourceHandle};
use crate::registry::{Disposer, ResourceRegistry, SweepReport};
use crate::scheduler::{
    ActivityKind, SchedulerConfig, SchedulerStats, Signal, SweepScheduler,
};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument};

/// Workload parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Number of resources to create.
    pub resources: usize,
    /// How long to run.
    pub duration: Duration,
    /// Tick length; heartbeats use the same cadence.
    pub touch_every: Duration,
    /// Ttl applied to every trigger and to manual collection.
    pub ttl: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            resources: 24,
            duration: Duration::from_secs(30),
            touch_every: Duration::from_secs(2),
            ttl: Duration::from_secs(6),
        }
    }
}

impl SimulationOptions {
    /// Scales `base` down to this workload: every enabled trigger uses
    /// `ttl`, and the interval period and idle delay become `ttl` too.
    #[must_use]
    pub fn scheduler_config(&self, base: &SchedulerConfig) -> SchedulerConfig {
        let mut config = base.clone();
        if let Some(trigger) = config.interval.as_mut() {
            trigger.period = self.ttl;
            trigger.ttl = self.ttl;
        }
        if let Some(trigger) = config.visibility.as_mut() {
            trigger.ttl = self.ttl;
        }
        if let Some(trigger) = config.memory_pressure.as_mut() {
            trigger.ttl = self.ttl;
        }
        if let Some(trigger) = config.idle.as_mut() {
            trigger.idle_after = self.ttl;
            trigger.ttl = self.ttl;
        }
        config
    }

    fn validate(&self) -> Result<()> {
        if self.touch_every.is_zero() {
            return Err(Error::InvalidInput(
                "touch interval must be greater than zero".to_string(),
            ));
        }
        if self.ttl <= self.touch_every {
            return Err(Error::InvalidInput(format!(
                "ttl ({:?}) must be longer than the touch interval ({:?})",
                self.ttl, self.touch_every
            )));
        }
        Ok(())
    }
}

/// What a simulation run did.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    /// Resources created.
    pub registered: usize,
    /// Disposers that ran.
    pub disposed: usize,
    /// Ticks elapsed.
    pub ticks: u64,
    /// Scheduler counters at the end of the run.
    pub scheduler: SchedulerStats,
    /// Result of the closing manual collection.
    pub manual: CollectionNotice,
    /// Disposal of whatever was left at shutdown.
    pub shutdown: SweepReport,
}

/// Runs the workload, calling `on_tick` with a dashboard snapshot each tick.
///
/// Must run inside a tokio runtime.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `touch_every` is zero or not shorter
/// than `ttl`.
#[instrument(
    name = "reclaim.simulation.run",
    skip(config, on_tick),
    fields(component = "simulation", operation = "run")
)]
pub async fn run<F>(
    config: &ReclaimConfig,
    options: SimulationOptions,
    mut on_tick: F,
) -> Result<SimulationSummary>
where
    F: FnMut(u64, &DashboardSnapshot),
{
    options.validate()?;

    let registry = Arc::new(ResourceRegistry::new());
    let disposed = Arc::new(AtomicUsize::new(0));
    let scheduler = SweepScheduler::spawn(
        Arc::clone(&registry),
        options.scheduler_config(&config.scheduler),
        config.pressure_source.build(),
    );
    let signals = scheduler.signals();
    let dashboard = Dashboard::new(Arc::clone(&registry), options.ttl)
        .with_protected(config.protected().to_vec());

    let mut handles = Vec::with_capacity(options.resources);
    for i in 0..options.resources {
        let id = format!("sim-{i:03}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let counter = Arc::clone(&disposed);
        let mut handle = ResourceHandle::new(
            Arc::clone(&registry),
            &id,
            Disposer::infallible(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
            HandleOptions::default().touch_on_activate(i % 4 == 1),
        )?;
        if i % 2 == 0 {
            handle.start_heartbeat(options.touch_every)?;
        }
        handles.push(handle);
    }
    info!(resources = handles.len(), "Simulation resources registered");

    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + options.touch_every, options.touch_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0_u64;

    while started.elapsed() < options.duration {
        ticker.tick().await;
        ticks += 1;

        for handle in handles.iter().filter(|h| h.options().touch_on_activate) {
            handle.activate();
        }
        if ticks % 3 == 0 {
            signals.send(Signal::UserActivity(ActivityKind::PointerMove));
        }
        if ticks % 4 == 0 {
            signals.send(Signal::VisibilityChanged { visible: false });
            signals.send(Signal::VisibilityChanged { visible: true });
        }

        on_tick(ticks, &dashboard.snapshot());
    }

    let manual = dashboard.collect_now();
    let scheduler_stats = scheduler.stats();
    scheduler.shutdown().await;

    drop(handles);
    let shutdown = registry.dispose_all();

    let summary = SimulationSummary {
        registered: options.resources,
        disposed: disposed.load(Ordering::Relaxed),
        ticks,
        scheduler: scheduler_stats,
        manual,
        shutdown,
    };
    info!(
        registered = summary.registered,
        disposed = summary.disposed,
        ticks = summary.ticks,
        "Simulation finished"
    );
    Ok(summary)
}
