//! Sweep triggers.
//!
//! A [`SweepScheduler`] owns the conditions under which the registry gets
//! swept. Each trigger carries its own ttl and throttle window:
//!
//! | Trigger | Fires when | Rate limit |
//! |---------|------------|------------|
//! | `Interval` | every `period` | none (fixed cadence) |
//! | `Visibility` | the surface becomes visible | throttle window |
//! | `MemoryPressure` | a pressure source reports low memory, or every `fallback_period` without a source | throttle window |
//! | `Idle` | no user activity for `idle_after` | throttle window |
//!
//! Environment events reach the scheduler through a [`SignalSender`].
//!
//! # Example
//!
//! ```rust,ignore
//! use reclaim::scheduler::{SchedulerConfig, Signal, SweepScheduler};
//!
//! let scheduler = SweepScheduler::spawn(Arc::clone(&registry), SchedulerConfig::default(), None);
//! let signals = scheduler.signals();
//! signals.send(Signal::VisibilityChanged { visible: true });
//! // ...
//! scheduler.shutdown().await;
//! ```

mod pressure;
mod throttle;

pub use pressure::{
    ChannelPressureSource, MeminfoPressureSource, MeminfoSample, MemoryPressureSource,
    PressureNotifier, parse_meminfo,
};
pub use throttle::{Debounce, Throttle};

use crate::registry::{ResourceRegistry, SweepReport};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What caused a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerKind {
    /// Recurring timer.
    Interval,
    /// The surface became visible again.
    Visibility,
    /// Low-memory signal or its fixed-interval fallback.
    MemoryPressure,
    /// User inactivity.
    Idle,
    /// Explicit request (dashboard).
    Manual,
}

impl TriggerKind {
    /// Returns the trigger as a lowercase label (used in logs and metrics).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Visibility => "visibility",
            Self::MemoryPressure => "memory_pressure",
            Self::Idle => "idle",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind of user activity that postpones the idle sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// Pointer moved.
    PointerMove,
    /// Key pressed.
    KeyPress,
    /// Scrolled.
    Scroll,
    /// Touch input.
    Touch,
}

/// Environment event delivered to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The surface was hidden or shown.
    VisibilityChanged {
        /// Whether it is now visible.
        visible: bool,
    },
    /// The user did something.
    UserActivity(ActivityKind),
    /// The platform reported low memory.
    MemoryPressure,
}

/// Recurring sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTrigger {
    /// Time between sweeps.
    pub period: Duration,
    /// Ttl for the sweep.
    pub ttl: Duration,
}

/// Sweep on an event, rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottledTrigger {
    /// Ttl for the sweep.
    pub ttl: Duration,
    /// At most one sweep per window.
    pub throttle: Duration,
}

/// Low-memory sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureTrigger {
    /// Ttl for the sweep.
    pub ttl: Duration,
    /// At most one sweep per window.
    pub throttle: Duration,
    /// Sweep cadence when no pressure source is available.
    pub fallback_period: Duration,
}

/// Sweep after user inactivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTrigger {
    /// Inactivity needed before the sweep.
    pub idle_after: Duration,
    /// Ttl for the sweep.
    pub ttl: Duration,
    /// At most one sweep per window.
    pub throttle: Duration,
}

/// Which triggers run, and with what parameters. `None` disables a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Recurring sweep.
    pub interval: Option<IntervalTrigger>,
    /// Sweep when the surface becomes visible.
    pub visibility: Option<ThrottledTrigger>,
    /// Sweep on low memory.
    pub memory_pressure: Option<PressureTrigger>,
    /// Sweep after inactivity.
    pub idle: Option<IdleTrigger>,
    /// Ids never evicted by scheduled sweeps.
    pub protected: Vec<String>,
}

impl Default for IntervalTrigger {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(15 * 60),
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for ThrottledTrigger {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            throttle: Duration::from_secs(30),
        }
    }
}

impl Default for PressureTrigger {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            throttle: Duration::from_secs(10),
            fallback_period: Duration::from_secs(60),
        }
    }
}

impl Default for IdleTrigger {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(2 * 60),
            ttl: Duration::from_secs(5 * 60),
            throttle: Duration::from_secs(60),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Some(IntervalTrigger::default()),
            visibility: Some(ThrottledTrigger::default()),
            memory_pressure: Some(PressureTrigger::default()),
            idle: Some(IdleTrigger::default()),
            protected: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// A configuration with every trigger disabled.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            interval: None,
            visibility: None,
            memory_pressure: None,
            idle: None,
            protected: Vec::new(),
        }
    }
}

/// Counters kept by a running scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Sweeps run, per trigger.
    pub runs: BTreeMap<TriggerKind, u64>,
    /// Trigger firings dropped by a throttle.
    pub throttled: u64,
    /// Entries evicted by scheduled sweeps.
    pub evicted: u64,
    /// Disposer failures seen by scheduled sweeps.
    pub failures: u64,
    /// The latest sweep and what caused it.
    pub last: Option<(TriggerKind, SweepReport)>,
}

impl SchedulerStats {
    /// Sweeps run for `kind`.
    #[must_use]
    pub fn runs_for(&self, kind: TriggerKind) -> u64 {
        self.runs.get(&kind).copied().unwrap_or(0)
    }

    /// Sweeps run across all triggers.
    #[must_use]
    pub fn total_runs(&self) -> u64 {
        self.runs.values().sum()
    }
}

/// Cloneable sender for environment [`Signal`]s.
#[derive(Debug, Clone)]
pub struct SignalSender {
    sender: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    /// Delivers a signal. Returns `false` once the scheduler has stopped.
    pub fn send(&self, signal: Signal) -> bool {
        self.sender.send(signal).is_ok()
    }
}

/// Handle to a running scheduler. Dropping it stops the scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    signals: SignalSender,
    stats: Arc<Mutex<SchedulerStats>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Returns a sender for environment signals.
    #[must_use]
    pub fn signals(&self) -> SignalSender {
        self.signals.clone()
    }

    /// Returns a snapshot of the scheduler's counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        lock_stats(&self.stats).clone()
    }

    /// Stops the scheduler and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sweep scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn lock_stats(stats: &Mutex<SchedulerStats>) -> MutexGuard<'_, SchedulerStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawns and drives sweep triggers.
pub struct SweepScheduler {
    registry: Arc<ResourceRegistry>,
    config: SchedulerConfig,
    stats: Arc<Mutex<SchedulerStats>>,
    visibility_throttle: Option<Throttle>,
    pressure_throttle: Option<Throttle>,
    idle_throttle: Option<Throttle>,
    idle_debounce: Option<Debounce>,
}

impl SweepScheduler {
    /// Spawns the scheduler on the current tokio runtime.
    ///
    /// With a memory-pressure trigger configured, `pressure` is subscribed
    /// to; if it is `None`, yields nothing, or closes later, sweeps run
    /// every `fallback_period` instead.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        registry: Arc<ResourceRegistry>,
        config: SchedulerConfig,
        pressure: Option<Box<dyn MemoryPressureSource>>,
    ) -> SchedulerHandle {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));

        let pressure_rx = match (config.memory_pressure, pressure) {
            (Some(_), Some(mut source)) => {
                let receiver = source.subscribe();
                if receiver.is_none() {
                    info!(
                        source = source.name(),
                        "Memory pressure source unavailable; using fixed-interval fallback"
                    );
                }
                receiver
            },
            _ => None,
        };

        let scheduler = Self {
            registry,
            visibility_throttle: config.visibility.map(|t| Throttle::new(t.throttle)),
            pressure_throttle: config.memory_pressure.map(|t| Throttle::new(t.throttle)),
            idle_throttle: config.idle.map(|t| Throttle::new(t.throttle)),
            idle_debounce: config.idle.map(|t| {
                let mut debounce = Debounce::new(t.idle_after);
                debounce.poke(Instant::now());
                debounce
            }),
            config,
            stats: Arc::clone(&stats),
        };

        let task = tokio::spawn(scheduler.run(signal_rx, pressure_rx, shutdown_rx));

        SchedulerHandle {
            signals: SignalSender { sender: signal_tx },
            stats,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<Signal>,
        mut pressure: Option<mpsc::Receiver<()>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut interval = self.config.interval.map(|t| recurring(t.period));
        let mut fallback = match (self.config.memory_pressure, &pressure) {
            (Some(t), None) => Some(recurring(t.fallback_period)),
            _ => None,
        };

        info!(
            interval = self.config.interval.is_some(),
            visibility = self.config.visibility.is_some(),
            memory_pressure = self.config.memory_pressure.is_some(),
            pressure_fallback = fallback.is_some(),
            idle = self.config.idle.is_some(),
            "Sweep scheduler started"
        );

        loop {
            let idle_deadline = self.idle_debounce.as_ref().and_then(Debounce::deadline);

            tokio::select! {
                _ = &mut shutdown => break,
                () = tick(interval.as_mut()) => {
                    if let Some(trigger) = self.config.interval {
                        self.sweep(TriggerKind::Interval, trigger.ttl);
                    }
                },
                () = tick(fallback.as_mut()) => self.on_memory_pressure(),
                Some(signal) = signals.recv() => self.on_signal(signal),
                message = recv_pressure(pressure.as_mut()) => match message {
                    Some(()) => self.on_memory_pressure(),
                    None => {
                        pressure = None;
                        fallback = self.config.memory_pressure.map(|t| recurring(t.fallback_period));
                        info!("Memory pressure source closed; using fixed-interval fallback");
                    },
                },
                () = sleep_until(idle_deadline) => self.on_idle_deadline(),
            }
        }

        info!("Sweep scheduler stopped");
    }

    fn on_signal(&mut self, signal: Signal) {
        debug!(?signal, "Scheduler signal");
        match signal {
            Signal::VisibilityChanged { visible: true } => {
                let Some(trigger) = self.config.visibility else {
                    return;
                };
                if acquire(self.visibility_throttle.as_mut(), &self.stats) {
                    self.sweep(TriggerKind::Visibility, trigger.ttl);
                }
            },
            Signal::VisibilityChanged { visible: false } => {},
            Signal::UserActivity(_) => {
                if let Some(debounce) = self.idle_debounce.as_mut() {
                    debounce.poke(Instant::now());
                }
            },
            Signal::MemoryPressure => self.on_memory_pressure(),
        }
    }

    fn on_memory_pressure(&mut self) {
        let Some(trigger) = self.config.memory_pressure else {
            return;
        };
        if acquire(self.pressure_throttle.as_mut(), &self.stats) {
            self.sweep(TriggerKind::MemoryPressure, trigger.ttl);
        }
    }

    fn on_idle_deadline(&mut self) {
        let fired = self
            .idle_debounce
            .as_mut()
            .is_some_and(|debounce| debounce.fire_if_due(Instant::now()));
        let Some(trigger) = self.config.idle else {
            return;
        };
        if fired && acquire(self.idle_throttle.as_mut(), &self.stats) {
            self.sweep(TriggerKind::Idle, trigger.ttl);
        }
    }

    fn sweep(&self, kind: TriggerKind, ttl: Duration) {
        let protected: Vec<&str> = self.config.protected.iter().map(String::as_str).collect();
        let report = self.registry.sweep(ttl, &protected);

        metrics::counter!("sweep_runs_total", "trigger" => kind.as_str()).increment(1);
        debug!(trigger = %kind, summary = %report.summary(), "Scheduled sweep finished");

        let mut stats = lock_stats(&self.stats);
        *stats.runs.entry(kind).or_insert(0) += 1;
        stats.evicted += report.evicted.len() as u64;
        stats.failures += report.failures.len() as u64;
        stats.last = Some((kind, report));
    }
}

fn acquire(throttle: Option<&mut Throttle>, stats: &Mutex<SchedulerStats>) -> bool {
    let Some(throttle) = throttle else {
        return true;
    };
    let acquired = throttle.try_acquire(Instant::now());
    if !acquired {
        lock_stats(stats).throttled += 1;
        metrics::counter!("sweep_throttled_total").increment(1);
    }
    acquired
}

/// Interval whose first tick is one full period away.
fn recurring(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        },
        None => std::future::pending().await,
    }
}

async fn recv_pressure(receiver: Option<&mut mpsc::Receiver<()>>) -> Option<()> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
