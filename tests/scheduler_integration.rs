//! Integration tests for sweep triggers.
//!
//! Every test runs on a paused tokio clock. The registry uses the default
//! `MonotonicClock`, which follows tokio time, so entry ages advance with
//! `tokio::time::sleep` exactly.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use reclaim::scheduler::{
    ActivityKind, ChannelPressureSource, IdleTrigger, IntervalTrigger, PressureTrigger,
    ThrottledTrigger, TriggerKind,
};
use reclaim::{Disposer, ResourceRegistry, SchedulerConfig, Signal, SweepScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Lets the scheduler task drain its queue without moving time much.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn registry_with(ids: &[&str]) -> Arc<ResourceRegistry> {
    let registry = Arc::new(ResourceRegistry::new());
    for id in ids {
        registry.register(id, Disposer::noop()).unwrap();
    }
    registry
}

#[tokio::test(start_paused = true)]
async fn test_interval_sweeps_with_its_ttl() {
    let registry = registry_with(&["stale"]);
    let config = SchedulerConfig {
        interval: Some(IntervalTrigger {
            period: Duration::from_secs(10),
            ttl: Duration::from_secs(3),
        }),
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);

    sleep(Duration::from_secs(8)).await;
    registry.register("fresh", Disposer::noop()).unwrap();
    assert_eq!(scheduler.stats().total_runs(), 0);

    sleep(Duration::from_millis(2_500)).await;
    let stats = scheduler.stats();
    assert_eq!(stats.runs_for(TriggerKind::Interval), 1);
    assert_eq!(stats.evicted, 1);
    assert!(!registry.contains("stale"));
    assert!(registry.contains("fresh"));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_visibility_burst_runs_one_sweep() {
    let registry = registry_with(&["a"]);
    let config = SchedulerConfig {
        visibility: Some(ThrottledTrigger {
            ttl: Duration::from_secs(1),
            throttle: Duration::from_secs(30),
        }),
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);
    let signals = scheduler.signals();

    sleep(Duration::from_secs(2)).await;
    for _ in 0..5 {
        assert!(signals.send(Signal::VisibilityChanged { visible: false }));
        assert!(signals.send(Signal::VisibilityChanged { visible: true }));
    }
    settle().await;

    let stats = scheduler.stats();
    assert_eq!(stats.runs_for(TriggerKind::Visibility), 1);
    assert_eq!(stats.throttled, 4);
    assert!(registry.is_empty());

    // A new window opens after the throttle period.
    sleep(Duration::from_secs(30)).await;
    signals.send(Signal::VisibilityChanged { visible: true });
    settle().await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::Visibility), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hidden_surface_does_not_sweep() {
    let registry = registry_with(&["a"]);
    let config = SchedulerConfig {
        visibility: Some(ThrottledTrigger {
            ttl: Duration::from_secs(1),
            throttle: Duration::ZERO,
        }),
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);

    sleep(Duration::from_secs(2)).await;
    scheduler
        .signals()
        .send(Signal::VisibilityChanged { visible: false });
    settle().await;

    assert_eq!(scheduler.stats().total_runs(), 0);
    assert!(registry.contains("a"));
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_user_activity_postpones_idle_sweep() {
    let registry = registry_with(&["a"]);
    let config = SchedulerConfig {
        idle: Some(IdleTrigger {
            idle_after: Duration::from_secs(10),
            ttl: Duration::from_secs(5),
            throttle: Duration::ZERO,
        }),
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);
    let signals = scheduler.signals();

    for kind in [ActivityKind::PointerMove, ActivityKind::KeyPress, ActivityKind::Scroll] {
        sleep(Duration::from_secs(6)).await;
        signals.send(Signal::UserActivity(kind));
    }
    settle().await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::Idle), 0);
    assert!(registry.contains("a"));

    sleep(Duration::from_secs(11)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::Idle), 1);
    assert!(!registry.contains("a"));

    // Idle fires once per idle period, not repeatedly.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::Idle), 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pressure_fallback_without_source() {
    let registry = registry_with(&["a"]);
    let config = SchedulerConfig {
        memory_pressure: Some(PressureTrigger {
            ttl: Duration::from_secs(1),
            throttle: Duration::ZERO,
            fallback_period: Duration::from_secs(5),
        }),
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);

    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::MemoryPressure), 1);
    assert!(registry.is_empty());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::MemoryPressure), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_channel_pressure_source_is_throttled() {
    let registry = registry_with(&["a"]);
    let config = SchedulerConfig {
        memory_pressure: Some(PressureTrigger {
            ttl: Duration::from_secs(1),
            throttle: Duration::from_secs(10),
            fallback_period: Duration::from_secs(5),
        }),
        ..SchedulerConfig::disabled()
    };
    let (source, notifier) = ChannelPressureSource::pair();
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, Some(Box::new(source)));

    // With a live source there is no fallback timer.
    sleep(Duration::from_secs(6)).await;
    assert_eq!(scheduler.stats().total_runs(), 0);

    assert!(notifier.notify());
    settle().await;
    assert!(notifier.notify());
    settle().await;

    let stats = scheduler.stats();
    assert_eq!(stats.runs_for(TriggerKind::MemoryPressure), 1);
    assert_eq!(stats.throttled, 1);
    assert!(registry.is_empty());

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_pressure_source_falls_back_to_interval() {
    let registry = registry_with(&["stale"]);
    let config = SchedulerConfig {
        memory_pressure: Some(PressureTrigger {
            ttl: Duration::from_secs(1),
            throttle: Duration::ZERO,
            fallback_period: Duration::from_secs(5),
        }),
        ..SchedulerConfig::disabled()
    };
    let (source, notifier) = ChannelPressureSource::pair();
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, Some(Box::new(source)));

    sleep(Duration::from_secs(2)).await;
    drop(notifier);
    settle().await;
    assert_eq!(scheduler.stats().total_runs(), 0);

    // Fallback period counts from the moment the source closed.
    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::MemoryPressure), 1);
    assert!(!registry.contains("stale"));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.stats().runs_for(TriggerKind::MemoryPressure), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_protected_ids_survive_scheduled_sweeps() {
    let registry = registry_with(&["session", "thumb"]);
    let config = SchedulerConfig {
        interval: Some(IntervalTrigger {
            period: Duration::from_secs(10),
            ttl: Duration::from_secs(1),
        }),
        protected: vec!["session".to_string()],
        ..SchedulerConfig::disabled()
    };
    let scheduler = SweepScheduler::spawn(Arc::clone(&registry), config, None);

    sleep(Duration::from_millis(10_500)).await;
    assert!(registry.contains("session"));
    assert!(!registry.contains("thumb"));

    let (kind, report) = scheduler.stats().last.expect("a sweep ran");
    assert_eq!(kind, TriggerKind::Interval);
    assert_eq!(report.excluded, 1);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_signals_rejected_after_shutdown() {
    let registry = registry_with(&[]);
    let scheduler = SweepScheduler::spawn(registry, SchedulerConfig::default(), None);
    let signals = scheduler.signals();
    assert!(signals.send(Signal::MemoryPressure));

    scheduler.shutdown().await;
    assert!(!signals.send(Signal::VisibilityChanged { visible: true }));
}
