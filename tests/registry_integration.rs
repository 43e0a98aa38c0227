//! Integration tests for the registry, handles and dashboard.
//!
//! All timing runs on a `ManualClock` so ages are exact.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use reclaim::dashboard::DEFAULT_MANUAL_TTL;
use reclaim::{
    Clock, Dashboard, DisposeError, DisposeOutcome, Disposer, HandleOptions, ManualClock,
    NoticeLevel, ResourceHandle, ResourceRegistry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn manual_registry() -> (Arc<ManualClock>, Arc<ResourceRegistry>) {
    let clock = Arc::new(ManualClock::starting_at(1_000));
    let registry = Arc::new(ResourceRegistry::with_clock(
        Arc::clone(&clock) as Arc<dyn Clock>
    ));
    (clock, registry)
}

fn counting_disposer(counter: &Arc<AtomicUsize>) -> Disposer {
    let counter = Arc::clone(counter);
    Disposer::infallible(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_image_keepalive_scenario() {
    let (clock, registry) = manual_registry();
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    registry
        .register(
            "img-1",
            Disposer::infallible(move || flag.store(true, Ordering::SeqCst)),
        )
        .unwrap();

    // Three touches over a minute
    for _ in 0..3 {
        clock.advance(Duration::from_secs(20));
        assert!(registry.touch("img-1"));
    }

    clock.advance(Duration::from_secs(10));
    let report = registry.sweep(Duration::from_secs(30), &[]);
    assert!(report.evicted.is_empty());
    assert!(!released.load(Ordering::SeqCst));
    assert_eq!(registry.stats().total_tracked, 1);

    clock.advance(Duration::from_secs(40));
    let report = registry.sweep(Duration::from_secs(30), &[]);
    assert_eq!(report.evicted_count(), 1);
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(registry.stats().total_tracked, 0);
}

#[test]
fn test_sweep_isolates_failing_disposers() {
    let (clock, registry) = manual_registry();
    let ran = Arc::new(AtomicUsize::new(0));

    registry
        .register("a", Disposer::new(|| Err(DisposeError::failed("boom"))))
        .unwrap();
    registry
        .register("p", Disposer::infallible(|| panic!("disposer blew up")))
        .unwrap();
    registry.register("b", counting_disposer(&ran)).unwrap();

    clock.advance(Duration::from_secs(61));
    let report = registry.sweep(Duration::from_secs(60), &[]);

    assert_eq!(report.evicted_count(), 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
    assert!(report.summary().contains("2 disposer failures"));
}

#[test]
fn test_oldest_age_follows_least_recent_touch() {
    let (clock, registry) = manual_registry();
    registry.register("first", Disposer::noop()).unwrap();
    clock.advance(Duration::from_millis(100));
    registry.register("second", Disposer::noop()).unwrap();
    clock.advance(Duration::from_millis(400));

    assert_eq!(
        registry.stats().oldest_object_age,
        Duration::from_millis(500)
    );

    registry.touch("first");
    assert_eq!(
        registry.stats().oldest_object_age,
        Duration::from_millis(400)
    );
}

#[test]
fn test_handle_drop_disposes_once() {
    let (_clock, registry) = manual_registry();
    let disposed = Arc::new(AtomicUsize::new(0));

    let mut handle = ResourceHandle::new(
        Arc::clone(&registry),
        "widget",
        counting_disposer(&disposed),
        HandleOptions::default(),
    )
    .unwrap();
    assert!(registry.contains("widget"));

    assert_eq!(handle.dispose(), DisposeOutcome::Disposed);
    assert_eq!(handle.dispose(), DisposeOutcome::Absent);
    drop(handle);

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert!(!registry.contains("widget"));
}

#[test]
fn test_stale_handle_leaves_newer_registration_alone() {
    let (_clock, registry) = manual_registry();
    let old_disposed = Arc::new(AtomicUsize::new(0));
    let new_disposed = Arc::new(AtomicUsize::new(0));

    let handle = ResourceHandle::new(
        Arc::clone(&registry),
        "shared",
        counting_disposer(&old_disposed),
        HandleOptions::default(),
    )
    .unwrap();

    // Someone else re-registers the id: the old disposer runs first.
    registry
        .register("shared", counting_disposer(&new_disposed))
        .unwrap();
    assert_eq!(old_disposed.load(Ordering::SeqCst), 1);

    assert!(!handle.touch());
    drop(handle);

    assert!(registry.contains("shared"));
    assert_eq!(new_disposed.load(Ordering::SeqCst), 0);
    assert_eq!(old_disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handle_activation_keeps_alive() {
    let (clock, registry) = manual_registry();
    let active = ResourceHandle::new(
        Arc::clone(&registry),
        "active",
        Disposer::noop(),
        HandleOptions::default().touch_on_activate(true),
    )
    .unwrap();
    let passive = ResourceHandle::new(
        Arc::clone(&registry),
        "passive",
        Disposer::noop(),
        HandleOptions::default(),
    )
    .unwrap();

    for _ in 0..5 {
        clock.advance(Duration::from_secs(20));
        assert!(active.activate());
        assert!(!passive.activate());
    }

    let report = registry.sweep(Duration::from_secs(60), &[]);
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].as_str(), "passive");
    assert!(active.touch());
    assert!(!passive.touch());
    assert_eq!(passive.activations(), 5);
}

#[test]
fn test_disposer_may_reenter_registry() {
    let (clock, registry) = manual_registry();
    let inner = Arc::clone(&registry);
    registry
        .register(
            "parent",
            Disposer::infallible(move || {
                let _ = inner.dispose("child");
            }),
        )
        .unwrap();
    clock.advance(Duration::from_secs(30));
    registry.register("child", Disposer::noop()).unwrap();

    let report = registry.sweep(Duration::from_secs(10), &[]);
    assert_eq!(report.evicted_count(), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_dashboard_manual_collection() {
    let (clock, registry) = manual_registry();
    registry.register("session", Disposer::noop()).unwrap();
    registry.register("thumb-1", Disposer::noop()).unwrap();
    registry
        .register("socket", Disposer::new(|| Err(DisposeError::failed("already closed"))))
        .unwrap();
    clock.advance(DEFAULT_MANUAL_TTL + Duration::from_millis(1));

    let dashboard = Dashboard::new(Arc::clone(&registry), DEFAULT_MANUAL_TTL)
        .with_protected(vec!["session".to_string()]);
    let before = dashboard.snapshot();
    assert_eq!(before.stats.total_tracked, 3);

    let notice = dashboard.collect_now();
    assert_eq!(notice.level, NoticeLevel::Failure);
    assert!(notice.message.contains("socket"));

    let after = dashboard.snapshot();
    assert_eq!(after.stats.total_tracked, 1);
    assert!(registry.contains("session"));
    let rendered = after.render();
    assert!(rendered.contains("Tracked resources:  1"));
    assert!(rendered.contains("Evicted 2 of 3"));
}

#[test]
fn test_dispose_all_runs_every_disposer() {
    let (_clock, registry) = manual_registry();
    let disposed = Arc::new(AtomicUsize::new(0));
    for i in 0..10 {
        registry
            .register(&format!("r-{i}"), counting_disposer(&disposed))
            .unwrap();
    }

    let report = registry.dispose_all();
    assert_eq!(report.evicted_count(), 10);
    assert_eq!(disposed.load(Ordering::SeqCst), 10);
    assert!(registry.is_empty());
    assert_eq!(registry.stats().oldest_object_age, Duration::ZERO);
}
