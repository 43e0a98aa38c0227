//! Dashboard surface over the registry.
//!
//! Shows tracked count and oldest object age, and runs a manual
//! collection with a fixed ttl.

use crate::registry::{RegistryStats, ResourceRegistry, SweepReport};
use crate::scheduler::TriggerKind;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::instrument;

/// Default ttl for "run collection now".
pub const DEFAULT_MANUAL_TTL: Duration = Duration::from_secs(60);

/// Whether a manual collection went cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Every evicted resource was cleaned up.
    Success,
    /// At least one disposer failed.
    Failure,
}

/// User-facing result of a manual collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNotice {
    /// Success or failure.
    pub level: NoticeLevel,
    /// Text to show.
    pub message: String,
}

/// What the dashboard displays.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    /// Registry stats at snapshot time.
    pub stats: RegistryStats,
    /// The most recent manual collection.
    pub last_collection: Option<SweepReport>,
}

impl DashboardSnapshot {
    /// Renders the snapshot as a small text panel.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Tracked resources:  {}", self.stats.total_tracked);
        let _ = writeln!(
            out,
            "Oldest object age:  {}",
            format_age(self.stats.oldest_object_age)
        );
        match &self.last_collection {
            Some(report) => {
                let _ = writeln!(out, "Last collection:    {}", report.summary());
            },
            None => {
                let _ = writeln!(out, "Last collection:    never");
            },
        }
        out
    }
}

/// Dashboard over a shared registry.
#[derive(Debug)]
pub struct Dashboard {
    registry: Arc<ResourceRegistry>,
    manual_ttl: Duration,
    protected: Vec<String>,
    last_collection: Mutex<Option<SweepReport>>,
}

impl Dashboard {
    /// Creates a dashboard whose manual collection uses `manual_ttl`.
    #[must_use]
    pub const fn new(registry: Arc<ResourceRegistry>, manual_ttl: Duration) -> Self {
        Self {
            registry,
            manual_ttl,
            protected: Vec::new(),
            last_collection: Mutex::new(None),
        }
    }

    /// Ids the manual collection must leave alone.
    #[must_use]
    pub fn with_protected(mut self, protected: Vec<String>) -> Self {
        self.protected = protected;
        self
    }

    /// The manual collection ttl.
    #[must_use]
    pub const fn manual_ttl(&self) -> Duration {
        self.manual_ttl
    }

    /// Current stats plus the last manual collection.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            stats: self.registry.stats(),
            last_collection: self
                .last_collection
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Runs a sweep with the manual ttl and reports the outcome.
    #[instrument(
        name = "reclaim.dashboard.collect_now",
        skip(self),
        fields(component = "dashboard", operation = "collect_now")
    )]
    pub fn collect_now(&self) -> CollectionNotice {
        let protected: Vec<&str> = self.protected.iter().map(String::as_str).collect();
        let report = self.registry.sweep(self.manual_ttl, &protected);
        metrics::counter!("sweep_runs_total", "trigger" => TriggerKind::Manual.as_str())
            .increment(1);

        let notice = if report.is_clean() {
            CollectionNotice {
                level: NoticeLevel::Success,
                message: format!(
                    "Collection complete: {} resources released",
                    report.evicted_count()
                ),
            }
        } else {
            let failed: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
            CollectionNotice {
                level: NoticeLevel::Failure,
                message: format!(
                    "Collection finished with {} failed cleanups: {}",
                    report.failures.len(),
                    failed.join("; ")
                ),
            }
        };

        *self
            .last_collection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
        notice
    }
}

/// Formats an age like `2h 5m`, `3m 12s` or `850ms`.
#[must_use]
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    if secs == 0 {
        return format!("{}ms", age.as_millis());
    }
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::registry::{DisposeError, Disposer};

    fn setup() -> (Arc<ManualClock>, Arc<ResourceRegistry>) {
        let clock = Arc::new(ManualClock::starting_at(0));
        let registry = Arc::new(ResourceRegistry::with_clock(
            Arc::clone(&clock) as Arc<dyn Clock>
        ));
        (clock, registry)
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_millis(850)), "850ms");
        assert_eq!(format_age(Duration::from_secs(42)), "42s");
        assert_eq!(format_age(Duration::from_secs(192)), "3m 12s");
        assert_eq!(format_age(Duration::from_secs(7_500)), "2h 5m");
    }

    #[test]
    fn test_snapshot_reports_stats() {
        let (clock, registry) = setup();
        registry.register("a", Disposer::noop()).expect("register");
        clock.advance(Duration::from_secs(5));

        let dashboard = Dashboard::new(Arc::clone(&registry), DEFAULT_MANUAL_TTL);
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.stats.total_tracked, 1);
        assert_eq!(snapshot.stats.oldest_object_age, Duration::from_secs(5));
        assert!(snapshot.render().contains("Last collection:    never"));
    }

    #[test]
    fn test_collect_now_success() {
        let (clock, registry) = setup();
        registry.register("old", Disposer::noop()).expect("register");
        registry.register("keep", Disposer::noop()).expect("register");
        clock.advance(Duration::from_secs(120));
        registry.register("fresh", Disposer::noop()).expect("register");

        let dashboard = Dashboard::new(Arc::clone(&registry), DEFAULT_MANUAL_TTL)
            .with_protected(vec!["keep".to_string()]);
        let notice = dashboard.collect_now();

        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "Collection complete: 1 resources released");
        assert!(registry.contains("keep"));
        assert!(registry.contains("fresh"));
        assert!(dashboard.snapshot().last_collection.is_some());
    }

    #[test]
    fn test_collect_now_failure() {
        let (clock, registry) = setup();
        registry
            .register(
                "broken",
                Disposer::new(|| Err(DisposeError::failed("socket closed"))),
            )
            .expect("register");
        clock.advance(Duration::from_secs(120));

        let dashboard = Dashboard::new(Arc::clone(&registry), DEFAULT_MANUAL_TTL);
        let notice = dashboard.collect_now();

        assert_eq!(notice.level, NoticeLevel::Failure);
        assert!(notice.message.contains("broken: disposer failed: socket closed"));
        assert!(registry.is_empty());
    }
}
