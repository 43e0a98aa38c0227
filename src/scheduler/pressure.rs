//! Memory pressure sources.
//!
//! Low-memory signals are platform specific and often missing. A source
//! that cannot observe anything returns `None` from
//! [`MemoryPressureSource::subscribe`], and the scheduler falls back to a
//! fixed-interval sweep.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const PRESSURE_CHANNEL_CAPACITY: usize = 16;

/// Something that can report low-memory conditions.
pub trait MemoryPressureSource: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Starts observing and returns a stream of pressure notifications,
    /// or `None` if this platform offers nothing to observe.
    fn subscribe(&mut self) -> Option<mpsc::Receiver<()>>;
}

/// Source fed by the embedding application.
///
/// # Example
///
/// ```rust,ignore
/// let (source, notifier) = ChannelPressureSource::pair();
/// let scheduler = SweepScheduler::spawn(registry, config, Some(Box::new(source)));
/// // later, from an OS callback:
/// notifier.notify();
/// ```
#[derive(Debug)]
pub struct ChannelPressureSource {
    receiver: Option<mpsc::Receiver<()>>,
}

/// Sending side of a [`ChannelPressureSource`].
#[derive(Debug, Clone)]
pub struct PressureNotifier {
    sender: mpsc::Sender<()>,
}

impl ChannelPressureSource {
    /// Creates a source and its notifier.
    #[must_use]
    pub fn pair() -> (Self, PressureNotifier) {
        let (sender, receiver) = mpsc::channel(PRESSURE_CHANNEL_CAPACITY);
        (
            Self {
                receiver: Some(receiver),
            },
            PressureNotifier { sender },
        )
    }
}

impl MemoryPressureSource for ChannelPressureSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn subscribe(&mut self) -> Option<mpsc::Receiver<()>> {
        self.receiver.take()
    }
}

impl PressureNotifier {
    /// Reports a low-memory condition. Bursts beyond the channel capacity are dropped.
    pub fn notify(&self) -> bool {
        self.sender.try_send(()).is_ok()
    }
}

/// Polls `/proc/meminfo` and reports pressure when available memory drops
/// below a fraction of total memory.
///
/// Unavailable (returns `None`) wherever the file cannot be read.
#[derive(Debug, Clone)]
pub struct MeminfoPressureSource {
    path: PathBuf,
    min_available_ratio: f64,
    poll_every: Duration,
}

impl MeminfoPressureSource {
    /// Creates a source reading `/proc/meminfo`.
    #[must_use]
    pub fn new(min_available_ratio: f64, poll_every: Duration) -> Self {
        Self::with_path("/proc/meminfo", min_available_ratio, poll_every)
    }

    /// Creates a source reading a meminfo-formatted file at `path`.
    #[must_use]
    pub fn with_path(
        path: impl Into<PathBuf>,
        min_available_ratio: f64,
        poll_every: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            min_available_ratio: min_available_ratio.clamp(0.0, 1.0),
            poll_every,
        }
    }
}

impl MemoryPressureSource for MeminfoPressureSource {
    fn name(&self) -> &'static str {
        "meminfo"
    }

    fn subscribe(&mut self) -> Option<mpsc::Receiver<()>> {
        let initial = std::fs::read_to_string(&self.path).ok()?;
        parse_meminfo(&initial)?;
        if self.poll_every.is_zero() {
            return None;
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;

        let (sender, receiver) = mpsc::channel(PRESSURE_CHANNEL_CAPACITY);
        runtime.spawn(poll_meminfo(
            self.path.clone(),
            self.min_available_ratio,
            self.poll_every,
            sender,
        ));
        Some(receiver)
    }
}

/// Polls `path` every `poll_every`, sending on `sender` while available
/// memory is under `ratio`. Ends when the receiver goes away or the file
/// becomes unreadable.
async fn poll_meminfo(path: PathBuf, ratio: f64, poll_every: Duration, sender: mpsc::Sender<()>) {
    let mut ticker = tokio::time::interval(poll_every);
    loop {
        tokio::select! {
            () = sender.closed() => {
                debug!("Pressure receiver dropped; stopping meminfo polling");
                break;
            },
            _ = ticker.tick() => {},
        }
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "meminfo unreadable; stopping pressure polling");
                break;
            },
        };
        let Some(sample) = parse_meminfo(&contents) else {
            continue;
        };
        if sample.available_ratio() < ratio {
            debug!(
                available_kb = sample.available_kb,
                total_kb = sample.total_kb,
                "Low memory detected"
            );
            if sender.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// A `MemTotal` / `MemAvailable` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeminfoSample {
    /// Total memory in kB.
    pub total_kb: u64,
    /// Available memory in kB.
    pub available_kb: u64,
}

impl MeminfoSample {
    /// Fraction of memory still available.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn available_ratio(&self) -> f64 {
        if self.total_kb == 0 {
            return 1.0;
        }
        self.available_kb as f64 / self.total_kb as f64
    }
}

/// Parses the `MemTotal` and `MemAvailable` lines of a meminfo file.
#[must_use]
pub fn parse_meminfo(contents: &str) -> Option<MeminfoSample> {
    let mut total = None;
    let mut available = None;
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|v| v.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = value,
            Some("MemAvailable:") => available = value,
            _ => {},
        }
    }
    Some(MeminfoSample {
        total_kb: total?,
        available_kb: available?,
    })
}
