//! Simulate command handler.
//!
//! Runs a synthetic workload and prints dashboard snapshots as it goes.

use reclaim::config::parse_duration;
use reclaim::observability::ObservabilityHandle;
use reclaim::simulation::{self, SimulationOptions};
use reclaim::{NoticeLevel, ReclaimConfig};

/// Simulate command.
///
/// # Examples
///
/// ```bash
/// # Default workload
/// reclaim simulate
///
/// # 100 resources for a minute, snapshot every 5s, 15s ttl
/// reclaim simulate --resources 100 --duration 1m --touch-every 5s --ttl 15s
/// ```
pub async fn cmd_simulate(
    config: &ReclaimConfig,
    observability: &ObservabilityHandle,
    resources: usize,
    duration: &str,
    touch_every: &str,
    ttl: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = SimulationOptions {
        resources,
        duration: parse_duration(duration)?,
        touch_every: parse_duration(touch_every)?,
        ttl: parse_duration(ttl)?,
    };

    println!("Reclaim Simulation");
    println!("==================");
    println!();
    println!(
        "Resources: {}  Duration: {:?}  Tick: {:?}  TTL: {:?}",
        options.resources, options.duration, options.touch_every, options.ttl
    );
    println!();

    let summary = simulation::run(config, options, |tick, snapshot| {
        println!("-- tick {tick} --");
        print!("{}", snapshot.render());
    })
    .await?;

    println!();
    println!("Scheduler:");
    for (trigger, runs) in &summary.scheduler.runs {
        println!("  {trigger:<16} {runs} sweeps");
    }
    println!("  throttled        {}", summary.scheduler.throttled);
    println!("  evicted          {}", summary.scheduler.evicted);
    if summary.scheduler.failures > 0 {
        println!("  failed cleanups  {}", summary.scheduler.failures);
    }
    println!();

    let marker = match summary.manual.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Failure => "FAILED",
    };
    println!("Manual collection [{marker}]: {}", summary.manual.message);
    println!("Shutdown: {}", summary.shutdown.summary());
    println!(
        "Disposed {} of {} resources",
        summary.disposed, summary.registered
    );

    if let Some(metrics) = observability.metrics() {
        println!();
        println!("Metrics:");
        print!("{}", metrics.render());
    }

    Ok(())
}
