//! Config command handler.

use reclaim::ReclaimConfig;
use reclaim::config::format_duration;

/// Config command.
pub fn cmd_config(config: &ReclaimConfig, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    if raw {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();

    let scheduler = &config.scheduler;
    println!("Sweep Triggers:");
    match scheduler.interval {
        Some(t) => println!(
            "  Interval:        every {} (ttl {})",
            format_duration(t.period),
            format_duration(t.ttl)
        ),
        None => println!("  Interval:        disabled"),
    }
    match scheduler.visibility {
        Some(t) => println!(
            "  Visibility:      ttl {}, at most once per {}",
            format_duration(t.ttl),
            format_duration(t.throttle)
        ),
        None => println!("  Visibility:      disabled"),
    }
    match scheduler.memory_pressure {
        Some(t) => println!(
            "  Memory pressure: ttl {}, at most once per {} (source: {}, fallback every {})",
            format_duration(t.ttl),
            format_duration(t.throttle),
            config.pressure_source.kind.as_str(),
            format_duration(t.fallback_period)
        ),
        None => println!("  Memory pressure: disabled"),
    }
    match scheduler.idle {
        Some(t) => println!(
            "  Idle:            after {} (ttl {}, at most once per {})",
            format_duration(t.idle_after),
            format_duration(t.ttl),
            format_duration(t.throttle)
        ),
        None => println!("  Idle:            disabled"),
    }
    if scheduler.protected.is_empty() {
        println!("  Protected ids:   (none)");
    } else {
        println!("  Protected ids:   {}", scheduler.protected.join(", "));
    }
    println!();

    println!("Dashboard:");
    println!("  Manual TTL: {}", format_duration(config.manual_ttl));
    println!();

    println!("Observability:");
    println!(
        "  Log Format: {}",
        config.logging.format.as_deref().unwrap_or("pretty")
    );
    println!(
        "  Log File: {}",
        config.logging.file.as_deref().unwrap_or("(stderr)")
    );
    println!(
        "  Metrics: {}",
        if config.metrics.enabled.unwrap_or(false) {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    println!("Stores:");
    println!("  Data Directory: {}", config.data_dir.display());

    Ok(())
}
