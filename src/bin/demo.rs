//! Power Max Tracker - Demo CLI
//!
//! Walks through the aggregation semantics with simulated timestamps:
//! gated sampling, hour finalization into the top-N list, a monthly
//! reset, and a manual recompute from recorded history.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use power_max_tracker_lib::aggregator::Aggregator;
use power_max_tracker_lib::core::{GateState, SourceConfig};
use power_max_tracker_lib::db::{HourlyStatistics, SqliteStore, StateStore};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("==============================================");
    println!("   Power Max Tracker - Demo CLI");
    println!("==============================================\n");

    // Simulated day: last day of March, rolling into April
    let start = Utc.with_ymd_and_hms(2024, 3, 31, 18, 0, 0).unwrap();

    // 1. Configure a gated source keeping the top 3 hourly averages
    println!("[1/4] Configuring source...");
    let config = SourceConfig::new("heatpump", "/run/sensors/heatpump_w")
        .with_num_max_values(3)
        .with_gate("/run/sensors/heatpump_enable");
    println!("      Source: {} (top {}, monthly reset on)\n", config.name, config.num_max_values);

    let mut agg = Aggregator::new(config.clone(), start);

    // 2. Feed six simulated hours of samples
    println!("[2/4] Simulating six hours of samples...\n");
    println!("----------------------------------------------");
    println!("  Hour          |  Avg (kW) |  Top-3 (kW)");
    println!("----------------------------------------------");

    // (watts, gate) profile per hour; the 20:00 hour is gated off
    let hours: [(f64, GateState); 6] = [
        (1200.0, GateState::On),
        (3100.0, GateState::On),
        (800.0, GateState::Off),
        (2000.0, GateState::On),
        (500.0, GateState::On),
        (2600.0, GateState::On),
    ];

    let store = SqliteStore::open_in_memory().expect("in-memory store");

    for (i, (watts, gate)) in hours.iter().enumerate() {
        let hour: DateTime<Utc> = start + TimeDelta::hours(i as i64);

        // Samples every 10 minutes within the hour
        for minute in (0..60).step_by(10) {
            let ts = hour + TimeDelta::minutes(minute);
            agg.on_sample(Some(*watts), Some(*gate), ts);
        }

        // Boundary tick 30 seconds past the next hour
        let tick = hour + TimeDelta::hours(1) + TimeDelta::seconds(30);
        if let Some((closed, avg_kw)) = agg.on_hour_boundary(tick) {
            let _ = store.record_hourly_average(&config.name, closed, avg_kw * 1000.0);
            let tops: Vec<String> = agg
                .max_values()
                .iter()
                .map(|e| format!("{:.2}", e.value_kw))
                .collect();
            println!(
                "  {} | {:>8.3}  |  [{}]",
                closed.format("%m-%d %H:%M"),
                avg_kw,
                tops.join(", ")
            );
        }
    }

    println!("----------------------------------------------\n");

    // The 00:00 tick of April 1st crossed a month boundary
    println!("[3/4] Month rollover...");
    match agg.previous_month_average() {
        Some(avg) => println!("      Previous month average: {:.3} kW", avg),
        None => println!("      No month boundary crossed yet"),
    }
    println!("      Max list after reset: {} entries\n", agg.max_values().len());

    // 4. Manual recompute from the recorded history
    println!("[4/4] Manual recompute from recorded history...");
    let range_start = start;
    let range_end = start + TimeDelta::hours(6);
    match agg.recompute(range_start, range_end, &store) {
        Ok(changed) => println!("      Recompute changed {} slot(s)", changed),
        Err(e) => println!("      Recompute failed: {}", e),
    }

    println!("\n=== Final State ===\n");
    for (i, entry) in agg.max_values().iter().enumerate() {
        println!(
            "  Max #{}: {:>6.3} kW  (recorded {})",
            i + 1,
            entry.value_kw,
            entry.last_update.format("%Y-%m-%d %H:%M")
        );
    }
    if let Some(avg) = agg.average_of_max() {
        println!("  Average of max: {:.3} kW", avg);
    }
    println!("  Mirrored source: {:.0} W", agg.mirrored_watts());

    // Round-trip the state through the store, as the service does
    store
        .save_state(&config.name, &config.power_path, agg.state())
        .expect("persist state");
    let restored = store
        .load_state(&config.name)
        .expect("load state")
        .is_some();
    println!("  State persisted and reloadable: {}", restored);

    // Show the DataUnavailable contract on a hole in history
    let missing = store.hourly_average(
        &config.name,
        start - TimeDelta::hours(24),
        start - TimeDelta::hours(23),
    );
    println!("  Query for an unrecorded hour: {}", missing.unwrap_err());

    println!("\n==============================================\n");
}
