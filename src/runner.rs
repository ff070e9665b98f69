//! Background sampling loop
//!
//! Reference host scheduler for the aggregation core: samples every
//! source on a fixed interval, fires the hour-boundary tick once the
//! configured delay past the hour has elapsed, records finalized hours
//! into the statistics store, and persists state periodically. Data
//! errors inside the loop are logged and absorbed so the cadence never
//! stalls.

use crate::aggregator::TrackerRegistry;
use crate::core::{hour_start, ServiceConfig, SourceConfig};
use crate::db::{SqliteStore, StateStore};
use crate::source::{FileGateProbe, FilePowerProbe, GateProbe, PowerProbe};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Probe set feeding one registered aggregator
pub struct SourceDriver {
    name: String,
    power: Box<dyn PowerProbe + Send + Sync>,
    gate: Option<Box<dyn GateProbe + Send + Sync>>,
}

impl SourceDriver {
    /// File-backed probes matching the configured references
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            name: config.name.clone(),
            power: Box::new(FilePowerProbe::new(&config.name, &config.power_path)),
            gate: config
                .gate_path
                .as_deref()
                .map(|p| Box::new(FileGateProbe::new(p)) as Box<dyn GateProbe + Send + Sync>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Run the sampling loop until the task is cancelled
pub async fn run(
    registry: Arc<Mutex<TrackerRegistry>>,
    store: Arc<Mutex<SqliteStore>>,
    drivers: Vec<SourceDriver>,
    settings: ServiceConfig,
) {
    log::info!(
        "Sampling loop started: {} source(s), {}s interval, boundary delay {}s",
        drivers.len(),
        settings.sample_interval_secs,
        settings.boundary_delay_secs
    );

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        settings.sample_interval_secs.max(1),
    ));
    let boundary_delay = TimeDelta::seconds(settings.boundary_delay_secs as i64);
    let mut sample_count: u32 = 0;

    loop {
        interval.tick().await;
        let now = Utc::now();
        sample_count = sample_count.wrapping_add(1);

        let mut registry = registry.lock().await;
        let store = store.lock().await;

        for driver in &drivers {
            let Some(agg) = registry.get_mut(&driver.name) else {
                continue;
            };

            // Fire the boundary tick once the delay past the hour has
            // elapsed; the aggregator dedupes late or repeated ticks.
            let accumulator_hour = agg.state().accumulator.hour_start();
            if hour_start(now) > accumulator_hour && now >= hour_start(now) + boundary_delay {
                if let Some((hour, avg_kw)) = agg.on_hour_boundary(now) {
                    log::info!(
                        "{}: hour {} closed at {:.3} kW",
                        driver.name,
                        hour,
                        avg_kw
                    );
                    if let Err(e) = store.record_hourly_average(&driver.name, hour, avg_kw * 1000.0)
                    {
                        log::warn!("{}: failed to record hourly average: {}", driver.name, e);
                    }
                    if let Err(e) =
                        store.save_state(agg.name(), &agg.config().power_path, agg.state())
                    {
                        log::warn!("{}: failed to persist state: {}", driver.name, e);
                    }
                }
            }

            let watts = match driver.power.read_watts() {
                Ok(w) => w,
                Err(e) => {
                    log::warn!("{}: probe read failed: {}", driver.name, e);
                    None
                }
            };
            let gate = driver.gate.as_ref().map(|g| g.read_gate());
            agg.on_sample(watts, gate, now);
        }

        if sample_count % settings.persist_every_samples.max(1) == 0 {
            for agg in registry.iter() {
                if let Err(e) = store.save_state(agg.name(), &agg.config().power_path, agg.state())
                {
                    log::warn!("{}: failed to persist state: {}", agg.name(), e);
                }
            }

            match store.purge_old_hours(settings.retention_days) {
                Ok(0) => {}
                Ok(n) => log::debug!("Purged {} hourly record(s) past retention", n),
                Err(e) => log::warn!("Failed to purge old hours: {}", e),
            }
        }
    }
}
