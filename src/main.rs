//! Power Max Tracker - Main entry point
//!
//! Headless service that samples configured power sources, maintains
//! per-source rolling maxima of hourly averages, and persists state
//! and hourly history to SQLite.

mod aggregator;
mod core;
mod db;
mod runner;
mod source;

use crate::aggregator::TrackerRegistry;
use crate::core::Config;
use crate::db::SqliteStore;
use crate::runner::SourceDriver;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Power Max Tracker v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration
    let config = Config::load().context("failed to load configuration")?;
    if config.sources.is_empty() {
        log::warn!(
            "No sources configured; add [[sources]] entries to {}",
            Config::config_path()?.display()
        );
    }

    // Initialize the store
    let store = SqliteStore::new().context("failed to initialize database")?;

    // Register sources, restoring persisted state where available
    let now = Utc::now();
    let mut registry = TrackerRegistry::new();
    let mut drivers = Vec::new();
    for source in &config.sources {
        registry
            .register_restored(source.clone(), &store, now)
            .with_context(|| format!("failed to register source {}", source.name))?;
        drivers.push(SourceDriver::from_config(source));
        log::info!(
            "Tracking {} (top {}, monthly reset {})",
            source.name,
            source.num_max_values,
            source.monthly_reset
        );
    }

    runner::run(
        Arc::new(Mutex::new(registry)),
        Arc::new(Mutex::new(store)),
        drivers,
        config.service,
    )
    .await;

    Ok(())
}
