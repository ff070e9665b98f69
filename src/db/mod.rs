//! Database module for persisting tracker state and hourly statistics
//!
//! Uses SQLite for efficient local storage of:
//! - Aggregator state (survives process restarts)
//! - Finalized hourly averages (history for manual recomputes)
//!
//! The collaborator contracts the aggregation core consumes live here
//! next to their primary implementation.

use crate::aggregator::AggregatorState;
use crate::core::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durability contract: absence of stored state means "start fresh".
///
/// `load_state` also returns the power reference the state was saved
/// under, so callers can discard state whose source moved.
pub trait StateStore {
    fn save_state(&self, name: &str, power_path: &str, state: &AggregatorState) -> Result<()>;
    fn load_state(&self, name: &str) -> Result<Option<(String, AggregatorState)>>;
}

/// Historical hourly statistics the recompute path queries.
///
/// Returns the average power in watts for `[hour_start, hour_end)`;
/// a missing hour is `Error::DataUnavailable`, never a silent zero.
pub trait HourlyStatistics {
    fn hourly_average(
        &self,
        source: &str,
        hour_start: DateTime<Utc>,
        hour_end: DateTime<Utc>,
    ) -> Result<f64>;
}

/// SQLite-backed store implementing both collaborator contracts
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the database in the application data directory
    pub fn new() -> Result<Self> {
        let db_path = Self::db_path()?;
        let conn = Connection::open(&db_path)?;

        let store = Self { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// In-memory database, used by tests and the demo
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the database file path
    fn db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Database(rusqlite::Error::InvalidPath(PathBuf::new())))?;

        let app_dir = data_dir.join("power-max-tracker");
        std::fs::create_dir_all(&app_dir)?;

        Ok(app_dir.join("data.db"))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Per-source aggregator state, serialized as JSON
            CREATE TABLE IF NOT EXISTS tracker_state (
                name TEXT PRIMARY KEY,
                power_path TEXT NOT NULL,
                state TEXT NOT NULL,
                updated INTEGER NOT NULL
            );

            -- Finalized hourly averages
            CREATE TABLE IF NOT EXISTS hourly_averages (
                source TEXT NOT NULL,
                hour_start INTEGER NOT NULL,
                avg_watts REAL NOT NULL,
                PRIMARY KEY (source, hour_start)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_hourly_hour ON hourly_averages(hour_start);
            "#,
        )?;

        Ok(())
    }

    /// Record a finalized hourly average for one source
    pub fn record_hourly_average(
        &self,
        source: &str,
        hour_start: DateTime<Utc>,
        avg_watts: f64,
    ) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO hourly_averages (source, hour_start, avg_watts)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(source, hour_start) DO UPDATE SET avg_watts = ?3"#,
            params![source, hour_start.timestamp(), avg_watts],
        )?;

        Ok(())
    }

    /// Get recorded hourly averages for a time range, oldest first
    pub fn get_hourly_averages(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT hour_start, avg_watts
             FROM hourly_averages
             WHERE source = ?1 AND hour_start >= ?2 AND hour_start < ?3
             ORDER BY hour_start ASC",
        )?;

        let rows = stmt
            .query_map(params![source, start.timestamp(), end.timestamp()], |row| {
                let ts: i64 = row.get(0)?;
                let watts: f64 = row.get(1)?;
                Ok((ts, watts))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(ts, watts)| {
                Utc.timestamp_opt(ts, 0).single().map(|dt| (dt, watts))
            })
            .collect();

        Ok(rows)
    }

    /// Delete hourly records older than the retention window
    pub fn purge_old_hours(&self, days_to_keep: u32) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - (days_to_keep as i64 * 24 * 60 * 60);

        let deleted = self.conn.execute(
            "DELETE FROM hourly_averages WHERE hour_start < ?1",
            params![cutoff],
        )?;

        Ok(deleted as u64)
    }

    /// Get total recorded hours count
    pub fn get_hours_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hourly_averages", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl StateStore for SqliteStore {
    fn save_state(&self, name: &str, power_path: &str, state: &AggregatorState) -> Result<()> {
        let json =
            serde_json::to_string(state).map_err(|e| Error::Serialization(e.to_string()))?;

        self.conn.execute(
            r#"INSERT INTO tracker_state (name, power_path, state, updated)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(name) DO UPDATE SET
                   power_path = ?2,
                   state = ?3,
                   updated = ?4"#,
            params![name, power_path, json, Utc::now().timestamp()],
        )?;

        Ok(())
    }

    fn load_state(&self, name: &str) -> Result<Option<(String, AggregatorState)>> {
        let result = self.conn.query_row(
            "SELECT power_path, state FROM tracker_state WHERE name = ?1",
            params![name],
            |row| {
                let path: String = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((path, json))
            },
        );

        match result {
            Ok((path, json)) => {
                let state = serde_json::from_str(&json)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(Some((path, state)))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Database(e)),
        }
    }
}

impl HourlyStatistics for SqliteStore {
    fn hourly_average(
        &self,
        source: &str,
        hour_start: DateTime<Utc>,
        _hour_end: DateTime<Utc>,
    ) -> Result<f64> {
        let result = self.conn.query_row(
            "SELECT avg_watts FROM hourly_averages WHERE source = ?1 AND hour_start = ?2",
            params![source, hour_start.timestamp()],
            |row| row.get(0),
        );

        match result {
            Ok(watts) => Ok(watts),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::DataUnavailable(format!(
                "No hourly average for {} at {}",
                source, hour_start
            ))),
            Err(e) => Err(Error::Database(e)),
        }
    }
}

/// Map-backed hourly statistics, for tests and the demo
#[derive(Default)]
pub struct MemoryStats {
    hours: Mutex<HashMap<(String, i64), f64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: &str, hour_start: DateTime<Utc>, avg_watts: f64) {
        self.hours
            .lock()
            .expect("stats lock poisoned")
            .insert((source.to_string(), hour_start.timestamp()), avg_watts);
    }
}

impl HourlyStatistics for MemoryStats {
    fn hourly_average(
        &self,
        source: &str,
        hour_start: DateTime<Utc>,
        _hour_end: DateTime<Utc>,
    ) -> Result<f64> {
        self.hours
            .lock()
            .expect("stats lock poisoned")
            .get(&(source.to_string(), hour_start.timestamp()))
            .copied()
            .ok_or_else(|| {
                Error::DataUnavailable(format!(
                    "No hourly average for {} at {}",
                    source, hour_start
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::core::SourceConfig;
    use chrono::{TimeDelta, TimeZone};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_record_and_query_hourly_average() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.record_hourly_average("hp", hour(10), 1250.0).unwrap();

        let watts = store.hourly_average("hp", hour(10), hour(11)).unwrap();
        assert!((watts - 1250.0).abs() < 0.001);
    }

    #[test]
    fn test_missing_hour_is_data_unavailable() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = store.hourly_average("hp", hour(10), hour(11)).unwrap_err();
        assert!(matches!(err, Error::DataUnavailable(_)));
    }

    #[test]
    fn test_record_is_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.record_hourly_average("hp", hour(10), 1000.0).unwrap();
        store.record_hourly_average("hp", hour(10), 1500.0).unwrap();

        assert_eq!(store.get_hours_count().unwrap(), 1);
        let watts = store.hourly_average("hp", hour(10), hour(11)).unwrap();
        assert!((watts - 1500.0).abs() < 0.001);
    }

    #[test]
    fn test_range_query_ordered() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.record_hourly_average("hp", hour(12), 300.0).unwrap();
        store.record_hourly_average("hp", hour(10), 100.0).unwrap();
        store.record_hourly_average("hp", hour(11), 200.0).unwrap();
        store.record_hourly_average("other", hour(10), 999.0).unwrap();

        let rows = store.get_hourly_averages("hp", hour(10), hour(12)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (hour(10), 100.0));
        assert_eq!(rows[1], (hour(11), 200.0));
    }

    #[test]
    fn test_purge_old_hours() {
        let store = SqliteStore::open_in_memory().unwrap();
        let old = Utc::now() - TimeDelta::days(10);
        let recent = Utc::now() - TimeDelta::hours(2);

        store.record_hourly_average("hp", old, 100.0).unwrap();
        store.record_hourly_average("hp", recent, 200.0).unwrap();

        let deleted = store.purge_old_hours(7).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.get_hours_count().unwrap(), 1);
    }

    #[test]
    fn test_state_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = SourceConfig::new("hp", "/tmp/power_w").with_num_max_values(2);
        let mut agg = Aggregator::new(config.clone(), hour(10));

        agg.on_sample(Some(1800.0), None, hour(10) + TimeDelta::minutes(30));
        agg.on_hour_boundary(hour(11) + TimeDelta::seconds(30));

        store.save_state("hp", &config.power_path, agg.state()).unwrap();

        let (path, state) = store.load_state("hp").unwrap().unwrap();
        assert_eq!(path, "/tmp/power_w");
        let restored = Aggregator::restore(config, state);
        assert_eq!(restored.max_values(), agg.max_values());
    }

    #[test]
    fn test_load_missing_state_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load_state("nope").unwrap().is_none());
    }
}
