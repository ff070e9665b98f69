//! Power aggregation module
//!
//! Owns the per-source aggregation state: a running accumulator for the
//! current clock hour, the ranked top-N retention of finalized hourly
//! averages, and the monthly reset bookkeeping. The host scheduler feeds
//! it sample events, hour-boundary ticks, and manual recompute requests;
//! nothing here owns a timer or performs I/O.

mod ranked;
mod registry;

pub use ranked::RankedMaxList;
pub use registry::TrackerRegistry;

use crate::core::{
    day_start, hour_start, same_month, Error, GateState, MaxEntry, Result, SourceConfig,
    TrackerSnapshot,
};
use crate::db::HourlyStatistics;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Running accumulator for the current clock hour.
///
/// Tracks gated energy (W·s) over recorded elapsed time so the running
/// average stays exact even when samples arrive unevenly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourAccumulator {
    hour_start: DateTime<Utc>,
    energy_ws: f64,
    elapsed_secs: f64,
    last_event: Option<DateTime<Utc>>,
}

impl HourAccumulator {
    fn new(hour: DateTime<Utc>) -> Self {
        Self {
            hour_start: hour,
            energy_ws: 0.0,
            elapsed_secs: 0.0,
            last_event: None,
        }
    }

    /// Credit `watts` over the interval since the previous event.
    ///
    /// The interval is clamped to this accumulator's hour; out-of-order
    /// events are ignored. The first event of the hour is credited from
    /// the hour start.
    fn accumulate(&mut self, watts: f64, ts: DateTime<Utc>) {
        let hour_end = self.hour_start + TimeDelta::hours(1);
        let upto = ts.min(hour_end);
        let from = self.last_event.unwrap_or(self.hour_start);
        if upto <= from {
            return;
        }

        let delta_secs = (upto - from).num_milliseconds() as f64 / 1000.0;
        self.energy_ws += watts * delta_secs;
        self.elapsed_secs += delta_secs;
        self.last_event = Some(upto);
    }

    /// Average over the recorded time (kW); 0 with no elapsed time
    fn average_kw(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            0.0
        } else {
            self.energy_ws / self.elapsed_secs / 1000.0
        }
    }

    pub fn hour_start(&self) -> DateTime<Utc> {
        self.hour_start
    }
}

/// Everything the tracker needs to survive a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorState {
    pub max_values: RankedMaxList,
    pub previous_month_average: Option<f64>,
    pub accumulator: HourAccumulator,
    pub mirrored_watts: f64,
    pub gate: GateState,
    /// Fencing token: a boundary tick for this hour has already run
    pub last_finalized_hour: Option<DateTime<Utc>>,
}

/// The Power Aggregator for one configured source
pub struct Aggregator {
    config: SourceConfig,
    state: AggregatorState,
}

impl Aggregator {
    /// Create a fresh aggregator with an empty accumulator at `now`'s hour
    pub fn new(config: SourceConfig, now: DateTime<Utc>) -> Self {
        let state = AggregatorState {
            max_values: RankedMaxList::new(config.num_max_values),
            previous_month_average: None,
            accumulator: HourAccumulator::new(hour_start(now)),
            mirrored_watts: 0.0,
            gate: GateState::On,
            last_finalized_hour: None,
        };
        Self { config, state }
    }

    /// Adopt persisted state, trimming the max list if the configured
    /// capacity shrank since it was saved. A stale accumulator hour is
    /// left as-is; the next boundary tick finalizes whatever it holds.
    pub fn restore(config: SourceConfig, mut state: AggregatorState) -> Self {
        state.max_values.set_capacity(config.num_max_values);
        Self { config, state }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> &AggregatorState {
        &self.state
    }

    // -----------------------------------------------------------------
    // Trigger inputs
    // -----------------------------------------------------------------

    /// Feed one sample event.
    ///
    /// `reading_watts` of `None` means the sensor is unavailable; the
    /// gate argument is ignored for sources configured without a gate.
    /// Malformed input degrades to a 0 W contribution, never an error.
    pub fn on_sample(
        &mut self,
        reading_watts: Option<f64>,
        gate: Option<GateState>,
        ts: DateTime<Utc>,
    ) {
        let gate = if self.config.gate_path.is_some() {
            gate.unwrap_or(GateState::Unavailable)
        } else {
            GateState::On
        };
        self.state.gate = gate;

        let effective = if gate.is_open() {
            reading_watts
                .filter(|w| w.is_finite())
                .map(|w| w.max(0.0))
                .unwrap_or(0.0)
        } else {
            0.0
        };

        self.state.mirrored_watts = effective;
        self.state.accumulator.accumulate(effective, ts);
    }

    /// Synthetic re-evaluation tick: advance the accumulator holding the
    /// last effective reading constant, so idle 0 W periods keep the
    /// running average honest without any incoming samples.
    pub fn on_refresh(&mut self, ts: DateTime<Utc>) {
        let held = self.state.mirrored_watts;
        self.state.accumulator.accumulate(held, ts);
    }

    /// Close the accumulated hour into the ranked max list.
    ///
    /// Fires shortly after the hour start. Duplicate ticks for an
    /// already-finalized hour are ignored; callers need no stronger
    /// delivery guarantee than at-least-once. Returns the finalized
    /// hour and its average (kW), or `None` for an ignored tick.
    pub fn on_hour_boundary(&mut self, ts: DateTime<Utc>) -> Option<(DateTime<Utc>, f64)> {
        let tick_hour = hour_start(ts);
        let closing_hour = self.state.accumulator.hour_start;

        if closing_hour >= tick_hour || self.state.last_finalized_hour == Some(closing_hour) {
            log::debug!(
                "{}: ignoring boundary tick at {} for already-finalized hour {}",
                self.config.name,
                ts,
                closing_hour
            );
            return None;
        }

        // Top the hour up to its end with the held effective reading, so
        // hours that went quiet mid-way still average over the full hour.
        self.state
            .accumulator
            .accumulate(self.state.mirrored_watts, ts);

        let hour_avg_kw = self.state.accumulator.average_kw();
        if self.state.max_values.offer(hour_avg_kw, ts) {
            log::debug!(
                "{}: hour {} finalized at {:.3} kW, max list now {:?}",
                self.config.name,
                closing_hour,
                hour_avg_kw,
                self.state.max_values.values_kw()
            );
        }

        // First tick of a new calendar month: snapshot, then clear.
        // The hour just inserted still belongs to the outgoing month.
        if self.config.monthly_reset && !same_month(closing_hour, ts) {
            let snapshot = self.state.max_values.average();
            log::info!(
                "{}: monthly reset, previous month average {:?} kW",
                self.config.name,
                snapshot
            );
            self.state.previous_month_average = snapshot;
            self.state.max_values.clear();
        }

        self.state.last_finalized_hour = Some(closing_hour);
        self.state.accumulator = HourAccumulator::new(tick_hour);

        Some((closing_hour, hour_avg_kw))
    }

    /// Re-derive hourly averages for every completed hour in
    /// `[range_start, range_end)` from the historical statistics
    /// collaborator and fold them into the max list.
    ///
    /// All hours are fetched before any state changes, so a missing hour
    /// aborts atomically. Hours already folded in with an identical value
    /// and stamp are skipped, which makes re-running over the same range
    /// a no-op. The accumulator and monthly state are untouched.
    pub fn recompute(
        &mut self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        stats: &dyn HourlyStatistics,
    ) -> Result<usize> {
        if range_start > range_end {
            return Err(Error::InvalidRange(format!(
                "start {} is after end {}",
                range_start, range_end
            )));
        }
        if range_end > Utc::now() {
            return Err(Error::InvalidRange(format!(
                "end {} extends into the future",
                range_end
            )));
        }

        let mut hour = hour_start(range_start);
        if hour < range_start {
            hour += TimeDelta::hours(1);
        }

        let mut fetched = Vec::new();
        while hour + TimeDelta::hours(1) <= range_end {
            let end = hour + TimeDelta::hours(1);
            let watts = stats.hourly_average(&self.config.name, hour, end)?;
            fetched.push((end, watts));
            hour = end;
        }

        let mut changed = 0;
        for (stamp, watts) in fetched {
            let value_kw = watts.max(0.0) / 1000.0;
            let already_known = self
                .state
                .max_values
                .entries()
                .iter()
                .any(|e| e.last_update == stamp && e.value_kw == value_kw);
            if already_known {
                continue;
            }
            if self.state.max_values.offer(value_kw, stamp) {
                changed += 1;
            }
        }

        log::info!(
            "{}: recompute over [{}, {}) changed {} slot(s)",
            self.config.name,
            range_start,
            range_end,
            changed
        );
        Ok(changed)
    }

    /// Recompute from midnight of today through the start of the current
    /// hour, the range the manual service action covers.
    pub fn recompute_today(
        &mut self,
        stats: &dyn HourlyStatistics,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.recompute(day_start(now), hour_start(now), stats)
    }

    // -----------------------------------------------------------------
    // Derived reads (pure)
    // -----------------------------------------------------------------

    /// Top-N hourly averages, descending, with last-update timestamps
    pub fn max_values(&self) -> &[MaxEntry] {
        self.state.max_values.entries()
    }

    /// Average of the max values (kW), `None` while the list is empty
    pub fn average_of_max(&self) -> Option<f64> {
        self.state.max_values.average()
    }

    pub fn previous_month_average(&self) -> Option<f64> {
        self.state.previous_month_average
    }

    /// Mirrored instantaneous source value (W), gated and clamped
    pub fn mirrored_watts(&self) -> f64 {
        self.state.mirrored_watts
    }

    /// Running average of the ongoing hour up to `ts`, holding the last
    /// effective reading over the tail interval
    pub fn current_hour_average(&self, ts: DateTime<Utc>) -> f64 {
        let mut acc = self.state.accumulator.clone();
        acc.accumulate(self.state.mirrored_watts, ts);
        acc.average_kw()
    }

    /// One consistent value struct for everything the read accessors expose
    pub fn snapshot(&self, ts: DateTime<Utc>) -> TrackerSnapshot {
        TrackerSnapshot {
            hourly_average_kw: self.current_hour_average(ts),
            max_values: self.state.max_values.entries().to_vec(),
            average_of_max_kw: self.state.max_values.average(),
            previous_month_average_kw: self.state.previous_month_average,
            source_power_w: self.state.mirrored_watts,
            interval_start: self.state.accumulator.hour_start,
            interval_end: self.state.accumulator.hour_start + TimeDelta::hours(1),
        }
    }
}
