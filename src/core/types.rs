//! Common types used across the application

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// State of the optional gate sensor that enables accumulation.
///
/// A source configured without a gate reference is always `On`.
/// `Off` and `Unavailable` both force the effective reading to 0 W.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    On,
    Off,
    Unavailable,
}

impl GateState {
    /// Whether accumulation is enabled in this state
    pub fn is_open(self) -> bool {
        matches!(self, GateState::On)
    }
}

impl Default for GateState {
    fn default() -> Self {
        GateState::On
    }
}

/// One entry of the ranked max list: a finalized hourly average (kW)
/// and the moment the entry last changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxEntry {
    pub value_kw: f64,
    pub last_update: DateTime<Utc>,
}

/// Immutable snapshot of everything the read accessors expose.
///
/// All values are optional where data may not be ready yet, so callers
/// can decide how to render "unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Current hourly average power (kW) for the ongoing hour
    pub hourly_average_kw: f64,
    /// The N max hourly average power values (kW) found so far
    pub max_values: Vec<MaxEntry>,
    /// Average of the max values (kW), `None` when the list is empty
    pub average_of_max_kw: Option<f64>,
    /// Snapshot of the average taken just before the last monthly reset
    pub previous_month_average_kw: Option<f64>,
    /// Mirrored instantaneous source power (W), gated and clamped
    pub source_power_w: f64,
    /// Start of the current hour interval
    pub interval_start: DateTime<Utc>,
    /// End of the current hour interval
    pub interval_end: DateTime<Utc>,
}

/// Truncate a timestamp to the start of its clock hour.
pub fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}

/// Truncate a timestamp to midnight of its day.
pub fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::days(1)).unwrap_or(ts)
}

/// Whether two timestamps fall in the same calendar month.
pub fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    use chrono::Datelike;
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hour_start_truncation() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 14, 37, 21).unwrap();
        let start = hour_start(ts);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_day_start_truncation() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 14, 37, 21).unwrap();
        assert_eq!(day_start(ts), Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_same_month_across_year() {
        let a = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!same_month(a, b));
        assert!(same_month(b, b + TimeDelta::days(20)));
    }
}
