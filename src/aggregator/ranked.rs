//! Bounded ranked retention of the top-N hourly averages
//!
//! Keeps up to `capacity` non-negative kW values sorted descending.
//! Each value carries the timestamp it entered the list; a candidate
//! that does not change the list leaves every timestamp untouched.

use crate::core::MaxEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMaxList {
    capacity: usize,
    entries: Vec<MaxEntry>,
}

impl RankedMaxList {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Offer a candidate hourly average (kW) for retention.
    ///
    /// While below capacity every candidate is inserted. Once full, the
    /// minimum is replaced only when the candidate is strictly greater:
    /// an equal value never displaces an incumbent. Returns whether the
    /// list changed.
    pub fn offer(&mut self, value_kw: f64, ts: DateTime<Utc>) -> bool {
        if !value_kw.is_finite() || value_kw < 0.0 {
            return false;
        }

        if self.entries.len() < self.capacity {
            self.insert_sorted(value_kw, ts);
            return true;
        }

        // Sorted descending, so the minimum is the last entry.
        match self.entries.last() {
            Some(min) if value_kw > min.value_kw => {
                self.entries.pop();
                self.insert_sorted(value_kw, ts);
                true
            }
            _ => false,
        }
    }

    /// Insert keeping descending order; equal incumbents stay ahead.
    fn insert_sorted(&mut self, value_kw: f64, ts: DateTime<Utc>) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.value_kw < value_kw)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            MaxEntry {
                value_kw,
                last_update: ts,
            },
        );
    }

    /// Shrink or grow the retention capacity, dropping the smallest
    /// entries when shrinking.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.entries.truncate(capacity);
    }

    pub fn entries(&self) -> &[MaxEntry] {
        &self.entries
    }

    pub fn values_kw(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.value_kw).collect()
    }

    /// Average of the retained values, `None` when the list is empty
    pub fn average(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(|e| e.value_kw).sum();
        Some(sum / self.entries.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_fills_then_replaces_minimum() {
        let mut list = RankedMaxList::new(2);

        assert!(list.offer(1.2, ts(1)));
        assert!(list.offer(0.5, ts(2)));
        assert!(list.offer(3.1, ts(3)));
        assert!(list.offer(2.0, ts(4)));

        assert_eq!(list.values_kw(), vec![3.1, 2.0]);
    }

    #[test]
    fn test_sorted_descending_and_bounded() {
        let mut list = RankedMaxList::new(3);
        for (i, v) in [0.4, 2.2, 1.1, 0.9, 1.8].iter().enumerate() {
            list.offer(*v, ts(i as u32));
        }

        let values = list.values_kw();
        assert_eq!(values.len(), 3);
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(values, vec![2.2, 1.8, 1.1]);
    }

    #[test]
    fn test_smaller_than_min_leaves_list_untouched() {
        let mut list = RankedMaxList::new(2);
        list.offer(3.0, ts(1));
        list.offer(2.0, ts(2));

        let before = list.entries().to_vec();
        assert!(!list.offer(1.0, ts(3)));
        assert_eq!(list.entries(), before.as_slice());
    }

    #[test]
    fn test_equal_value_does_not_displace_incumbent() {
        let mut list = RankedMaxList::new(2);
        list.offer(3.0, ts(1));
        list.offer(2.0, ts(2));

        assert!(!list.offer(2.0, ts(3)));
        assert_eq!(list.entries()[1].last_update, ts(2));
    }

    #[test]
    fn test_equal_value_below_capacity_ranks_after_incumbent() {
        let mut list = RankedMaxList::new(3);
        list.offer(2.0, ts(1));
        list.offer(2.0, ts(2));

        assert_eq!(list.entries()[0].last_update, ts(1));
        assert_eq!(list.entries()[1].last_update, ts(2));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let mut list = RankedMaxList::new(2);
        assert!(!list.offer(-0.5, ts(1)));
        assert!(!list.offer(f64::NAN, ts(2)));
        assert!(list.is_empty());
    }

    #[test]
    fn test_average() {
        let mut list = RankedMaxList::new(3);
        assert_eq!(list.average(), None);

        list.offer(3.0, ts(1));
        list.offer(1.0, ts(2));
        assert!((list.average().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shrink_capacity_drops_smallest() {
        let mut list = RankedMaxList::new(3);
        list.offer(3.0, ts(1));
        list.offer(2.0, ts(2));
        list.offer(1.0, ts(3));

        list.set_capacity(2);
        assert_eq!(list.values_kw(), vec![3.0, 2.0]);
    }
}
