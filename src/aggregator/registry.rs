//! Per-source tracker registry
//!
//! Explicit aggregator instances keyed by source name; the host glue
//! owns one registry and serializes calls into each entry. No global
//! state anywhere.

use crate::aggregator::Aggregator;
use crate::core::{Result, SourceConfig};
use crate::db::StateStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Default)]
pub struct TrackerRegistry {
    trackers: HashMap<String, Aggregator>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self {
            trackers: HashMap::new(),
        }
    }

    /// Validate and register a source, replacing (and thereby resetting)
    /// any existing aggregator under the same name.
    pub fn register(&mut self, config: SourceConfig, now: DateTime<Utc>) -> Result<()> {
        config.validate()?;
        let name = config.name.clone();
        if self.trackers.contains_key(&name) {
            log::warn!("Re-registering source {}, derived state resets", name);
        }
        self.trackers.insert(name, Aggregator::new(config, now));
        Ok(())
    }

    /// Register a source and restore its persisted state when the store
    /// has one. A changed power reference discards the stored state
    /// instead of migrating it.
    pub fn register_restored(
        &mut self,
        config: SourceConfig,
        store: &dyn StateStore,
        now: DateTime<Utc>,
    ) -> Result<()> {
        config.validate()?;
        let tracker = match store.load_state(&config.name)? {
            Some((stored_path, state)) if stored_path == config.power_path => {
                log::info!("Restored state for source {}", config.name);
                Aggregator::restore(config, state)
            }
            Some((stored_path, _)) => {
                log::warn!(
                    "Source {} changed power reference ({} -> {}), starting fresh",
                    config.name,
                    stored_path,
                    config.power_path
                );
                Aggregator::new(config, now)
            }
            None => Aggregator::new(config, now),
        };
        self.trackers.insert(tracker.name().to_string(), tracker);
        Ok(())
    }

    /// Remove a source and discard its state
    pub fn remove(&mut self, name: &str) -> bool {
        self.trackers.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Aggregator> {
        self.trackers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Aggregator> {
        self.trackers.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aggregator> {
        self.trackers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Aggregator> {
        self.trackers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GateState;
    use crate::db::SqliteStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_register_validates_config() {
        let mut registry = TrackerRegistry::new();
        let bad = SourceConfig::new("x", "/tmp/p").with_num_max_values(0);
        assert!(registry.register(bad, now()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregister_resets_state() {
        let mut registry = TrackerRegistry::new();
        let config = SourceConfig::new("hp", "/tmp/p").with_num_max_values(2);
        registry.register(config.clone(), now()).unwrap();

        let agg = registry.get_mut("hp").unwrap();
        agg.on_sample(Some(1000.0), None, now());
        agg.on_hour_boundary(now() + chrono::TimeDelta::hours(1));
        assert_eq!(registry.get("hp").unwrap().max_values().len(), 1);

        registry.register(config, now()).unwrap();
        assert!(registry.get("hp").unwrap().max_values().is_empty());
    }

    #[test]
    fn test_restore_discards_state_on_changed_reference() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut registry = TrackerRegistry::new();
        let config = SourceConfig::new("hp", "/tmp/old").with_num_max_values(2);
        registry.register(config.clone(), now()).unwrap();

        {
            let agg = registry.get_mut("hp").unwrap();
            agg.on_sample(Some(2000.0), Some(GateState::On), now());
            agg.on_hour_boundary(now() + chrono::TimeDelta::hours(1));
            store.save_state(agg.name(), &agg.config().power_path, agg.state()).unwrap();
        }

        // Same reference restores the max list
        let mut restored = TrackerRegistry::new();
        restored.register_restored(config, &store, now()).unwrap();
        assert_eq!(restored.get("hp").unwrap().max_values().len(), 1);

        // Changed reference starts fresh
        let moved = SourceConfig::new("hp", "/tmp/new").with_num_max_values(2);
        let mut fresh = TrackerRegistry::new();
        fresh.register_restored(moved, &store, now()).unwrap();
        assert!(fresh.get("hp").unwrap().max_values().is_empty());
    }
}
