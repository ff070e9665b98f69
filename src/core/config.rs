//! Configuration management

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Bounds on how many max hourly averages a source may retain
pub const MIN_MAX_VALUES: usize = 1;
pub const MAX_MAX_VALUES: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::InvalidConfig("Could not determine config directory".to_string())
        })?;

        let app_config_dir = config_dir.join("power-max-tracker");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from disk, creating a default file on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate all source entries, rejecting duplicates by name
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "Duplicate source name: {}",
                    source.name
                )));
            }
        }
        Ok(())
    }
}

/// Sampling and scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Seconds between probe samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    /// Delay past the hour start before the boundary tick fires,
    /// letting slow upstream statistics settle
    #[serde(default = "default_boundary_delay")]
    pub boundary_delay_secs: u64,
    /// Persist aggregator state every N samples
    #[serde(default = "default_persist_every")]
    pub persist_every_samples: u32,
    /// Days of hourly history to keep in the database
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_sample_interval() -> u64 { 60 }
fn default_boundary_delay() -> u64 { 60 }
fn default_persist_every() -> u32 { 10 }
fn default_retention_days() -> u32 { 90 }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
            boundary_delay_secs: default_boundary_delay(),
            persist_every_samples: default_persist_every(),
            retention_days: default_retention_days(),
        }
    }
}

/// One tracked power source.
///
/// Immutable after registration; re-registering the same name resets
/// the derived state. Changing `power_path` under an existing name is
/// an operator-visible caveat: accumulated maxima are not migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry key and persistence identity
    pub name: String,
    /// Text file carrying the instantaneous reading in watts
    pub power_path: String,
    /// How many max hourly averages to retain (1..=10)
    #[serde(default = "default_num_max_values")]
    pub num_max_values: usize,
    /// Clear the max list at the first boundary tick of each month
    #[serde(default = "default_true")]
    pub monthly_reset: bool,
    /// Optional gate file; "on"/"1" enables accumulation
    #[serde(default)]
    pub gate_path: Option<String>,
}

fn default_num_max_values() -> usize { 3 }
fn default_true() -> bool { true }

impl SourceConfig {
    pub fn new(name: &str, power_path: &str) -> Self {
        Self {
            name: name.to_string(),
            power_path: power_path.to_string(),
            num_max_values: default_num_max_values(),
            monthly_reset: default_true(),
            gate_path: None,
        }
    }

    pub fn with_num_max_values(mut self, n: usize) -> Self {
        self.num_max_values = n;
        self
    }

    pub fn with_monthly_reset(mut self, enabled: bool) -> Self {
        self.monthly_reset = enabled;
        self
    }

    pub fn with_gate(mut self, gate_path: &str) -> Self {
        self.gate_path = Some(gate_path.to_string());
        self
    }

    /// Reject malformed entries before any state is created
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("Source name must not be empty".to_string()));
        }
        if self.power_path.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "Source {}: power reference must not be empty",
                self.name
            )));
        }
        if self.num_max_values < MIN_MAX_VALUES || self.num_max_values > MAX_MAX_VALUES {
            return Err(Error::InvalidConfig(format!(
                "Source {}: num_max_values must be in {}..={}, got {}",
                self.name, MIN_MAX_VALUES, MAX_MAX_VALUES, self.num_max_values
            )));
        }
        if let Some(gate) = &self.gate_path {
            if gate.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "Source {}: gate reference must not be empty",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_max_values_bounds() {
        let base = SourceConfig::new("heatpump", "/tmp/power_w");

        assert!(base.clone().with_num_max_values(0).validate().is_err());
        assert!(base.clone().with_num_max_values(11).validate().is_err());
        for n in 1..=10 {
            assert!(base.clone().with_num_max_values(n).validate().is_ok());
        }
    }

    #[test]
    fn test_empty_references_rejected() {
        assert!(SourceConfig::new("", "/tmp/power_w").validate().is_err());
        assert!(SourceConfig::new("heatpump", "").validate().is_err());
        assert!(SourceConfig::new("heatpump", "/tmp/power_w")
            .with_gate("  ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let config = Config {
            service: ServiceConfig::default(),
            sources: vec![
                SourceConfig::new("heatpump", "/tmp/a"),
                SourceConfig::new("heatpump", "/tmp/b"),
            ],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_defaults() {
        let toml_str = r#"
            [[sources]]
            name = "heatpump"
            power_path = "/run/sensors/heatpump_w"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].num_max_values, 3);
        assert!(config.sources[0].monthly_reset);
        assert_eq!(config.service.boundary_delay_secs, 60);
        assert!(config.validate().is_ok());
    }
}
