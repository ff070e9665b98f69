//! Core module - Configuration, errors, and common types

mod config;
mod error;
mod types;

pub use config::{Config, ServiceConfig, SourceConfig, MAX_MAX_VALUES, MIN_MAX_VALUES};
pub use error::{Error, Result};
pub use types::{day_start, hour_start, same_month, GateState, MaxEntry, TrackerSnapshot};
