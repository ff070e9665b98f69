//! Power Max Tracker library
//!
//! Tracks rolling maximum hourly-average power readings per source,
//! gated by an optional enable signal, with top-N retention and
//! monthly reset semantics.

pub mod aggregator;
pub mod core;
pub mod db;
pub mod runner;
pub mod source;
