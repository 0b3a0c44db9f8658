//! Shared test utilities for the janitor workspace
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`db`]: In-memory SQLite pools
//! - [`time`]: Fixed clocks anchored at well-known instants

pub mod db;
pub mod time;

// Re-export commonly used items
pub use db::{open_named_test_db, open_test_db};
pub use time::{fixed_clock, weekday_noon};
