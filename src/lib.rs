//! DigiFlow - project tracking with guarded read-only SQL access.
//!
//! This library exposes the core modules for use in integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod persistence;
pub mod query;
pub mod safety;
