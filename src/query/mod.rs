//! Guarded, bounded execution of ad-hoc read-only queries.
//!
//! [`QueryExecutor`] only accepts [`crate::safety::ApprovedSql`], so a
//! statement cannot reach the database without passing the guard first.
//! [`QueryService`] wires the guard and the executor together.

mod executor;
mod service;

pub use executor::{QueryExecutor, QueryLimits, DEFAULT_MAX_ROWS, DEFAULT_TIMEOUT};
pub use service::QueryService;
