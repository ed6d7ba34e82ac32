//! Integration tests for DigiFlow.

pub mod exchange_test;
pub mod executor_test;
pub mod guard_test;
pub mod store_test;
