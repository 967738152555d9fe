//! Shared helpers for the unit and integration test suites.

pub mod fixtures;

pub use fixtures::*;
