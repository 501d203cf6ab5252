//! Lifetrack library
//!
//! This module exposes the tracker core shared by the `lt` binary and
//! the integration test suite.

pub mod breakdown;
pub mod deps;
pub mod error;
pub mod lifecycle;
pub mod migrate;
pub mod repo;
pub mod score;
pub mod store;
pub mod types;
