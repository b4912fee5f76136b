//! Optimisation plugins for the impact framework
//!
//! This crate provides the core functionality for:
//! - Cloud instance catalogs (built-in and custom vendor data)
//! - Right-sizing: searching an instance family for the fittest combination
//! - Carbon-aware advice: best time and location to run a workload
//! - Observability shared by both plugins

pub mod carbon;
pub mod catalog;
pub mod error;
pub mod models;
pub mod observability;
pub mod rightsizing;
pub mod util;

pub use error::{AdvisorError, Result};
pub use models::*;
pub use observability::{AdvisorMetrics, StructuredLogger};
