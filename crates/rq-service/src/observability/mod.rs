//! Observability module for the ReadQueue service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
