//! # Observability
//!
//! Prometheus metrics for the reconcilers and stock actions.

pub mod metrics;
