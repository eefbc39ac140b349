//! # Metrics Module
//!
//! Prometheus metrics for the reconcilers and stock actions. Every metric is
//! labelled with the controller (lowercase component name) it belongs to.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and encoding
//! - `controller_metrics` - Reconcile, action, deploy, GC and requeue metrics

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
