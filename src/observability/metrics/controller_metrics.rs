//! # Controller Metrics
//!
//! Reconcile, action, deploy and garbage collection metrics.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::sync::LazyLock;

// Reconcile metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dsc_operator_reconciliations_total",
            "Total number of reconciliation passes",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dsc_operator_reconciliation_errors_total",
            "Total number of reconciliation passes that returned an error",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dsc_operator_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ACTION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "dsc_operator_action_duration_seconds",
            "Duration of individual pipeline actions in seconds",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["controller", "action"],
    )
    .expect("Failed to create ACTION_DURATION metric - this should never happen")
});

// Action metrics
static DEPLOYED_RESOURCES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dsc_operator_deployed_resources_total",
            "Total number of resources applied to the cluster",
        ),
        &["controller"],
    )
    .expect("Failed to create DEPLOYED_RESOURCES_TOTAL metric - this should never happen")
});

static GC_DELETED_RESOURCES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dsc_operator_gc_deleted_resources_total",
            "Total number of stale resources deleted by garbage collection",
        ),
        &["controller"],
    )
    .expect("Failed to create GC_DELETED_RESOURCES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dsc_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ACTION_DURATION.clone()))?;
    REGISTRY.register(Box::new(DEPLOYED_RESOURCES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GC_DELETED_RESOURCES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn observe_action_duration(controller: &str, action: &str, duration: f64) {
    ACTION_DURATION
        .with_label_values(&[controller, action])
        .observe(duration);
}

pub fn increment_deployed_resources_total(controller: &str) {
    DEPLOYED_RESOURCES_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_gc_deleted_resources_total(controller: &str) {
    GC_DELETED_RESOURCES_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        increment_reconciliations("test");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_deployed_resources_total() {
        let before = DEPLOYED_RESOURCES_TOTAL.with_label_values(&["test"]).get();
        increment_deployed_resources_total("test");
        let after = DEPLOYED_RESOURCES_TOTAL.with_label_values(&["test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get();
        increment_requeues_total("error-backoff");
        let after = REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_action_duration() {
        observe_action_duration("test", "deploy", 0.02);
        // Just verify it doesn't panic
    }
}
