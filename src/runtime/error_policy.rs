//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{resource_key, ReconcileError, Reconciler};
use crate::crd::PlatformObject;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Handle reconciliation errors with exponential backoff
///
/// Every error is requeued. The delay grows with the number of consecutive
/// failures of the resource and is reset by the next clean pass.
pub fn handle_reconciliation_error<K: PlatformObject>(
    obj: Arc<K>,
    error: &ReconcileError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let key = resource_key(obj.as_ref());

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        controller = %ctx.name(),
        resource = %key,
        error = %error
    );
    let _error_guard = error_span.enter();

    if matches!(error, ReconcileError::Cancelled) {
        warn!("Reconciliation of {} cancelled", key);
    } else {
        error!("Reconciliation error for {}: {:?}", key, error);
    }

    let error_count = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key).or_default();
            state.error_count = state.error_count.saturating_add(1);
            state.error_count
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
            1
        }
    };

    let delay = ctx.backoff_delay(error_count);
    info!(
        "Retrying in {}s (error count: {}, trigger source: error-backoff)",
        delay.as_secs(),
        error_count
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Classification of a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401, RBAC revoked or token expired
    Unauthorized,
    /// 410, resource version too old
    Expired,
    /// 429, API server storage reinitializing
    Throttled,
    /// The object was deleted between event and reconcile
    NotFound,
    Other,
}

/// Classify a watch or controller stream error from its message
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a controller stream error according to its classification
///
/// The kube-runtime watcher retries on its own; this only reports.
pub fn handle_watch_stream_error(controller: &str, error_string: &str) -> WatchErrorKind {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        controller = controller,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let kind = classify_watch_error(error_string);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized), RBAC may have been revoked or token expired");
            error!("Verify the operator ClusterRole and ClusterRoleBinding still exist and grant access to {} resources", controller);
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "watch.error.resource_version_expired");
        }
        WatchErrorKind::Throttled => {
            warn!("API server storage reinitializing (429), the watcher will back off");
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
        }
    }
    kind
}
