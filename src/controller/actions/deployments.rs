//! # Deployments Available
//!
//! Reports whether the Deployments a component runs are ready.

use super::{Action, ActionError};
use crate::client::ListOptions;
use crate::constants::{
    CONDITION_TYPE_DEPLOYMENTS_AVAILABLE, LABEL_PART_OF, REASON_DEPLOYMENTS_NOT_READY,
};
use crate::controller::conditions::{with_message, with_reason};
use crate::controller::types::ReconciliationRequest;
use crate::crd::PlatformObject;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;

/// Marks `DeploymentsAvailable` from the Deployments labelled part of the
/// component in the applications namespace
#[derive(Debug, Default)]
pub struct DeploymentsAvailableAction {
    selector: Option<String>,
}

impl DeploymentsAvailableAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default `platform.opendatahub.io/part-of=<controller>`
    /// selector
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// A Deployment is ready when every replica it currently runs reports
/// ready; both counts come from its status and default to zero
fn is_ready(deployment: &DynamicObject) -> bool {
    let count = |field: &str| {
        deployment
            .data
            .pointer(&format!("/status/{field}"))
            .and_then(Value::as_i64)
            .unwrap_or_default()
    };
    count("readyReplicas") == count("replicas")
}

#[async_trait]
impl<K: PlatformObject> Action<K> for DeploymentsAvailableAction {
    fn name(&self) -> &str {
        "deployments-available"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        let selector = self
            .selector
            .clone()
            .unwrap_or_else(|| format!("{LABEL_PART_OF}={}", rr.controller.name));
        let opts = ListOptions::default()
            .in_namespace(rr.applications_namespace.clone())
            .labels(selector);

        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        let deployments = rr
            .client
            .list(&gvk, &opts)
            .await
            .map_err(|e| ActionError::client("failed to list deployments", e))?;

        let total = deployments.len();
        let ready = deployments.iter().filter(|d| is_ready(d)).count();

        let conditions = rr.conditions_mut();
        if total > 0 && ready == total {
            conditions.mark_true(CONDITION_TYPE_DEPLOYMENTS_AVAILABLE, &[]);
        } else {
            conditions.mark_false(
                CONDITION_TYPE_DEPLOYMENTS_AVAILABLE,
                &[
                    with_reason(REASON_DEPLOYMENTS_NOT_READY),
                    with_message(format_args!("{ready}/{total} deployments ready")),
                ],
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::new_object;
    use serde_json::json;

    fn deployment(data: Value) -> DynamicObject {
        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        new_object(&gvk, Some("ns"), "web").data(data)
    }

    #[test]
    fn readiness_compares_status_replicas() {
        assert!(is_ready(&deployment(json!({
            "spec": {"replicas": 2},
            "status": {"replicas": 2, "readyReplicas": 2}
        }))));
        assert!(!is_ready(&deployment(json!({
            "spec": {"replicas": 2},
            "status": {"replicas": 2, "readyReplicas": 1}
        }))));
        assert!(is_ready(&deployment(json!({"spec": {"replicas": 1}}))));
    }

    #[test]
    fn rollout_in_progress_uses_the_running_replicas() {
        // Scaled from 1 to 3 but the new pods are not created yet
        assert!(is_ready(&deployment(json!({
            "spec": {"replicas": 3},
            "status": {"replicas": 1, "readyReplicas": 1}
        }))));
        // A surge pod is running but not ready yet
        assert!(!is_ready(&deployment(json!({
            "spec": {"replicas": 1},
            "status": {"replicas": 2, "readyReplicas": 1}
        }))));
    }
}
