//! Shared fixtures for the integration tests

#![allow(dead_code, reason = "each test crate uses a different subset")]

use dsc_operator::client::ClusterClient;
use dsc_operator::controller::conditions::Manager;
use dsc_operator::controller::types::{ControllerMeta, ReconciliationRequest};
use dsc_operator::crd::{Dashboard, DashboardSpec, Release};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::sync::Arc;

pub const CONTROLLER: &str = "dashboard";
pub const APPLICATIONS_NAMESPACE: &str = "opendatahub";

pub fn release() -> Release {
    Release {
        name: "OpenDataHub".to_string(),
        version: "1.0.0".to_string(),
    }
}

pub fn config_map_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "ConfigMap")
}

pub fn deployment_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("apps", "v1", "Deployment")
}

/// A Dashboard as the API server would return it
pub fn dashboard(uid: &str, generation: i64) -> Dashboard {
    let mut dashboard = Dashboard::new("default-dashboard", DashboardSpec::default());
    dashboard.metadata.uid = Some(uid.to_string());
    dashboard.metadata.generation = Some(generation);
    dashboard
}

pub fn request(
    client: Arc<dyn ClusterClient>,
    instance: Dashboard,
    owned: Vec<GroupVersionKind>,
    dependents: &[&str],
) -> ReconciliationRequest<Dashboard> {
    let meta = Arc::new(ControllerMeta {
        name: CONTROLLER.to_string(),
        owned,
        field_manager: format!("dsc-operator-{CONTROLLER}"),
    });
    ReconciliationRequest::new(
        client,
        meta,
        Manager::new(instance, "Ready", dependents),
        release(),
        APPLICATIONS_NAMESPACE,
    )
}

pub fn object(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str, data: Value) -> DynamicObject {
    dsc_operator::resources::new_object(gvk, namespace, name).data(data)
}
