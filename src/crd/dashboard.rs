//! # Dashboard
//!
//! The Dashboard component resource.

use super::{ComponentStatus, DevFlags};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DASHBOARD_COMPONENT_NAME: &str = "dashboard";
/// Name of the Dashboard singleton
pub const DASHBOARD_INSTANCE_NAME: &str = "default-dashboard";

/// Dashboard Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: components.platform.opendatahub.io/v1alpha1
/// kind: Dashboard
/// metadata:
///   name: default-dashboard
/// spec: {}
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Dashboard",
    group = "components.platform.opendatahub.io",
    version = "v1alpha1",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_flags: Option<DevFlags>,
}

crate::crd::platform_object!(Dashboard);
