//! # Kueue
//!
//! The Kueue component resource. Unlike the Dashboard it can be left
//! `Unmanaged`, in which case the operator still deploys its own bits but
//! the workload controller is owned by the external Kueue operator.

use super::{ComponentStatus, DevFlags, ManagementState};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const KUEUE_COMPONENT_NAME: &str = "kueue";
/// Name of the Kueue singleton
pub const KUEUE_INSTANCE_NAME: &str = "default-kueue";

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Kueue",
    group = "components.platform.opendatahub.io",
    version = "v1alpha1",
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KueueSpec {
    #[serde(default)]
    pub management_state: ManagementState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_flags: Option<DevFlags>,
}

crate::crd::platform_object!(Kueue);
