//! # Custom Resource Definitions
//!
//! CRD types for the platform components reconciled by the operator.
//!
//! Every component resource is a cluster-scoped singleton carrying the shared
//! [`ComponentStatus`]. The [`PlatformObject`] trait is what the generic
//! reconciler and the stock actions are written against.

mod dashboard;
mod kueue;
mod status;

pub use dashboard::*;
pub use kueue::*;
pub use status::*;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// API group shared by every component CRD
pub const COMPONENTS_GROUP: &str = "components.platform.opendatahub.io";
pub const COMPONENTS_VERSION: &str = "v1alpha1";

/// A component resource the reconciler can drive
pub trait PlatformObject:
    kube::Resource<DynamicType = ()>
    + ConditionsAccessor
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn status(&self) -> Option<&ComponentStatus>;

    /// Status, created empty when missing
    fn status_mut(&mut self) -> &mut ComponentStatus;

    fn dev_flags(&self) -> Option<&DevFlags>;
}

/// Development overrides for component manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevFlags {
    /// Manifest locations replacing the bundled ones
    #[serde(default)]
    pub manifests: Vec<ManifestConfig>,
}

/// One manifest override
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    /// Location of the manifests. Only local paths (`file://` or absolute)
    /// are supported.
    pub uri: String,
    /// Directory inside the location holding the component manifests
    #[serde(default)]
    pub context_dir: String,
    /// Sub path inside the context directory
    #[serde(default)]
    pub source_path: String,
}

/// Whether the operator manages a component's resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
    Removed,
}

/// Implements [`ConditionsAccessor`] and [`PlatformObject`] for a component
/// CRD whose status is `Option<ComponentStatus>` and whose spec carries
/// `dev_flags`
macro_rules! platform_object {
    ($kind:ty) => {
        impl $crate::crd::ConditionsAccessor for $kind {
            fn conditions(&self) -> &[$crate::crd::Condition] {
                self.status
                    .as_ref()
                    .map_or(&[], |status| status.conditions.as_slice())
            }

            fn set_conditions(&mut self, conditions: Vec<$crate::crd::Condition>) {
                self.status
                    .get_or_insert_with($crate::crd::ComponentStatus::default)
                    .conditions = conditions;
            }
        }

        impl $crate::crd::PlatformObject for $kind {
            fn status(&self) -> Option<&$crate::crd::ComponentStatus> {
                self.status.as_ref()
            }

            fn status_mut(&mut self) -> &mut $crate::crd::ComponentStatus {
                self.status
                    .get_or_insert_with($crate::crd::ComponentStatus::default)
            }

            fn dev_flags(&self) -> Option<&$crate::crd::DevFlags> {
                self.spec.dev_flags.as_ref()
            }
        }
    };
}

pub(crate) use platform_object;
