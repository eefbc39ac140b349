//! # Components
//!
//! Per-component controller wiring. Each component module declares its
//! [`ControllerSpec`]; [`Component`] adapts it to the registry.

pub mod dashboard;
pub mod kueue;

use crate::client::ClientError;
use crate::config::OperatorConfig;
use crate::controller::reconciler::{ControllerSpec, Reconciler};
use crate::controller::registry::{ComponentContext, ComponentHandler, ComponentRegistry};
use crate::crd::PlatformObject;
use crate::resources::to_dynamic;
use crate::runtime::watch_loop::run_controller;
use futures::future::BoxFuture;
use futures::FutureExt;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use std::fmt;
use std::sync::Arc;

/// Builds the controller of a component from the operator configuration
pub type SpecBuilder<K> = fn(&OperatorConfig) -> ControllerSpec<K>;

/// A component driven by the generic reconciler
pub struct Component<K: PlatformObject> {
    name: &'static str,
    instance_name: &'static str,
    instance: fn(&str) -> K,
    build: SpecBuilder<K>,
}

impl<K: PlatformObject> Component<K> {
    pub fn new(
        name: &'static str,
        instance_name: &'static str,
        instance: fn(&str) -> K,
        build: SpecBuilder<K>,
    ) -> Self {
        Self {
            name,
            instance_name,
            instance,
            build,
        }
    }

    pub fn spec(&self, config: &OperatorConfig) -> ControllerSpec<K> {
        (self.build)(config)
    }
}

impl<K: PlatformObject> fmt::Debug for Component<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("instance_name", &self.instance_name)
            .finish_non_exhaustive()
    }
}

impl<K: PlatformObject> ComponentHandler for Component<K> {
    fn name(&self) -> &str {
        self.name
    }

    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
    }

    fn default_instance(&self) -> Result<DynamicObject, ClientError> {
        to_dynamic(&(self.instance)(self.instance_name))
    }

    fn controller(
        &self,
        ctx: ComponentContext,
    ) -> anyhow::Result<BoxFuture<'static, anyhow::Result<()>>> {
        let spec = self.spec(&ctx.config);
        spec.validate()?;
        let reconciler = Reconciler::new(spec, Arc::clone(&ctx.cluster), &ctx.config)
            .with_shutdown(ctx.shutdown.clone());
        Ok(run_controller(ctx.kube, Arc::new(reconciler), self.instance_name, ctx.shutdown).boxed())
    }
}

/// Kinds every component deploys and owns
pub(crate) fn common_owned_kinds() -> Vec<GroupVersionKind> {
    vec![
        GroupVersionKind::gvk("", "v1", "ConfigMap"),
        GroupVersionKind::gvk("", "v1", "Secret"),
        GroupVersionKind::gvk("", "v1", "Service"),
        GroupVersionKind::gvk("", "v1", "ServiceAccount"),
        GroupVersionKind::gvk("apps", "v1", "Deployment"),
        GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "Role"),
        GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "RoleBinding"),
    ]
}

/// Every component the operator knows about
pub fn registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with(dashboard::component())
        .with(kueue::component())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_every_component() {
        assert_eq!(registry().names(), vec!["dashboard", "kueue"]);
    }

    #[test]
    fn default_instances_are_cluster_scoped_singletons() {
        let registry = registry();
        let dashboard = registry.get("dashboard").unwrap();
        let obj = dashboard.default_instance().unwrap();

        assert_eq!(obj.metadata.name.as_deref(), Some("default-dashboard"));
        assert_eq!(obj.metadata.namespace, None);
        assert_eq!(
            obj.types.as_ref().unwrap().api_version,
            "components.platform.opendatahub.io/v1alpha1"
        );
        assert_eq!(dashboard.gvk().kind, "Dashboard");
    }
}
