//! # Dashboard
//!
//! Deploys the Dashboard manifests and reports whether its Deployments are
//! ready.

use super::{common_owned_kinds, Component};
use crate::config::OperatorConfig;
use crate::constants::{CONDITION_TYPE_DEPLOYMENTS_AVAILABLE, LABEL_PART_OF};
use crate::controller::actions::deploy::DeployAction;
use crate::controller::actions::deployments::DeploymentsAvailableAction;
use crate::controller::actions::devflags::{DevFlagsAction, InitializeAction};
use crate::controller::actions::gc::GcAction;
use crate::controller::actions::render::RenderAction;
use crate::controller::reconciler::ControllerSpec;
use crate::crd::{Dashboard, DashboardSpec, DASHBOARD_COMPONENT_NAME, DASHBOARD_INSTANCE_NAME};

pub fn controller(config: &OperatorConfig) -> ControllerSpec<Dashboard> {
    let mut spec = ControllerSpec::new(DASHBOARD_COMPONENT_NAME);
    spec.dependents = vec![CONDITION_TYPE_DEPLOYMENTS_AVAILABLE.to_string()];
    spec.owned = common_owned_kinds();
    spec.actions = vec![
        Box::new(InitializeAction::new(DASHBOARD_COMPONENT_NAME)),
        Box::new(DevFlagsAction::new()),
        Box::new(
            RenderAction::new()
                .with_label(LABEL_PART_OF, DASHBOARD_COMPONENT_NAME)
                .in_applications_namespace()
                .with_cache(),
        ),
        Box::new(DeployAction::new().with_cache(config.deploy_cache_ttl())),
        Box::new(DeploymentsAvailableAction::new()),
        Box::new(GcAction::new()),
    ];
    spec
}

pub fn component() -> Component<Dashboard> {
    Component::new(
        DASHBOARD_COMPONENT_NAME,
        DASHBOARD_INSTANCE_NAME,
        |name| Dashboard::new(name, DashboardSpec::default()),
        controller,
    )
}
