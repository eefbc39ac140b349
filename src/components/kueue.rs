//! # Kueue
//!
//! Deploys the Kueue manifests and monitors the external Kueue operator.
//!
//! When the component is `Unmanaged` the workload controller belongs to the
//! external operator, so `DeploymentsAvailable` is reported as informational
//! only.

use super::{common_owned_kinds, Component};
use crate::config::OperatorConfig;
use crate::constants::{
    CONDITION_TYPE_DEPENDENCIES_AVAILABLE, CONDITION_TYPE_DEPLOYMENTS_AVAILABLE, LABEL_PART_OF,
    REASON_MANAGEMENT_STATE_UNMANAGED,
};
use crate::controller::actions::dependency::{self, DependencyAction};
use crate::controller::actions::deploy::DeployAction;
use crate::controller::actions::deployments::DeploymentsAvailableAction;
use crate::controller::actions::devflags::{DevFlagsAction, InitializeAction};
use crate::controller::actions::gc::GcAction;
use crate::controller::actions::render::RenderAction;
use crate::controller::actions::{action_fn, ActionError};
use crate::controller::conditions::{with_message, with_reason, with_severity};
use crate::controller::reconciler::ControllerSpec;
use crate::controller::types::ReconciliationRequest;
use crate::crd::{
    ConditionSeverity, Kueue, KueueSpec, ManagementState, KUEUE_COMPONENT_NAME,
    KUEUE_INSTANCE_NAME,
};
use kube::core::GroupVersionKind;

/// Name of the external Kueue operator's singleton resource
pub const KUEUE_OPERATOR_CR_NAME: &str = "cluster";

/// Kind of the external Kueue operator's resource
pub fn kueue_operator_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("kueue.openshift.io", "v1", "Kueue")
}

fn check_unmanaged(rr: &mut ReconciliationRequest<Kueue>) -> Result<(), ActionError> {
    if rr.instance().spec.management_state != ManagementState::Unmanaged {
        return Ok(());
    }
    rr.conditions_mut().mark_false(
        CONDITION_TYPE_DEPLOYMENTS_AVAILABLE,
        &[
            with_reason(REASON_MANAGEMENT_STATE_UNMANAGED),
            with_message("Kueue workloads are managed by the external Kueue operator"),
            with_severity(ConditionSeverity::Info),
        ],
    );
    Ok(())
}

pub fn controller(config: &OperatorConfig) -> ControllerSpec<Kueue> {
    let mut spec = ControllerSpec::new(KUEUE_COMPONENT_NAME);
    spec.dependents = vec![
        CONDITION_TYPE_DEPLOYMENTS_AVAILABLE.to_string(),
        CONDITION_TYPE_DEPENDENCIES_AVAILABLE.to_string(),
    ];
    spec.owned = common_owned_kinds();
    spec.owned.extend([
        GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole"),
        GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding"),
        GroupVersionKind::gvk("networking.k8s.io", "v1", "NetworkPolicy"),
    ]);
    spec.watched = vec![kueue_operator_gvk()];
    spec.actions = vec![
        Box::new(
            DependencyAction::new().monitor_operator(
                dependency::OperatorConfig::new(kueue_operator_gvk())
                    .name(KUEUE_OPERATOR_CR_NAME)
                    .severity(ConditionSeverity::Error),
            ),
        ),
        Box::new(InitializeAction::new(KUEUE_COMPONENT_NAME)),
        Box::new(DevFlagsAction::new()),
        Box::new(
            RenderAction::new()
                .with_label(LABEL_PART_OF, KUEUE_COMPONENT_NAME)
                .in_applications_namespace()
                .with_cache(),
        ),
        Box::new(DeployAction::new().with_cache(config.deploy_cache_ttl())),
        Box::new(DeploymentsAvailableAction::new()),
        Box::new(action_fn("unmanaged", check_unmanaged)),
        Box::new(GcAction::new()),
    ];
    spec
}

pub fn component() -> Component<Kueue> {
    Component::new(
        KUEUE_COMPONENT_NAME,
        KUEUE_INSTANCE_NAME,
        |name| Kueue::new(name, KueueSpec::default()),
        controller,
    )
}
