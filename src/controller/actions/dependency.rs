//! # Dependency Monitoring
//!
//! Surfaces the health of external operators a component depends on.
//!
//! For every configured operator the action fetches its custom resource,
//! runs each of its `.status.conditions` through a degraded filter, and folds
//! every degraded condition across all operators into a single
//! `DependenciesAvailable` condition. An operator that is not installed, or
//! whose resource cannot be read or parsed, counts as healthy: monitoring
//! never fails the reconcile.

use super::{Action, ActionError};
use crate::client::{ClientError, ListOptions, ObjectKey};
use crate::constants::{CONDITION_TYPE_DEPENDENCIES_AVAILABLE, REASON_DEPENDENCY_DEGRADED};
use crate::controller::conditions::{with_message, with_reason, with_severity};
use crate::controller::types::ReconciliationRequest;
use crate::crd::{ConditionSeverity, PlatformObject};
use crate::resources::gvk_string;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const DEGRADED_CONDITION_TYPE: &str = "Degraded";
const AVAILABLE_CONDITION_TYPE: &str = "Available";
const READY_CONDITION_TYPE: &str = "Ready";

/// Returns true when `(type, status)` describes a degraded state
pub type DegradedConditionFilter = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// `Degraded=True`, or `Available`/`Ready` `=False`
pub fn default_degraded_condition_filter(condition_type: &str, status: &str) -> bool {
    match condition_type {
        DEGRADED_CONDITION_TYPE => status == "True",
        AVAILABLE_CONDITION_TYPE | READY_CONDITION_TYPE => status == "False",
        _ => false,
    }
}

/// One monitored operator
#[derive(Clone)]
pub struct OperatorConfig {
    /// Kind of the operator's custom resource
    pub operator_gvk: GroupVersionKind,
    /// Name of the resource; when unset the first listed one is used
    pub cr_name: Option<String>,
    /// Namespace of the resource; unset for cluster scoped kinds
    pub cr_namespace: Option<String>,
    /// Degraded filter, [`default_degraded_condition_filter`] when unset
    pub filter: Option<DegradedConditionFilter>,
    /// `Error` makes degradation block readiness, `Info` only reports it
    pub severity: ConditionSeverity,
}

impl OperatorConfig {
    pub fn new(operator_gvk: GroupVersionKind) -> Self {
        Self {
            operator_gvk,
            cr_name: None,
            cr_namespace: None,
            filter: None,
            severity: ConditionSeverity::Error,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.cr_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cr_namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: ConditionSeverity) -> Self {
        self.severity = severity;
        self
    }

    fn is_degraded(&self, condition_type: &str, status: &str) -> bool {
        match &self.filter {
            Some(filter) => filter(condition_type, status),
            None => default_degraded_condition_filter(condition_type, status),
        }
    }
}

impl fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("operator_gvk", &self.operator_gvk)
            .field("cr_name", &self.cr_name)
            .field("cr_namespace", &self.cr_namespace)
            .field("custom_filter", &self.filter.is_some())
            .field("severity", &self.severity)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct DependencyAction {
    configs: Vec<OperatorConfig>,
}

impl DependencyAction {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn monitor_operator(mut self, config: OperatorConfig) -> Self {
        self.configs.push(config);
        self
    }

    async fn fetch<K: PlatformObject>(
        rr: &ReconciliationRequest<K>,
        config: &OperatorConfig,
    ) -> Result<DynamicObject, ClientError> {
        let gvk = &config.operator_gvk;
        if let Some(name) = &config.cr_name {
            let key = ObjectKey::new(config.cr_namespace.as_deref(), name.clone());
            return rr.client.get(gvk, &key).await;
        }

        // Two is enough to tell whether the choice below is arbitrary
        let mut opts = ListOptions::default().limit(2);
        if let Some(namespace) = &config.cr_namespace {
            opts = opts.in_namespace(namespace.clone());
        }

        let mut items = rr.client.list(gvk, &opts).await?;
        if items.len() > 1 {
            warn!(
                gvk = %gvk_string(gvk),
                namespace = config.cr_namespace.as_deref().unwrap_or_default(),
                "dependency monitoring found multiple resources; using the first one returned"
            );
        }
        if items.is_empty() {
            return Err(ClientError::not_found(gvk, ""));
        }
        Ok(items.swap_remove(0))
    }

    async fn collect_degraded<K: PlatformObject>(
        rr: &ReconciliationRequest<K>,
        config: &OperatorConfig,
    ) -> Vec<String> {
        let external = match Self::fetch(rr, config).await {
            Ok(external) => external,
            Err(e) if e.is_not_found() || e.is_no_match() => return Vec::new(),
            Err(e) => {
                debug!(
                    gvk = %gvk_string(&config.operator_gvk),
                    error = %e,
                    "failed to get operator resource for dependency monitoring"
                );
                return Vec::new();
            }
        };

        let conditions = match external.data.get("status").and_then(|s| s.get("conditions")) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(conditions)) => conditions,
            Some(other) => {
                debug!(
                    gvk = %gvk_string(&config.operator_gvk),
                    found = %other,
                    "failed to parse conditions from operator resource"
                );
                return Vec::new();
            }
        };

        let name = external.metadata.name.as_deref().unwrap_or_default();
        let identifier = match config.cr_namespace.as_deref() {
            Some(namespace) if !name.is_empty() => format!("{namespace}/{name}"),
            _ => name.to_string(),
        };
        let prefix = if identifier.is_empty() {
            config.operator_gvk.kind.clone()
        } else {
            format!("{} {identifier}", config.operator_gvk.kind)
        };

        conditions
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|condition| {
                let field = |key: &str| condition.get(key).and_then(Value::as_str).unwrap_or_default();
                let (condition_type, status) = (field("type"), field("status"));
                if !config.is_degraded(condition_type, status) {
                    return None;
                }

                let mut detail = format!("{prefix}: {condition_type}={status}");
                let reason = field("reason");
                if !reason.is_empty() {
                    detail.push_str(&format!(" ({reason})"));
                }
                let message = field("message");
                if !message.is_empty() {
                    detail.push_str(&format!(": {message}"));
                }
                Some(detail)
            })
            .collect()
    }
}

#[async_trait]
impl<K: PlatformObject> Action<K> for DependencyAction {
    fn name(&self) -> &str {
        "dependency"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        let mut degraded = Vec::new();
        let mut error_severity = false;

        for config in &self.configs {
            let found = Self::collect_degraded(rr, config).await;
            if !found.is_empty() {
                degraded.extend(found);
                error_severity |= config.severity.is_error();
            }
        }

        let conditions = rr.conditions_mut();
        if degraded.is_empty() {
            conditions.mark_true(CONDITION_TYPE_DEPENDENCIES_AVAILABLE, &[]);
        } else {
            let severity = if error_severity {
                ConditionSeverity::Error
            } else {
                ConditionSeverity::Info
            };
            conditions.mark_false(
                CONDITION_TYPE_DEPENDENCIES_AVAILABLE,
                &[
                    with_severity(severity),
                    with_reason(REASON_DEPENDENCY_DEGRADED),
                    with_message(format_args!("Dependencies degraded: {}", degraded.join("; "))),
                ],
            );
        }
        Ok(())
    }
}
