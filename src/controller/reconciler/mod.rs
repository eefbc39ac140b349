//! # Reconciler
//!
//! The generic reconciler that drives one component kind.
//!
//! A controller is declared as a [`ControllerSpec`]: its condition graph, the
//! kinds it owns and watches, and the ordered actions and finalizer actions
//! to run. [`Reconciler::reconcile`] then performs one reconciliation pass:
//!
//! 1. A deleted instance runs its finalizer actions and drops the platform
//!    finalizer.
//! 2. A live instance gets the finalizer if the controller has finalizer
//!    actions, then runs every action in order. The first failure stops the
//!    pipeline and is recorded on `ProvisioningSucceeded`.
//! 3. Happiness is recomputed, conditions sorted, and the phase and
//!    `observedGeneration` derived from the result are written back to the
//!    status subresource.
//!
//! A failed status write and a failed action each publish a Warning event
//! on the instance (`ReconcileError` and `ProvisioningError`).

mod finalizer;
mod status;

use crate::client::{ClientError, ClusterClient};
use crate::config::OperatorConfig;
use crate::constants::{
    CONDITION_TYPE_PROVISIONING_SUCCEEDED, CONDITION_TYPE_READY, EVENT_ACTION_RECONCILE,
    EVENT_REASON_PROVISIONING_ERROR, EVENT_REASON_RECONCILE_ERROR, PHASE_NOT_READY, PHASE_READY,
};
use crate::controller::actions::{Action, ActionError};
use crate::controller::conditions::{with_error, with_observed_generation, Manager};
use crate::controller::types::{ControllerMeta, ReconciliationRequest};
use crate::crd::{PlatformObject, Release};
use crate::observability;
use kube::core::GroupVersionKind;
use kube::Resource;
use kube_runtime::events::{Event, EventType};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Errors surfaced to the watch loop; all of them are requeued
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] ActionError),

    #[error("failed to update status: {0}")]
    Status(#[source] ClientError),

    #[error("failed to update finalizer: {0}")]
    Finalizer(#[source] ClientError),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl From<ActionError> for ReconcileError {
    fn from(error: ActionError) -> Self {
        match error {
            ActionError::Cancelled => Self::Cancelled,
            other => Self::Provisioning(other),
        }
    }
}

/// Declarative description of a component controller
pub struct ControllerSpec<K: PlatformObject> {
    /// Lowercase component name; labels metrics and deployed objects
    pub name: String,
    /// Top-level condition type, `Ready` by default
    pub happy: String,
    /// Conditions feeding the happy condition, in display order;
    /// `ProvisioningSucceeded` is always added first
    pub dependents: Vec<String>,
    /// Kinds the controller creates and owns
    pub owned: Vec<GroupVersionKind>,
    /// Extra kinds whose changes trigger a reconcile of the instance
    pub watched: Vec<GroupVersionKind>,
    pub actions: Vec<Box<dyn Action<K>>>,
    /// Run on deletion; presence of any adds the platform finalizer
    pub finalizers: Vec<Box<dyn Action<K>>>,
}

impl<K: PlatformObject> ControllerSpec<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            happy: CONDITION_TYPE_READY.to_string(),
            dependents: Vec::new(),
            owned: Vec::new(),
            watched: Vec::new(),
            actions: Vec::new(),
            finalizers: Vec::new(),
        }
    }

    /// Reject specs whose condition graph cannot be evaluated
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.name.is_empty(), "controller name must not be empty");
        anyhow::ensure!(
            !self.dependents.iter().any(|d| *d == self.happy),
            "happy condition {} cannot depend on itself",
            self.happy
        );
        Ok(())
    }
}

impl<K: PlatformObject> fmt::Debug for ControllerSpec<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |actions: &[Box<dyn Action<K>>]| -> Vec<String> {
            actions.iter().map(|a| a.name().to_string()).collect()
        };
        f.debug_struct("ControllerSpec")
            .field("name", &self.name)
            .field("happy", &self.happy)
            .field("dependents", &self.dependents)
            .field("owned", &self.owned)
            .field("watched", &self.watched)
            .field("actions", &names(&self.actions))
            .field("finalizers", &names(&self.finalizers))
            .finish()
    }
}

/// Per-resource error count driving requeue backoff
#[derive(Debug, Clone, Copy, Default)]
pub struct BackoffState {
    pub error_count: u32,
}

pub struct Reconciler<K: PlatformObject> {
    spec: ControllerSpec<K>,
    meta: Arc<ControllerMeta>,
    client: Arc<dyn ClusterClient>,
    release: Release,
    applications_namespace: String,
    shutdown: CancellationToken,
    requeue_min: Duration,
    requeue_max: Duration,
    pub(crate) backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl<K: PlatformObject> fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("spec", &self.spec)
            .field("release", &self.release)
            .field("applications_namespace", &self.applications_namespace)
            .finish_non_exhaustive()
    }
}

impl<K: PlatformObject> Reconciler<K> {
    pub fn new(
        spec: ControllerSpec<K>,
        client: Arc<dyn ClusterClient>,
        config: &OperatorConfig,
    ) -> Self {
        let meta = Arc::new(ControllerMeta {
            name: spec.name.clone(),
            owned: spec.owned.clone(),
            field_manager: format!("{}-{}", config.field_manager, spec.name),
        });
        Self {
            spec,
            meta,
            client,
            release: config.release(),
            applications_namespace: config.applications_namespace.clone(),
            shutdown: CancellationToken::new(),
            requeue_min: Duration::from_secs(config.error_requeue_min_secs),
            requeue_max: Duration::from_secs(config.error_requeue_max_secs),
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Cancelling `token` aborts every in-flight pass
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ControllerSpec<K> {
        &self.spec
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }

    /// Run one reconciliation pass for `instance`
    pub async fn reconcile(&self, instance: &K) -> Result<(), ReconcileError> {
        self.reconcile_with(instance, self.shutdown.child_token())
            .await
    }

    /// Run one pass that aborts when `cancel` fires
    pub async fn reconcile_with(
        &self,
        instance: &K,
        cancel: CancellationToken,
    ) -> Result<(), ReconcileError> {
        let meta = instance.meta();
        let span = info_span!(
            "reconcile",
            controller = %self.spec.name,
            resource.name = meta.name.as_deref().unwrap_or_default(),
            resource.namespace = meta.namespace.as_deref().unwrap_or_default(),
        );

        let start = Instant::now();
        observability::metrics::increment_reconciliations(&self.spec.name);

        let result = self.run_pass(instance.clone(), cancel).instrument(span).await;

        observability::metrics::observe_reconciliation_duration(
            &self.spec.name,
            start.elapsed().as_secs_f64(),
        );
        if result.is_err() {
            observability::metrics::increment_reconciliation_errors(&self.spec.name);
        }
        result
    }

    async fn run_pass(&self, instance: K, cancel: CancellationToken) -> Result<(), ReconcileError> {
        info!("reconcile");

        if instance.meta().deletion_timestamp.is_some() {
            if !finalizer::has_finalizer(&instance) {
                return Ok(());
            }
            self.delete(instance.clone(), cancel).await?;
            finalizer::remove_finalizer(self.client.as_ref(), instance).await?;
            return Ok(());
        }

        let instance = if self.spec.finalizers.is_empty() {
            instance
        } else {
            finalizer::add_finalizer(self.client.as_ref(), instance).await?
        };

        self.apply(instance, cancel).await
    }

    fn request(&self, instance: K, cancel: CancellationToken) -> ReconciliationRequest<K> {
        let mut dependents = vec![CONDITION_TYPE_PROVISIONING_SUCCEEDED];
        dependents.extend(self.spec.dependents.iter().map(String::as_str));

        let conditions = Manager::new(instance, self.spec.happy.clone(), &dependents);
        ReconciliationRequest::new(
            Arc::clone(&self.client),
            Arc::clone(&self.meta),
            conditions,
            self.release.clone(),
            self.applications_namespace.clone(),
        )
        .with_cancellation(cancel)
    }

    async fn delete(&self, instance: K, cancel: CancellationToken) -> Result<(), ReconcileError> {
        info!("delete");
        let mut rr = self.request(instance, cancel);

        match self.run_actions(&self.spec.finalizers, &mut rr).await {
            Err(e) if e.is_stop() => {
                debug!("detected stop marker");
                Ok(())
            }
            other => other.map_err(ReconcileError::from),
        }
    }

    async fn apply(&self, instance: K, cancel: CancellationToken) -> Result<(), ReconcileError> {
        info!("apply");
        let original = instance.status().cloned();
        let generation = instance.meta().generation.unwrap_or_default();

        let mut rr = self.request(instance, cancel.clone());
        rr.conditions_mut().reset();

        let provision = self.run_actions(&self.spec.actions, &mut rr).await;

        let conditions = rr.conditions_mut();
        match &provision {
            Err(e) => conditions.mark_false(
                CONDITION_TYPE_PROVISIONING_SUCCEEDED,
                &[with_error(e), with_observed_generation(generation)],
            ),
            Ok(()) => conditions.mark_true(
                CONDITION_TYPE_PROVISIONING_SUCCEEDED,
                &[with_observed_generation(generation)],
            ),
        }

        conditions.recompute_happiness("");
        conditions.sort();
        let happy = conditions.is_happy();

        let status = rr.instance_mut().status_mut();
        status.phase = Some(if happy { PHASE_READY } else { PHASE_NOT_READY }.to_string());
        status.release = Some(self.release.clone());
        if happy {
            status.observed_generation = Some(generation);
        }

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let instance = rr.into_instance();
        if let Err(e) = status::write_status(
            self.client.as_ref(),
            &self.meta.field_manager,
            &instance,
            original.as_ref(),
        )
        .await
        {
            self.publish_warning(&instance, EVENT_REASON_RECONCILE_ERROR, &e)
                .await;
            return Err(e);
        }

        match provision {
            Err(ActionError::Cancelled) => Err(ReconcileError::Cancelled),
            Err(e) => {
                self.publish_warning(&instance, EVENT_REASON_PROVISIONING_ERROR, &e)
                    .await;
                Err(ReconcileError::Provisioning(e))
            }
            Ok(()) => Ok(()),
        }
    }

    /// Publish a Warning event on `instance`; a failure to publish is only
    /// logged
    async fn publish_warning(&self, instance: &K, reason: &str, error: &(dyn std::error::Error + Sync)) {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(error.to_string()),
            action: EVENT_ACTION_RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = self
            .client
            .publish_event(&instance.object_ref(&()), &event)
            .await
        {
            warn!(reason, "Failed to publish event: {}", e);
        }
    }

    /// Run `actions` in order, stopping at the first error or cancellation
    async fn run_actions(
        &self,
        actions: &[Box<dyn Action<K>>],
        rr: &mut ReconciliationRequest<K>,
    ) -> Result<(), ActionError> {
        for action in actions {
            let cancel = rr.cancel.clone();
            if cancel.is_cancelled() {
                return Err(ActionError::Cancelled);
            }

            let name = action.name().to_string();
            debug!(action = %name, "executing action");
            let start = Instant::now();

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ActionError::Cancelled),
                result = action.run(rr).instrument(info_span!("action", action = %name)) => result,
            };

            observability::metrics::observe_action_duration(
                &self.spec.name,
                &name,
                start.elapsed().as_secs_f64(),
            );
            result?;
        }
        Ok(())
    }

    /// Requeue delay for the `error_count`-th consecutive failure of a resource
    pub fn backoff_delay(&self, error_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(error_count.saturating_sub(1));
        self.requeue_min
            .saturating_mul(factor)
            .min(self.requeue_max)
    }

    /// Forget the failure history of a resource after a clean pass
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

/// `namespace/name` of an instance, the backoff state key
pub fn resource_key<K: Resource>(instance: &K) -> String {
    let meta = instance.meta();
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}
