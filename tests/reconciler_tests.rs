//! Integration tests for the generic reconciler against the in-memory client

use dsc_operator::client::{ClusterClient, FakeClient, ObjectKey, RecordedEvent};
use dsc_operator::config::OperatorConfig;
use dsc_operator::constants::PLATFORM_FINALIZER;
use dsc_operator::controller::actions::{action_fn, ActionError};
use dsc_operator::controller::conditions::with_reason;
use dsc_operator::controller::reconciler::{ControllerSpec, ReconcileError, Reconciler};
use dsc_operator::controller::types::ReconciliationRequest;
use dsc_operator::crd::{
    Condition, ConditionStatus, Dashboard, DashboardSpec, COMPONENTS_GROUP, COMPONENTS_VERSION,
};
use dsc_operator::resources::{from_dynamic, to_dynamic};
use kube::core::GroupVersionKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const NAME: &str = "default-dashboard";

fn gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(COMPONENTS_GROUP, COMPONENTS_VERSION, "Dashboard")
}

fn key() -> ObjectKey {
    ObjectKey {
        namespace: None,
        name: NAME.to_string(),
    }
}

fn config() -> OperatorConfig {
    OperatorConfig {
        platform_type: "OpenDataHub".to_string(),
        platform_version: "2.0.0".to_string(),
        ..OperatorConfig::default()
    }
}

/// Client holding one Dashboard, plus the Dashboard as stored
async fn seeded() -> (Arc<FakeClient>, Dashboard) {
    let dashboard = Dashboard::new(NAME, DashboardSpec::default());
    let obj = to_dynamic(&dashboard).unwrap();
    let client = Arc::new(FakeClient::new().with_objects([obj]));
    let stored = fetch(&client).await;
    (client, stored)
}

async fn fetch(client: &FakeClient) -> Dashboard {
    let obj = client.get(&gvk(), &key()).await.unwrap();
    from_dynamic(&obj).unwrap()
}

fn condition(dashboard: &Dashboard, condition_type: &str) -> Condition {
    dashboard
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == condition_type))
        .cloned()
        .unwrap()
}

fn mark_ready(rr: &mut ReconciliationRequest<Dashboard>) -> Result<(), ActionError> {
    rr.conditions_mut().mark_true("DeploymentsAvailable", &[]);
    Ok(())
}

fn spec() -> ControllerSpec<Dashboard> {
    let mut spec = ControllerSpec::new("dashboard");
    spec.dependents = vec!["DeploymentsAvailable".to_string()];
    spec.actions.push(Box::new(action_fn("ready", mark_ready)));
    spec
}

#[tokio::test]
async fn test_successful_pass_writes_a_ready_status() {
    let (client, dashboard) = seeded().await;
    let reconciler = Reconciler::new(spec(), client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();

    let stored = fetch(&client).await;
    let status = stored.status.clone().unwrap();
    assert_eq!(status.phase.as_deref(), Some("Ready"));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.release.unwrap().version, "2.0.0");

    let types: Vec<&str> = status.conditions.iter().map(|c| c.r#type.as_str()).collect();
    assert_eq!(types, vec!["Ready", "ProvisioningSucceeded", "DeploymentsAvailable"]);
    assert_eq!(condition(&stored, "Ready").status, ConditionStatus::True);
    assert_eq!(condition(&stored, "ProvisioningSucceeded").observed_generation, 1);
    assert!(client.events().is_empty());
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let (client, dashboard) = seeded().await;
    let reconciler = Reconciler::new(spec(), client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();
    let first = fetch(&client).await;
    reconciler.reconcile(&first).await.unwrap();
    let second = fetch(&client).await;

    assert_eq!(
        first.metadata.resource_version,
        second.metadata.resource_version
    );
}

#[tokio::test]
async fn test_action_failure_is_recorded_and_returned() {
    let (client, dashboard) = seeded().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let after = calls.clone();

    let mut spec = spec();
    spec.actions.insert(
        0,
        Box::new(action_fn("broken", |_: &mut ReconciliationRequest<Dashboard>| {
            Err(ActionError::Config("manifests missing".to_string()))
        })),
    );
    spec.actions.push(Box::new(action_fn(
        "never",
        move |_: &mut ReconciliationRequest<Dashboard>| {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));
    let reconciler = Reconciler::new(spec, client.clone(), &config());

    let err = reconciler.reconcile(&dashboard).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Provisioning(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let stored = fetch(&client).await;
    let provisioning = condition(&stored, "ProvisioningSucceeded");
    assert_eq!(provisioning.status, ConditionStatus::False);
    assert_eq!(provisioning.reason, "Error");
    assert_eq!(
        provisioning.message,
        "invalid configuration: manifests missing"
    );

    let ready = condition(&stored, "Ready");
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "Error");

    let status = stored.status.unwrap();
    assert_eq!(status.phase.as_deref(), Some("Not Ready"));
    assert_eq!(status.observed_generation, None);

    assert_eq!(
        client.events(),
        vec![RecordedEvent {
            regarding: "Dashboard/default-dashboard".to_string(),
            event_type: "Warning".to_string(),
            reason: "ProvisioningError".to_string(),
            note: Some("invalid configuration: manifests missing".to_string()),
            action: "Reconcile".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_status_write_failure_publishes_an_event() {
    let dashboard = Dashboard::new(NAME, DashboardSpec::default());
    let client = Arc::new(
        FakeClient::new()
            .with_objects([to_dynamic(&dashboard).unwrap()])
            .failing_kind(gvk(), "etcdserver: request timed out"),
    );
    let reconciler = Reconciler::new(spec(), client.clone(), &config());

    let err = reconciler.reconcile(&dashboard).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Status(_)));

    let events = client.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "Warning");
    assert_eq!(events[0].reason, "ReconcileError");
    assert!(events[0]
        .note
        .as_deref()
        .is_some_and(|note| note.contains("etcdserver: request timed out")));
}

#[tokio::test]
async fn test_unhappy_dependent_keeps_the_instance_not_ready() {
    let (client, dashboard) = seeded().await;
    let mut spec = ControllerSpec::<Dashboard>::new("dashboard");
    spec.dependents = vec!["DeploymentsAvailable".to_string()];
    spec.actions.push(Box::new(action_fn(
        "not-ready",
        |rr: &mut ReconciliationRequest<Dashboard>| {
            rr.conditions_mut()
                .mark_false("DeploymentsAvailable", &[with_reason("DeploymentsNotReady")]);
            Ok(())
        },
    )));
    let reconciler = Reconciler::new(spec, client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();

    let stored = fetch(&client).await;
    assert_eq!(condition(&stored, "ProvisioningSucceeded").status, ConditionStatus::True);
    assert_eq!(condition(&stored, "Ready").reason, "DeploymentsNotReady");
    assert_eq!(stored.status.unwrap().phase.as_deref(), Some("Not Ready"));
}

#[tokio::test]
async fn test_finalizers_run_on_deletion() {
    let (client, dashboard) = seeded().await;
    let finalized = Arc::new(AtomicUsize::new(0));
    let counter = finalized.clone();

    let mut spec = spec();
    spec.finalizers.push(Box::new(action_fn(
        "cleanup",
        move |_: &mut ReconciliationRequest<Dashboard>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));
    let reconciler = Reconciler::new(spec, client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();
    let stored = fetch(&client).await;
    assert_eq!(
        stored.metadata.finalizers,
        Some(vec![PLATFORM_FINALIZER.to_string()])
    );
    assert_eq!(finalized.load(Ordering::SeqCst), 0);

    client.delete(&gvk(), &key()).await.unwrap();
    let deleting = fetch(&client).await;
    assert!(deleting.metadata.deletion_timestamp.is_some());

    reconciler.reconcile(&deleting).await.unwrap();
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert!(client.get(&gvk(), &key()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_stop_ends_the_finalizer_chain() {
    let (client, dashboard) = seeded().await;
    let later = Arc::new(AtomicUsize::new(0));
    let counter = later.clone();

    let mut spec = spec();
    spec.finalizers.push(Box::new(action_fn(
        "stop",
        |_: &mut ReconciliationRequest<Dashboard>| Err(ActionError::Stop),
    )));
    spec.finalizers.push(Box::new(action_fn(
        "after-stop",
        move |_: &mut ReconciliationRequest<Dashboard>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));
    let reconciler = Reconciler::new(spec, client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();
    client.delete(&gvk(), &key()).await.unwrap();
    reconciler.reconcile(&fetch(&client).await).await.unwrap();

    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert!(client.get(&gvk(), &key()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_deleted_instance_without_finalizer_is_ignored() {
    let (client, mut dashboard) = seeded().await;
    dashboard.metadata.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap());
    let reconciler = Reconciler::new(spec(), client.clone(), &config());

    reconciler.reconcile(&dashboard).await.unwrap();
    assert!(fetch(&client).await.status.is_none());
}

#[tokio::test]
async fn test_cancelled_pass_does_not_write_status() {
    let (client, dashboard) = seeded().await;
    let reconciler = Reconciler::new(spec(), client.clone(), &config());

    let token = CancellationToken::new();
    token.cancel();
    let err = reconciler.reconcile_with(&dashboard, token).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled));
    assert!(fetch(&client).await.status.is_none());
}

#[tokio::test]
async fn test_shutdown_cancels_passes() {
    let (client, dashboard) = seeded().await;
    let shutdown = CancellationToken::new();
    let reconciler =
        Reconciler::new(spec(), client.clone(), &config()).with_shutdown(shutdown.clone());

    shutdown.cancel();
    let err = reconciler.reconcile(&dashboard).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
}
