//! # Watch Loop
//!
//! Runs one component controller on kube-runtime.
//!
//! The component resource is watched cluster-wide. Owned kinds are watched
//! through owner references, restricted to objects labelled part of the
//! component; watched kinds map every event onto the component singleton.
//! Kinds the API server does not serve are skipped so that optional
//! dependencies do not keep the controller from starting.

use super::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::constants::LABEL_PART_OF;
use crate::controller::reconciler::{resource_key, ReconcileError, Reconciler};
use crate::crd::PlatformObject;
use crate::resources::gvk_string;
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube_runtime::controller::{Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use kube::{discovery, Client};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolve `gvk` through discovery; `None` when the kind is not served
async fn resolve_kind(client: &Client, gvk: &GroupVersionKind) -> Option<ApiResource> {
    match discovery::pinned_kind(client, gvk).await {
        Ok((resource, _)) => Some(resource),
        Err(e) => {
            warn!(
                gvk = %gvk_string(gvk),
                error = %e,
                "kind is not served by the API server, not watching it"
            );
            None
        }
    }
}

async fn reconcile<K: PlatformObject>(
    instance: Arc<K>,
    reconciler: Arc<Reconciler<K>>,
) -> Result<Action, ReconcileError> {
    reconciler.reconcile(instance.as_ref()).await?;
    reconciler.reset_backoff(&resource_key(instance.as_ref()));
    Ok(Action::await_change())
}

/// Run the controller for `reconciler` until `shutdown` fires
///
/// `instance_name` is the singleton every watched-kind event is mapped to.
pub async fn run_controller<K: PlatformObject>(
    client: Client,
    reconciler: Arc<Reconciler<K>>,
    instance_name: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let name = reconciler.name().to_string();
    let api: Api<K> = Api::all(client.clone());
    let mut controller = Controller::new(api, watcher::Config::default());

    let owned_selector = format!("{LABEL_PART_OF}={name}");
    for gvk in &reconciler.spec().owned {
        let Some(resource) = resolve_kind(&client, gvk).await else {
            continue;
        };
        debug!(controller = %name, gvk = %gvk_string(gvk), "watching owned kind");
        let owned: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        controller = controller.owns_with(
            owned,
            resource,
            watcher::Config::default().labels(&owned_selector),
        );
    }

    for gvk in &reconciler.spec().watched {
        let Some(resource) = resolve_kind(&client, gvk).await else {
            continue;
        };
        debug!(controller = %name, gvk = %gvk_string(gvk), "watching kind");
        let watched: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let target = instance_name.to_string();
        controller = controller.watches_with(
            watched,
            resource,
            watcher::Config::default(),
            move |_| Some(ObjectRef::<K>::new(&target)),
        );
    }

    info!(controller = %name, "Starting controller watch loop");

    controller
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(
            reconcile::<K>,
            handle_reconciliation_error::<K>,
            reconciler,
        )
        .for_each(|result| {
            let name = name.clone();
            async move {
                match result {
                    Ok((object, _)) => debug!(controller = %name, object = %object, "reconciled"),
                    Err(e) => {
                        handle_watch_stream_error(&name, &e.to_string());
                    }
                }
            }
        })
        .await;

    info!(controller = %name, "Controller watch loop stopped");
    Ok(())
}
