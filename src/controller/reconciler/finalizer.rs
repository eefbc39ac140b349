//! # Finalizer
//!
//! Adds and removes the platform finalizer on component instances.

use super::ReconcileError;
use crate::client::ClusterClient;
use crate::constants::PLATFORM_FINALIZER;
use crate::crd::PlatformObject;
use crate::resources::{from_dynamic, to_dynamic};
use tracing::info;

pub(super) fn has_finalizer<K: PlatformObject>(instance: &K) -> bool {
    instance
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == PLATFORM_FINALIZER))
}

/// Add the finalizer, returning the instance as stored by the server
pub(super) async fn add_finalizer<K: PlatformObject>(
    client: &dyn ClusterClient,
    mut instance: K,
) -> Result<K, ReconcileError> {
    if has_finalizer(&instance) {
        return Ok(instance);
    }

    info!("adding finalizer");
    instance
        .meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(PLATFORM_FINALIZER.to_string());
    update(client, &instance).await
}

pub(super) async fn remove_finalizer<K: PlatformObject>(
    client: &dyn ClusterClient,
    mut instance: K,
) -> Result<K, ReconcileError> {
    if !has_finalizer(&instance) {
        return Ok(instance);
    }

    info!("removing finalizer");
    if let Some(finalizers) = instance.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != PLATFORM_FINALIZER);
    }
    update(client, &instance).await
}

async fn update<K: PlatformObject>(client: &dyn ClusterClient, instance: &K) -> Result<K, ReconcileError> {
    let obj = to_dynamic(instance).map_err(ReconcileError::Finalizer)?;
    let stored = client.update(&obj).await.map_err(ReconcileError::Finalizer)?;
    from_dynamic(&stored).map_err(ReconcileError::Finalizer)
}
