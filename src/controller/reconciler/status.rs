//! # Status Write-back
//!
//! Persists the status computed by a pass through server-side apply on the
//! status subresource.

use super::ReconcileError;
use crate::client::{ApplyOptions, ClusterClient, ObjectKey};
use crate::crd::{ComponentStatus, PlatformObject};
use crate::resources::{gvk_of, new_object, to_dynamic};
use serde_json::json;
use tracing::debug;

/// Apply the instance status unless it is identical to `original`
///
/// The instance may be gone by the time the pass finishes; that is not an
/// error.
pub(super) async fn write_status<K: PlatformObject>(
    client: &dyn ClusterClient,
    field_manager: &str,
    instance: &K,
    original: Option<&ComponentStatus>,
) -> Result<(), ReconcileError> {
    // Skipping no-op writes avoids a watch event per reconcile
    if instance.status() == original {
        debug!("skipping status update, status unchanged");
        return Ok(());
    }

    let obj = to_dynamic(instance).map_err(ReconcileError::Status)?;
    let gvk = gvk_of(&obj).map_err(ReconcileError::Status)?;
    let key = ObjectKey::of(&obj);
    let patch = new_object(&gvk, key.namespace.as_deref(), &key.name)
        .data(json!({ "status": obj.data.get("status") }));

    match client
        .apply_status(&patch, &ApplyOptions::new(field_manager).force())
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            debug!(name = %key, "instance deleted before status update");
            Ok(())
        }
        Err(e) => Err(ReconcileError::Status(e)),
    }
}
