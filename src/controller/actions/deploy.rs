//! # Deploy
//!
//! Applies every resource in the request to the cluster.
//!
//! Each object is stamped with the owning instance's identity and the platform
//! release before it is applied, so that garbage collection can later tell
//! current objects from stale ones. Objects are written with server-side
//! apply and forced field ownership, except objects annotated
//! `opendatahub.io/managed: "false"` in the manifest, which are only ever
//! created. Objects carrying that annotation on the cluster are left alone.

use super::{Action, ActionError};
use crate::client::{ApplyOptions, ClientError, ObjectKey};
use crate::constants::{
    ANNOTATION_INSTANCE_GENERATION, ANNOTATION_INSTANCE_NAME, ANNOTATION_INSTANCE_UID,
    ANNOTATION_MANAGED, ANNOTATION_PLATFORM_TYPE, ANNOTATION_PLATFORM_VERSION,
    DEFAULT_DEPLOY_CACHE_TTL_SECS, LABEL_PART_OF,
};
use crate::controller::types::ReconciliationRequest;
use crate::crd::PlatformObject;
use crate::observability;
use crate::resources::{
    annotation, controller_reference, gvk_of, hash, label, remove_annotation, set_annotation,
    set_label, set_owner_reference,
};
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Remembers recently deployed objects so unchanged ones are not re-applied
///
/// Keys combine the live object's identity and resourceVersion with a hash of
/// the desired object, so any change on either side misses the cache.
#[derive(Debug)]
pub struct DeployCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for DeployCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_DEPLOY_CACHE_TTL_SECS))
    }
}

impl DeployCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Drop expired entries
    pub fn sync(&self) {
        let ttl = self.ttl;
        self.entries().retain(|_, added| added.elapsed() < ttl);
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|added| added.elapsed() < self.ttl)
    }

    pub fn add(&self, key: String) {
        self.entries().insert(key, Instant::now());
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `{group/version}.{kind}.{namespace/name}.{resourceVersion}.{hash}` where
/// the identity comes from `live` and the hash from `desired`
fn cache_key(live: &DynamicObject, desired: &DynamicObject) -> Result<String, ClientError> {
    let gvk = gvk_of(live)?;
    Ok(format!(
        "{}.{}.{}.{}.{}",
        gvk.api_version(),
        gvk.kind,
        ObjectKey::of(live),
        live.metadata.resource_version.as_deref().unwrap_or_default(),
        hash(desired)?
    ))
}

#[derive(Debug, Default)]
pub struct DeployAction {
    field_owner: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    cache: Option<DeployCache>,
}

impl DeployAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field manager for server-side apply; defaults to the controller name
    #[must_use]
    pub fn with_field_owner(mut self, owner: impl Into<String>) -> Self {
        self.field_owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Skip re-applying unchanged objects for `ttl`
    #[must_use]
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(DeployCache::new(ttl));
        self
    }

    /// Returns whether the object was written to the cluster
    async fn deploy<K: PlatformObject>(
        &self,
        rr: &ReconciliationRequest<K>,
        mut obj: DynamicObject,
    ) -> Result<bool, ActionError> {
        let gvk = gvk_of(&obj).map_err(|e| ActionError::client("invalid resource", e))?;
        let key = ObjectKey::of(&obj);

        let current = match rr.client.get(&gvk, &key).await {
            Ok(current) => Some(current),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(ActionError::client(format!("failed to lookup object {key}"), e)),
        };

        if current
            .as_ref()
            .is_some_and(|current| annotation(current, ANNOTATION_MANAGED) == Some("false"))
        {
            debug!(gvk = %gvk.kind, name = %key, "skipping unmanaged object");
            return Ok(false);
        }

        let field_owner = self
            .field_owner
            .clone()
            .unwrap_or_else(|| rr.controller.name.clone());

        for (k, v) in &self.labels {
            set_label(&mut obj, k, v.clone());
        }
        for (k, v) in &self.annotations {
            set_annotation(&mut obj, k, v.clone());
        }

        let meta = rr.instance().meta();
        set_annotation(
            &mut obj,
            ANNOTATION_INSTANCE_GENERATION,
            meta.generation.unwrap_or_default().to_string(),
        );
        set_annotation(
            &mut obj,
            ANNOTATION_INSTANCE_NAME,
            meta.name.clone().unwrap_or_default(),
        );
        set_annotation(
            &mut obj,
            ANNOTATION_INSTANCE_UID,
            meta.uid.clone().unwrap_or_default(),
        );
        set_annotation(&mut obj, ANNOTATION_PLATFORM_TYPE, rr.release.name.clone());
        set_annotation(&mut obj, ANNOTATION_PLATFORM_VERSION, rr.release.version.clone());

        if label(&obj, LABEL_PART_OF).unwrap_or_default().is_empty() && !field_owner.is_empty() {
            set_label(&mut obj, LABEL_PART_OF, field_owner.clone());
        }

        let desired = obj.clone();

        if let (Some(cache), Some(current)) = (&self.cache, &current) {
            let ck = cache_key(current, &obj)
                .map_err(|e| ActionError::client("failed to compute request identifier", e))?;
            if cache.has(&ck) {
                debug!(gvk = %gvk.kind, name = %key, "object unchanged since last deploy");
                return Ok(false);
            }
        }

        let (deployed_obj, deployed) = if annotation(&obj, ANNOTATION_MANAGED) == Some("false") {
            remove_annotation(&mut obj, ANNOTATION_MANAGED);
            debug!(gvk = %gvk.kind, name = %key, "create");
            match rr.client.create(&obj).await {
                Ok(created) => (created, true),
                Err(e) if e.is_already_exists() => (obj, false),
                Err(e) => return Err(ActionError::client(format!("failed to create {key}"), e)),
            }
        } else {
            if rr.controller.owns(&gvk) {
                let reference = controller_reference(rr.instance()).ok_or_else(|| {
                    ActionError::InvalidInstance(format!(
                        "cannot set owner of {key}: instance has no name or uid"
                    ))
                })?;
                set_owner_reference(&mut obj, reference);
            }

            debug!(gvk = %gvk.kind, name = %key, "apply");
            let applied = rr
                .client
                .apply(&obj, &ApplyOptions::new(field_owner).force())
                .await
                .map_err(|e| ActionError::client(format!("failed to apply {key}"), e))?;
            (applied, true)
        };

        if let Some(cache) = &self.cache {
            let ck = cache_key(&deployed_obj, &desired).map_err(|e| {
                ActionError::client("failed to compute request identifier after apply", e)
            })?;
            cache.add(ck);
        }

        Ok(deployed)
    }
}

#[async_trait]
impl<K: PlatformObject> Action<K> for DeployAction {
    fn name(&self) -> &str {
        "deploy"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        if let Some(cache) = &self.cache {
            cache.sync();
        }

        let rr = &*rr;
        for resource in &rr.resources {
            if self.deploy(rr, resource.clone()).await? {
                observability::metrics::increment_deployed_resources_total(&rr.controller.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::new_object;
    use kube::core::GroupVersionKind;
    use serde_json::json;

    fn config_map(rv: &str, value: &str) -> DynamicObject {
        let gvk = GroupVersionKind::gvk("", "v1", "ConfigMap");
        let mut obj = new_object(&gvk, Some("ns"), "cfg").data(json!({"data": {"k": value}}));
        obj.metadata.resource_version = Some(rv.to_string());
        obj
    }

    #[test]
    fn cache_key_tracks_live_version_and_desired_content() {
        let live = config_map("7", "a");
        let key = cache_key(&live, &config_map("", "a")).unwrap();
        assert!(key.starts_with("v1.ConfigMap.ns/cfg.7."));

        assert_eq!(key, cache_key(&live, &config_map("", "a")).unwrap());
        assert_ne!(key, cache_key(&config_map("8", "a"), &config_map("", "a")).unwrap());
        assert_ne!(key, cache_key(&live, &config_map("", "b")).unwrap());
    }

    #[test]
    fn cache_entries_expire() {
        let cache = DeployCache::new(Duration::ZERO);
        cache.add("k".to_string());
        assert!(!cache.has("k"));
        cache.sync();
        assert!(cache.is_empty());

        let cache = DeployCache::default();
        cache.add("k".to_string());
        assert!(cache.has("k"));
        cache.sync();
        assert_eq!(cache.len(), 1);
    }
}
