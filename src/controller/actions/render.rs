//! # Render
//!
//! Loads the Kubernetes objects found in the request's manifest locations
//! into `rr.resources`.
//!
//! A location is either a YAML file or a directory whose `*.yaml`/`*.yml`
//! files are read in name order; every file may hold several documents.
//! Results are cached under [`ReconciliationRequest::hash_str`], so a pass
//! with the same instance generation, release and manifests reuses the
//! previous output and leaves `rr.generated` unset.
//!
//! Whether a namespace-less object is placed in the applications namespace
//! depends on the scope API discovery reports for its kind.

use super::{Action, ActionError};
use crate::client::{ClientError, ClusterClient};
use crate::controller::types::ReconciliationRequest;
use crate::crd::PlatformObject;
use crate::resources::{gvk_of, set_label};
use anyhow::Context;
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RenderAction {
    labels: BTreeMap<String, String>,
    namespaced: bool,
    cache: Option<Mutex<Option<(String, Vec<DynamicObject>)>>>,
}

impl RenderAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label every rendered object
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Put namespace-less objects into the applications namespace
    #[must_use]
    pub fn in_applications_namespace(mut self) -> Self {
        self.namespaced = true;
        self
    }

    #[must_use]
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(None));
        self
    }

    async fn render<K: PlatformObject>(
        &self,
        rr: &ReconciliationRequest<K>,
    ) -> Result<Vec<DynamicObject>, ActionError> {
        let mut objects = Vec::new();
        for manifest in &rr.manifests {
            let location = PathBuf::from(manifest.to_string());
            for file in manifest_files(&location).await? {
                let content = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("failed to read manifest {}", file.display()))?;
                objects.extend(
                    parse_documents(&content)
                        .with_context(|| format!("failed to parse manifest {}", file.display()))?,
                );
            }
        }

        for obj in &mut objects {
            for (key, value) in &self.labels {
                set_label(obj, key, value.clone());
            }
            if self.namespaced {
                default_namespace(rr.client.as_ref(), obj, &rr.applications_namespace)
                    .await
                    .map_err(|e| ActionError::client("failed to resolve resource scope", e))?;
            }
        }
        Ok(objects)
    }
}

/// Put `obj` into `namespace` when it has none and its kind is namespaced
///
/// A kind the API server does not serve yet is treated as namespaced.
async fn default_namespace(
    client: &dyn ClusterClient,
    obj: &mut DynamicObject,
    namespace: &str,
) -> Result<(), ClientError> {
    if obj.metadata.namespace.as_deref().is_some_and(|ns| !ns.is_empty()) {
        return Ok(());
    }

    let gvk = gvk_of(obj)?;
    let namespaced = match client.is_namespaced(&gvk).await {
        Ok(namespaced) => namespaced,
        Err(e) if e.is_no_match() => {
            debug!(kind = %gvk.kind, "kind not served, assuming namespaced");
            true
        }
        Err(e) => return Err(e),
    };
    if namespaced {
        obj.metadata.namespace = Some(namespace.to_string());
    }
    Ok(())
}

async fn manifest_files(location: &Path) -> Result<Vec<PathBuf>, ActionError> {
    let metadata = tokio::fs::metadata(location)
        .await
        .with_context(|| format!("manifest location {} is not readable", location.display()))?;
    if metadata.is_file() {
        return Ok(vec![location.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(location)
        .await
        .with_context(|| format!("failed to list {}", location.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", location.display()))?
    {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Every non-empty document of a multi-document YAML stream
fn parse_documents(content: &str) -> anyhow::Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_json::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_json::from_value(value)?;
        gvk_of(&obj)?;
        objects.push(obj);
    }
    Ok(objects)
}

#[async_trait]
impl<K: PlatformObject> Action<K> for RenderAction {
    fn name(&self) -> &str {
        "render"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        let Some(cache) = &self.cache else {
            let objects = self.render(rr).await?;
            rr.resources.extend(objects);
            rr.generated = true;
            return Ok(());
        };

        let key = rr.hash_str();
        let cached = cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .filter(|(cached_key, _)| *cached_key == key)
            .map(|(_, objects)| objects.clone());

        if let Some(objects) = cached {
            debug!(count = objects.len(), "using cached manifests");
            rr.resources.extend(objects);
            return Ok(());
        }

        let objects = self.render(rr).await?;
        *cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some((key, objects.clone()));
        rr.resources.extend(objects);
        rr.generated = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FakeClient;
    use crate::resources::new_object;
    use kube::core::GroupVersionKind;

    #[tokio::test]
    async fn namespace_follows_the_discovered_scope() {
        let role = GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole");
        let custom = GroupVersionKind::gvk("example.io", "v1", "Widget");
        let missing = GroupVersionKind::gvk("example.io", "v1", "Gadget");
        let client = FakeClient::new()
            .cluster_scoped(role.clone())
            .without_kind(missing.clone());

        let mut cluster_role = new_object(&role, None, "reader");
        default_namespace(&client, &mut cluster_role, "apps").await.unwrap();
        assert_eq!(cluster_role.metadata.namespace, None);

        let mut widget = new_object(&custom, None, "w");
        default_namespace(&client, &mut widget, "apps").await.unwrap();
        assert_eq!(widget.metadata.namespace.as_deref(), Some("apps"));

        let mut pinned = new_object(&custom, Some("other"), "p");
        default_namespace(&client, &mut pinned, "apps").await.unwrap();
        assert_eq!(pinned.metadata.namespace.as_deref(), Some("other"));

        let mut gadget = new_object(&missing, None, "g");
        default_namespace(&client, &mut gadget, "apps").await.unwrap();
        assert_eq!(gadget.metadata.namespace.as_deref(), Some("apps"));
    }

    #[tokio::test]
    async fn scope_lookup_failures_are_errors() {
        let custom = GroupVersionKind::gvk("example.io", "v1", "Widget");
        let client = FakeClient::new().failing_kind(custom.clone(), "discovery unavailable");

        let mut widget = new_object(&custom, None, "w");
        assert!(default_namespace(&client, &mut widget, "apps").await.is_err());
        assert_eq!(widget.metadata.namespace, None);
    }

    #[test]
    fn parses_multi_document_streams() {
        let content = r"
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
data:
  k: v
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: b
  namespace: ns
";
        let objects = parse_documents(content).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].metadata.name.as_deref(), Some("a"));
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Deployment");
        assert_eq!(objects[1].metadata.namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn rejects_documents_without_type_meta() {
        assert!(parse_documents("metadata:\n  name: a\n").is_err());
    }
}
