//! # Cluster Client
//!
//! The cluster I/O capability consumed by actions and the reconciler.
//!
//! Everything is expressed over [`DynamicObject`] plus an explicit
//! [`GroupVersionKind`], so actions can read and write arbitrary kinds,
//! including foreign CRDs that may not be installed.
//!
//! - [`KubeClient`] talks to the API server through kube-rs, resolving kinds
//!   with discovery
//! - [`FakeClient`] is an in-memory store for tests
//! - [`SafeClient`] serializes calls to a wrapped client

mod fake;
mod kubernetes;
mod safe;

pub use self::fake::{FakeClient, RecordedEvent};
pub use self::kubernetes::KubeClient;
pub use self::safe::SafeClient;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube_runtime::events::Event;
use std::fmt;
use thiserror::Error;

/// Errors returned by a [`ClusterClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("conflict on {kind} \"{name}\": {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("no matches for kind \"{kind}\" in version \"{api_version}\"")]
    NoKindMatch { kind: String, api_version: String },

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn not_found(gvk: &GroupVersionKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: gvk.kind.clone(),
            name: name.into(),
        }
    }

    pub fn no_kind_match(gvk: &GroupVersionKind) -> Self {
        Self::NoKindMatch {
            kind: gvk.kind.clone(),
            api_version: gvk.api_version(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || matches!(self, Self::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoKindMatch { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
            || matches!(self, Self::Kube(kube::Error::Api(resp)) if resp.code == 409)
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Namespace/name of an object. An empty namespace means cluster scoped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    pub fn namespaced(namespace: &str, name: impl Into<String>) -> Self {
        Self::new(Some(namespace), name)
    }

    pub fn of(obj: &DynamicObject) -> Self {
        Self::new(
            obj.metadata.namespace.as_deref(),
            obj.metadata.name.clone().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Options for [`ClusterClient::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict to one namespace; `None` lists across all namespaces
    pub namespace: Option<String>,
    /// Equality based selector, `key=value[,key=value]`
    pub label_selector: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for server-side apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub field_manager: String,
    pub force: bool,
}

impl ApplyOptions {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            force: false,
        }
    }

    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Cluster I/O used by actions
///
/// Objects passed to write operations must carry `apiVersion` and `kind`.
#[async_trait]
pub trait ClusterClient: Send + Sync + fmt::Debug {
    async fn get(&self, gvk: &GroupVersionKind, key: &ObjectKey)
        -> Result<DynamicObject, ClientError>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, ClientError>;

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError>;

    /// Replace an object; a stale `resourceVersion` is a conflict
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError>;

    /// Server-side apply of the object
    async fn apply(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError>;

    /// Server-side apply of the status subresource
    async fn apply_status(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError>;

    async fn delete(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<(), ClientError>;

    /// Whether objects of `gvk` live in a namespace, per API discovery
    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool, ClientError>;

    /// Record a Kubernetes event about `regarding`
    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &Event,
    ) -> Result<(), ClientError>;
}

/// Parse an equality based label selector into `(key, value)` pairs
pub(crate) fn parse_label_selector(selector: &str) -> Result<Vec<(String, String)>, ClientError> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| {
                    ClientError::InvalidObject(format!("unsupported label selector term: {term}"))
                })?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_display() {
        assert_eq!(ObjectKey::namespaced("ns", "a").to_string(), "ns/a");
        assert_eq!(ObjectKey::cluster("a").to_string(), "a");
        assert_eq!(ObjectKey::new(Some(""), "a"), ObjectKey::cluster("a"));
    }

    #[test]
    fn label_selector_parsing() {
        let terms = parse_label_selector("a=b, c==d").unwrap();
        assert_eq!(
            terms,
            vec![
                ("a".to_string(), "b".to_string()),
                ("c".to_string(), "d".to_string())
            ]
        );
        assert!(parse_label_selector("a in (b)").is_err());
    }

    #[test]
    fn not_found_predicates() {
        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        assert!(ClientError::not_found(&gvk, "x").is_not_found());
        assert!(ClientError::no_kind_match(&gvk).is_no_match());
        assert!(!ClientError::no_kind_match(&gvk).is_not_found());
    }
}
