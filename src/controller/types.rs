//! # Reconciliation Request
//!
//! [`ReconciliationRequest`] is the per-pass state handed to every action:
//! the instance being reconciled (owned by its condition [`Manager`]), the
//! manifests and resources accumulated by earlier actions, the cluster
//! client, and release metadata. It is built fresh for every reconcile and
//! dropped at the end of it.

use crate::client::{ClientError, ClusterClient};
use crate::controller::conditions::Manager;
use crate::crd::{PlatformObject, Release};
use crate::resources::{gvk_of, to_dynamic};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::Resource;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Location of one kustomize root on the manifests filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    pub path: String,
    pub context_dir: String,
    pub source_path: String,
}

impl ManifestInfo {
    pub fn new(
        path: impl Into<String>,
        context_dir: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            context_dir: context_dir.into(),
            source_path: source_path.into(),
        }
    }
}

impl fmt::Display for ManifestInfo {
    /// Joins the non-empty parts with single slashes
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut joined = String::new();
        for (i, part) in [&self.path, &self.context_dir, &self.source_path]
            .into_iter()
            .filter(|part| !part.is_empty())
            .enumerate()
        {
            let part = if i == 0 {
                part.trim_end_matches('/')
            } else {
                part.trim_matches('/')
            };
            if part.is_empty() {
                continue;
            }
            if !joined.is_empty() || i > 0 {
                joined.push('/');
            }
            joined.push_str(part);
        }
        f.write_str(&joined)
    }
}

/// Static facts about the controller running a request
#[derive(Debug, Clone, Default)]
pub struct ControllerMeta {
    /// Controller name, the lowercase component name
    pub name: String,
    /// Kinds the controller owns; deployed objects of these kinds get a
    /// controller owner reference and are candidates for garbage collection
    pub owned: Vec<GroupVersionKind>,
    /// Field manager used for server-side apply
    pub field_manager: String,
}

impl ControllerMeta {
    pub fn owns(&self, gvk: &GroupVersionKind) -> bool {
        self.owned.contains(gvk)
    }
}

pub struct ReconciliationRequest<K: PlatformObject> {
    pub client: Arc<dyn ClusterClient>,
    pub controller: Arc<ControllerMeta>,
    pub release: Release,
    /// Namespace components deploy their workloads into
    pub applications_namespace: String,
    pub manifests: Vec<ManifestInfo>,
    pub resources: Vec<DynamicObject>,
    /// Set once resources were generated in this pass; gates garbage
    /// collection
    pub generated: bool,
    pub cancel: CancellationToken,
    conditions: Manager<K>,
}

impl<K: PlatformObject> fmt::Debug for ReconciliationRequest<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationRequest")
            .field("controller", &self.controller.name)
            .field("instance", &self.instance().meta().name)
            .field("release", &self.release)
            .field("manifests", &self.manifests)
            .field("resources", &self.resources.len())
            .field("generated", &self.generated)
            .finish_non_exhaustive()
    }
}

impl<K: PlatformObject> ReconciliationRequest<K> {
    /// Build a request; `conditions` must already be bound to the instance
    pub fn new(
        client: Arc<dyn ClusterClient>,
        controller: Arc<ControllerMeta>,
        conditions: Manager<K>,
        release: Release,
        applications_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            controller,
            release,
            applications_namespace: applications_namespace.into(),
            manifests: Vec::new(),
            resources: Vec::new(),
            generated: false,
            cancel: CancellationToken::new(),
            conditions,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn instance(&self) -> &K {
        self.conditions.accessor()
    }

    pub fn instance_mut(&mut self) -> &mut K {
        self.conditions.accessor_mut()
    }

    pub fn conditions(&self) -> &Manager<K> {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut Manager<K> {
        &mut self.conditions
    }

    pub fn into_instance(self) -> K {
        self.conditions.into_inner()
    }

    /// Convert typed resources and append them to `resources`
    pub fn add_resources<T>(&mut self, values: &[T]) -> Result<(), ClientError>
    where
        T: Resource<DynamicType = ()> + Serialize,
    {
        for value in values {
            let obj = to_dynamic(value)?;
            gvk_of(&obj)?;
            self.resources.push(obj);
        }
        Ok(())
    }

    /// Visit every resource; returning `Break` stops the walk
    pub fn for_each_resource<E, F>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&mut DynamicObject) -> Result<ControlFlow<()>, E>,
    {
        for resource in &mut self.resources {
            if f(resource)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Remove every resource matching `predicate`, returning how many went
    pub fn remove_resources<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&DynamicObject) -> bool,
    {
        let before = self.resources.len();
        self.resources.retain(|resource| !predicate(resource));
        before - self.resources.len()
    }

    /// SHA-256 over the instance identity, release, and manifest locations
    ///
    /// Changes whenever anything that influences rendering changes, so it can
    /// key render caches.
    pub fn hash(&self) -> Vec<u8> {
        let meta = self.instance().meta();
        let mut hasher = Sha256::new();
        hasher.update(meta.uid.as_deref().unwrap_or_default().as_bytes());
        hasher.update(varint(meta.generation.unwrap_or_default()));
        hasher.update(self.release.name.as_bytes());
        hasher.update(self.release.version.as_bytes());
        for manifest in &self.manifests {
            hasher.update(manifest.to_string().as_bytes());
        }
        hasher.finalize().to_vec()
    }

    pub fn hash_str(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.hash())
    }
}

/// Zig-zag LEB128 encoding of a signed integer
fn varint(value: i64) -> Vec<u8> {
    #[allow(clippy::cast_sign_loss, reason = "zig-zag encoding maps signed onto unsigned")]
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    let mut out = Vec::with_capacity(10);
    while n >= 0x80 {
        #[allow(clippy::cast_possible_truncation, reason = "masked to seven bits")]
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    #[allow(clippy::cast_possible_truncation, reason = "loop leaves fewer than eight bits")]
    out.push(n as u8);
    out
}
