//! # Kubernetes Client
//!
//! [`ClusterClient`] backed by kube-rs. Kinds are resolved once through API
//! discovery and cached; a kind the API server does not serve maps to
//! [`ClientError::NoKindMatch`].

use super::{ApplyOptions, ClientError, ClusterClient, ListOptions, ObjectKey};
use crate::resources::{gvk_of, gvk_string};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, Scope};
use kube::error::DiscoveryError;
use kube::Client;
use kube_runtime::events::{Event, Recorder, Reporter};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    recorder: Recorder,
    kinds: std::sync::Arc<RwLock<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>>,
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient").finish_non_exhaustive()
    }
}

impl KubeClient {
    /// Events are reported as `field_manager`, with `POD_NAME` as the
    /// instance when set
    pub fn new(client: Client, field_manager: &str) -> Self {
        let reporter = Reporter {
            controller: field_manager.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            kinds: std::sync::Arc::default(),
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Resolve a kind through discovery, caching the result
    pub async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities), ClientError> {
        if let Some(found) = self.kinds.read().await.get(gvk) {
            return Ok(found.clone());
        }

        let resolved = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| match e {
                kube::Error::Discovery(
                    DiscoveryError::MissingKind(_) | DiscoveryError::MissingApiGroup(_),
                ) => ClientError::no_kind_match(gvk),
                kube::Error::Api(ref resp) if resp.code == 404 => ClientError::no_kind_match(gvk),
                other => ClientError::Kube(other),
            })?;

        debug!(gvk = %gvk_string(gvk), plural = %resolved.0.plural, "resolved kind");
        self.kinds
            .write()
            .await
            .insert(gvk.clone(), resolved.clone());
        Ok(resolved)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, ClientError> {
        let (resource, caps) = self.resolve(gvk).await?;
        Ok(match (caps.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>, ClientError> {
        let gvk = gvk_of(obj)?;
        self.api(&gvk, obj.metadata.namespace.as_deref()).await
    }
}

fn object_name(obj: &DynamicObject) -> Result<&str, ClientError> {
    obj.metadata
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ClientError::InvalidObject("object has no name".to_string()))
}

fn map_api_error(gvk: &GroupVersionKind, name: &str, err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => ClientError::not_found(gvk, name),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            ClientError::AlreadyExists {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => ClientError::Conflict {
            kind: gvk.kind.clone(),
            name: name.to_string(),
            message: resp.message,
        },
        other => ClientError::Kube(other),
    }
}

fn patch_params(opts: &ApplyOptions) -> PatchParams {
    let params = PatchParams::apply(&opts.field_manager);
    if opts.force {
        params.force()
    } else {
        params
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        key: &ObjectKey,
    ) -> Result<DynamicObject, ClientError> {
        let api = self.api(gvk, key.namespace.as_deref()).await?;
        api.get(&key.name)
            .await
            .map_err(|e| map_api_error(gvk, &key.name, e))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        let api = self.api(gvk, opts.namespace.as_deref()).await?;
        let mut params = ListParams::default();
        if let Some(selector) = &opts.label_selector {
            params = params.labels(selector);
        }
        if let Some(limit) = opts.limit {
            params = params.limit(limit);
        }

        let list = api
            .list(&params)
            .await
            .map_err(|e| map_api_error(gvk, "", e))?;
        Ok(list.items)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let gvk = gvk_of(obj)?;
        let name = object_name(obj)?;
        let api = self.api_for(obj).await?;
        api.create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_api_error(&gvk, name, e))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let gvk = gvk_of(obj)?;
        let name = object_name(obj)?;
        let api = self.api_for(obj).await?;
        api.replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_api_error(&gvk, name, e))
    }

    async fn apply(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError> {
        let gvk = gvk_of(obj)?;
        let name = object_name(obj)?;
        let api = self.api_for(obj).await?;
        api.patch(name, &patch_params(opts), &Patch::Apply(obj))
            .await
            .map_err(|e| map_api_error(&gvk, name, e))
    }

    async fn apply_status(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError> {
        let gvk = gvk_of(obj)?;
        let name = object_name(obj)?;
        let api = self.api_for(obj).await?;
        api.patch_status(name, &patch_params(opts), &Patch::Apply(obj))
            .await
            .map_err(|e| map_api_error(&gvk, name, e))
    }

    async fn delete(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<(), ClientError> {
        let api = self.api(gvk, key.namespace.as_deref()).await?;
        api.delete(&key.name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| map_api_error(gvk, &key.name, e))
    }

    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool, ClientError> {
        let (_, caps) = self.resolve(gvk).await?;
        Ok(matches!(caps.scope, Scope::Namespaced))
    }

    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &Event,
    ) -> Result<(), ClientError> {
        self.recorder
            .publish(event, regarding)
            .await
            .map_err(ClientError::Kube)
    }
}
