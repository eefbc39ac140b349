//! # Safe Client
//!
//! Serializes every call to the wrapped client behind an async mutex, for
//! backing clients that are not safe to use concurrently.

use super::{ApplyOptions, ClientError, ClusterClient, ListOptions, ObjectKey};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube_runtime::events::Event;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct SafeClient<C> {
    inner: Mutex<C>,
}

impl<C: ClusterClient> SafeClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

#[async_trait]
impl<C: ClusterClient> ClusterClient for SafeClient<C> {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        key: &ObjectKey,
    ) -> Result<DynamicObject, ClientError> {
        self.inner.lock().await.get(gvk, key).await
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        opts: &ListOptions,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        self.inner.lock().await.list(gvk, opts).await
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        self.inner.lock().await.create(obj).await
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        self.inner.lock().await.update(obj).await
    }

    async fn apply(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError> {
        self.inner.lock().await.apply(obj, opts).await
    }

    async fn apply_status(
        &self,
        obj: &DynamicObject,
        opts: &ApplyOptions,
    ) -> Result<DynamicObject, ClientError> {
        self.inner.lock().await.apply_status(obj, opts).await
    }

    async fn delete(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<(), ClientError> {
        self.inner.lock().await.delete(gvk, key).await
    }

    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool, ClientError> {
        self.inner.lock().await.is_namespaced(gvk).await
    }

    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &Event,
    ) -> Result<(), ClientError> {
        self.inner.lock().await.publish_event(regarding, event).await
    }
}
