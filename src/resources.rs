//! # Resource Helpers
//!
//! Helpers over [`DynamicObject`]: type metadata, labels, annotations,
//! owner references, typed conversion, and content hashing.

use crate::client::ClientError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use kube::core::{GroupVersion, GroupVersionKind};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// `group/version, Kind=kind`
pub fn gvk_string(gvk: &GroupVersionKind) -> String {
    format!("{}, Kind={}", gvk.api_version(), gvk.kind)
}

/// GroupVersionKind from an object's type metadata
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind, ClientError> {
    let types = obj.types.as_ref().ok_or_else(|| {
        ClientError::InvalidObject(format!(
            "object {} has no apiVersion/kind",
            obj.metadata.name.as_deref().unwrap_or_default()
        ))
    })?;
    let gv: GroupVersion = types.api_version.parse().map_err(|e| {
        ClientError::InvalidObject(format!("invalid apiVersion {}: {e}", types.api_version))
    })?;
    Ok(GroupVersionKind::gvk(&gv.group, &gv.version, &types.kind))
}

/// Empty object of the given kind
pub fn new_object(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ApiResource::from_gvk(gvk));
    obj.metadata.namespace = namespace.filter(|ns| !ns.is_empty()).map(str::to_string);
    obj
}

/// Convert a typed resource into a [`DynamicObject`] carrying its type meta
pub fn to_dynamic<K>(resource: &K) -> Result<DynamicObject, ClientError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let mut obj: DynamicObject = serde_json::from_value(serde_json::to_value(resource)?)?;
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        });
    }
    Ok(obj)
}

pub fn from_dynamic<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, ClientError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn label<'a>(obj: &'a DynamicObject, key: &str) -> Option<&'a str> {
    obj.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub fn annotation<'a>(obj: &'a DynamicObject, key: &str) -> Option<&'a str> {
    obj.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

pub fn set_label(obj: &mut DynamicObject, key: &str, value: impl Into<String>) {
    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

pub fn set_annotation(obj: &mut DynamicObject, key: &str, value: impl Into<String>) {
    obj.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

pub fn remove_annotation(obj: &mut DynamicObject, key: &str) {
    if let Some(annotations) = obj.metadata.annotations.as_mut() {
        annotations.remove(key);
    }
}

/// True when every `key=value` pair is present on the object
pub fn has_labels(obj: &DynamicObject, selector: &[(String, String)]) -> bool {
    selector
        .iter()
        .all(|(key, value)| label(obj, key) == Some(value.as_str()))
}

/// Controller owner reference pointing at `owner`
pub fn controller_reference<K>(owner: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&())
}

/// Add or replace the owner reference matching `reference.uid`
pub fn set_owner_reference(obj: &mut DynamicObject, reference: OwnerReference) {
    let references = obj.metadata.owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = references.iter_mut().find(|r| r.uid == reference.uid) {
        *existing = reference;
    } else {
        references.push(reference);
    }
}

pub fn is_owned_by(obj: &DynamicObject, uid: &str) -> bool {
    obj.metadata
        .owner_references
        .as_ref()
        .is_some_and(|references| references.iter().any(|r| r.uid == uid))
}

/// SHA-256 of the object with server populated fields stripped, base64url
/// encoded
pub fn hash(obj: &DynamicObject) -> Result<String, ClientError> {
    let mut stripped = obj.clone();
    stripped.metadata.resource_version = None;
    stripped.metadata.uid = None;
    stripped.metadata.generation = None;
    stripped.metadata.creation_timestamp = None;
    stripped.metadata.managed_fields = None;
    if let Some(data) = stripped.data.as_object_mut() {
        data.remove("status");
    }

    let bytes = serde_json::to_vec(&stripped)?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes)))
}
