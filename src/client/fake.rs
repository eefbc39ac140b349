//! # Fake Client
//!
//! In-memory [`ClusterClient`] used by tests.
//!
//! Behaves like a tiny API server: objects get a `uid`, a `generation` and a
//! monotonically increasing `resourceVersion`; replacing an object with a
//! stale `resourceVersion` is a conflict; deleting an object that still has
//! finalizers only marks it for deletion. Kinds can be marked as not
//! installed, and kinds can be made to fail, to exercise error paths.
//! Published events are kept in memory as [`RecordedEvent`]s.

use super::{parse_label_selector, ApplyOptions, ClientError, ClusterClient, ListOptions, ObjectKey};
use crate::resources::{gvk_of, has_labels};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube_runtime::events::{Event, EventType};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Store {
    objects: HashMap<GroupVersionKind, BTreeMap<ObjectKey, DynamicObject>>,
    missing_kinds: HashSet<GroupVersionKind>,
    cluster_scoped_kinds: HashSet<GroupVersionKind>,
    failing_kinds: HashMap<GroupVersionKind, String>,
    resource_version: u64,
    uid: u64,
    applies: usize,
    deletes: usize,
    events: Vec<RecordedEvent>,
}

/// An event published through a [`FakeClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Kind and name of the object the event is about
    pub regarding: String,
    /// `Normal` or `Warning`
    pub event_type: String,
    pub reason: String,
    pub note: Option<String>,
    pub action: String,
}

impl Store {
    fn check_kind(&self, gvk: &GroupVersionKind) -> Result<(), ClientError> {
        if self.missing_kinds.contains(gvk) {
            return Err(ClientError::no_kind_match(gvk));
        }
        if let Some(message) = self.failing_kinds.get(gvk) {
            return Err(ClientError::InvalidObject(message.clone()));
        }
        Ok(())
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn insert_new(&mut self, gvk: GroupVersionKind, key: ObjectKey, mut obj: DynamicObject) -> DynamicObject {
        self.uid += 1;
        obj.metadata.uid = Some(format!("uid-{}", self.uid));
        obj.metadata.generation = Some(1);
        obj.metadata.resource_version = Some(self.next_resource_version());
        obj.metadata.deletion_timestamp = None;
        self.objects.entry(gvk).or_default().insert(key, obj.clone());
        obj
    }

    /// Store `next` over `current`, bumping generation on spec changes and
    /// dropping objects whose deletion is no longer blocked by finalizers
    fn store(&mut self, gvk: &GroupVersionKind, key: &ObjectKey, current: &DynamicObject, mut next: DynamicObject) -> DynamicObject {
        let generation = current.metadata.generation.unwrap_or(1);
        next.metadata.generation = Some(if without_status(&current.data) == without_status(&next.data) {
            generation
        } else {
            generation + 1
        });
        next.metadata.uid.clone_from(&current.metadata.uid);
        next.metadata.deletion_timestamp.clone_from(&current.metadata.deletion_timestamp);
        next.metadata.resource_version = Some(self.next_resource_version());

        let finalizers_empty = next.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if next.metadata.deletion_timestamp.is_some() && finalizers_empty {
            if let Some(objects) = self.objects.get_mut(gvk) {
                objects.remove(key);
            }
        } else {
            self.objects
                .entry(gvk.clone())
                .or_default()
                .insert(key.clone(), next.clone());
        }
        next
    }

    fn find(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Option<&DynamicObject> {
        self.objects.get(gvk).and_then(|objects| objects.get(key))
    }
}

fn now() -> Result<Time, ClientError> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    Ok(serde_json::from_value(Value::String(stamp))?)
}

fn without_status(data: &Value) -> Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

/// JSON merge of `patch` into `target`: objects merge recursively, anything
/// else is replaced
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[derive(Debug, Default)]
pub struct FakeClient {
    store: Mutex<Store>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed objects; each must carry `apiVersion` and `kind`
    ///
    /// # Panics
    ///
    /// Panics when an object has no type metadata or name.
    #[must_use]
    pub fn with_objects(self, objects: impl IntoIterator<Item = DynamicObject>) -> Self {
        {
            let mut store = self.lock();
            for obj in objects {
                let gvk = gvk_of(&obj).expect("seeded object must carry apiVersion and kind");
                let key = ObjectKey::of(&obj);
                assert!(!key.name.is_empty(), "seeded object must have a name");
                store.insert_new(gvk, key, obj);
            }
        }
        self
    }

    /// Make every call for `gvk` fail as if its CRD were not installed
    #[must_use]
    pub fn without_kind(self, gvk: GroupVersionKind) -> Self {
        self.lock().missing_kinds.insert(gvk);
        self
    }

    /// Report `gvk` as cluster scoped; every other kind is namespaced
    #[must_use]
    pub fn cluster_scoped(self, gvk: GroupVersionKind) -> Self {
        self.lock().cluster_scoped_kinds.insert(gvk);
        self
    }

    /// Make every call for `gvk` fail with `message`
    #[must_use]
    pub fn failing_kind(self, gvk: GroupVersionKind, message: impl Into<String>) -> Self {
        self.lock().failing_kinds.insert(gvk, message.into());
        self
    }

    /// Every stored object of a kind, ordered by namespace/name
    pub fn objects(&self, gvk: &GroupVersionKind) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .get(gvk)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn apply_count(&self) -> usize {
        self.lock().applies
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    /// Events published so far, oldest first
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned store only happens after a panicking test thread
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn key_for(obj: &DynamicObject) -> Result<(GroupVersionKind, ObjectKey), ClientError> {
        let gvk = gvk_of(obj)?;
        let key = ObjectKey::of(obj);
        if key.name.is_empty() {
            return Err(ClientError::InvalidObject(format!("{} has no name", gvk.kind)));
        }
        Ok((gvk, key))
    }
}

#[async_trait]
impl ClusterClient for FakeClient {
    async fn get(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<DynamicObject, ClientError> {
        let store = self.lock();
        store.check_kind(gvk)?;
        store
            .find(gvk, key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(gvk, key.name.clone()))
    }

    async fn list(&self, gvk: &GroupVersionKind, opts: &ListOptions) -> Result<Vec<DynamicObject>, ClientError> {
        let selector = match &opts.label_selector {
            Some(selector) => parse_label_selector(selector)?,
            None => Vec::new(),
        };

        let store = self.lock();
        store.check_kind(gvk)?;
        let Some(objects) = store.objects.get(gvk) else {
            return Ok(Vec::new());
        };

        let limit = opts.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(objects
            .iter()
            .filter(|(key, _)| opts.namespace.is_none() || key.namespace == opts.namespace)
            .filter(|(_, obj)| has_labels(obj, &selector))
            .map(|(_, obj)| obj.clone())
            .take(limit)
            .collect())
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (gvk, key) = Self::key_for(obj)?;
        let mut store = self.lock();
        store.check_kind(&gvk)?;
        if store.find(&gvk, &key).is_some() {
            return Err(ClientError::AlreadyExists {
                kind: gvk.kind,
                name: key.name,
            });
        }
        Ok(store.insert_new(gvk, key, obj.clone()))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (gvk, key) = Self::key_for(obj)?;
        let mut store = self.lock();
        store.check_kind(&gvk)?;
        let current = store
            .find(&gvk, &key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(&gvk, key.name.clone()))?;

        if let Some(version) = &obj.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(version) {
                return Err(ClientError::Conflict {
                    kind: gvk.kind,
                    name: key.name,
                    message: "the object has been modified; please apply your changes to the latest version and try again".to_string(),
                });
            }
        }

        Ok(store.store(&gvk, &key, &current, obj.clone()))
    }

    async fn apply(&self, obj: &DynamicObject, _opts: &ApplyOptions) -> Result<DynamicObject, ClientError> {
        let (gvk, key) = Self::key_for(obj)?;
        let mut store = self.lock();
        store.check_kind(&gvk)?;
        store.applies += 1;

        let Some(current) = store.find(&gvk, &key).cloned() else {
            let mut created = obj.clone();
            if let Some(data) = created.data.as_object_mut() {
                data.remove("status");
            }
            return Ok(store.insert_new(gvk, key, created));
        };

        let mut next = current.clone();
        merge(&mut next.data, &without_status(&obj.data));
        if let Some(labels) = &obj.metadata.labels {
            next.metadata.labels.get_or_insert_with(Default::default).extend(labels.clone());
        }
        if let Some(annotations) = &obj.metadata.annotations {
            next.metadata
                .annotations
                .get_or_insert_with(Default::default)
                .extend(annotations.clone());
        }
        if obj.metadata.owner_references.is_some() {
            next.metadata.owner_references.clone_from(&obj.metadata.owner_references);
        }
        if obj.metadata.finalizers.is_some() {
            next.metadata.finalizers.clone_from(&obj.metadata.finalizers);
        }

        Ok(store.store(&gvk, &key, &current, next))
    }

    async fn apply_status(&self, obj: &DynamicObject, _opts: &ApplyOptions) -> Result<DynamicObject, ClientError> {
        let (gvk, key) = Self::key_for(obj)?;
        let mut store = self.lock();
        store.check_kind(&gvk)?;
        let current = store
            .find(&gvk, &key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(&gvk, key.name.clone()))?;

        let mut next = current.clone();
        if let (Some(data), Some(status)) = (next.data.as_object_mut(), obj.data.get("status")) {
            data.insert("status".to_string(), status.clone());
        }
        Ok(store.store(&gvk, &key, &current, next))
    }

    async fn delete(&self, gvk: &GroupVersionKind, key: &ObjectKey) -> Result<(), ClientError> {
        let mut store = self.lock();
        store.check_kind(gvk)?;
        let current = store
            .find(gvk, key)
            .cloned()
            .ok_or_else(|| ClientError::not_found(gvk, key.name.clone()))?;
        store.deletes += 1;

        let has_finalizers = current.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty());
        if has_finalizers {
            if current.metadata.deletion_timestamp.is_none() {
                let mut next = current.clone();
                next.metadata.deletion_timestamp = Some(now()?);
                next.metadata.resource_version = Some(store.next_resource_version());
                store.objects.entry(gvk.clone()).or_default().insert(key.clone(), next);
            }
        } else if let Some(objects) = store.objects.get_mut(gvk) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool, ClientError> {
        let store = self.lock();
        store.check_kind(gvk)?;
        Ok(!store.cluster_scoped_kinds.contains(gvk))
    }

    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &Event,
    ) -> Result<(), ClientError> {
        let event_type = match event.type_ {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        };
        self.lock().events.push(RecordedEvent {
            regarding: format!(
                "{}/{}",
                regarding.kind.as_deref().unwrap_or_default(),
                regarding.name.as_deref().unwrap_or_default()
            ),
            event_type: event_type.to_string(),
            reason: event.reason.clone(),
            note: event.note.clone(),
            action: event.action.clone(),
        });
        Ok(())
    }
}
