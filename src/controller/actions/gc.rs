//! # Garbage Collection
//!
//! Deletes objects a component deployed in an earlier pass that the current
//! pass no longer produces.
//!
//! Deploy stamps every object with the instance uid and generation plus the
//! platform release. Anything labelled part of the component whose stamps do
//! not match the current request was not re-deployed by this pass, so it is
//! stale. Only kinds the controller owns are considered, and only after the
//! resources were generated in this pass.
//!
//! By default an object must also carry an owner reference to the instance.
//! Create-only objects (`opendatahub.io/managed: "false"` manifests) are
//! deployed without one, so user edits to them survive generation and
//! release changes.

use super::{Action, ActionError};
use crate::client::{ListOptions, ObjectKey};
use crate::constants::{
    ANNOTATION_INSTANCE_GENERATION, ANNOTATION_INSTANCE_UID, ANNOTATION_MANAGED,
    ANNOTATION_PLATFORM_TYPE, ANNOTATION_PLATFORM_VERSION, LABEL_PART_OF,
};
use crate::controller::types::ReconciliationRequest;
use crate::crd::PlatformObject;
use crate::observability;
use crate::resources::{annotation, gvk_string, is_owned_by};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::Resource;
use tracing::{debug, info};

#[derive(Debug)]
pub struct GcAction {
    only_collect_owned: bool,
}

impl Default for GcAction {
    fn default() -> Self {
        Self {
            only_collect_owned: true,
        }
    }
}

impl GcAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `false`, stale objects are collected whether or not the instance
    /// owns them
    #[must_use]
    pub fn with_only_collect_owned(mut self, only_owned: bool) -> Self {
        self.only_collect_owned = only_owned;
        self
    }

    fn collectable<K: PlatformObject>(
        &self,
        rr: &ReconciliationRequest<K>,
        obj: &DynamicObject,
    ) -> Result<bool, ActionError> {
        if obj.metadata.deletion_timestamp.is_some() {
            return Ok(false);
        }
        if self.only_collect_owned {
            let owned = rr
                .instance()
                .meta()
                .uid
                .as_deref()
                .is_some_and(|uid| is_owned_by(obj, uid));
            if !owned {
                return Ok(false);
            }
        }
        is_stale(rr, obj)
    }
}

/// Whether `obj` is a stale leftover of an earlier pass
pub fn is_stale<K: PlatformObject>(
    rr: &ReconciliationRequest<K>,
    obj: &DynamicObject,
) -> Result<bool, ActionError> {
    if annotation(obj, ANNOTATION_MANAGED) == Some("false") {
        return Ok(false);
    }

    let (Some(version), Some(platform), Some(generation), Some(uid)) = (
        annotation(obj, ANNOTATION_PLATFORM_VERSION),
        annotation(obj, ANNOTATION_PLATFORM_TYPE),
        annotation(obj, ANNOTATION_INSTANCE_GENERATION),
        annotation(obj, ANNOTATION_INSTANCE_UID),
    ) else {
        return Ok(false);
    };

    if version != rr.release.version || platform != rr.release.name {
        return Ok(true);
    }

    let generation: i64 = generation.parse().map_err(|e| {
        ActionError::Config(format!(
            "object {} has an invalid {ANNOTATION_INSTANCE_GENERATION} annotation: {e}",
            ObjectKey::of(obj)
        ))
    })?;

    let meta = rr.instance().meta();
    Ok(Some(uid) != meta.uid.as_deref() || Some(generation) != meta.generation)
}

#[async_trait]
impl<K: PlatformObject> Action<K> for GcAction {
    fn name(&self) -> &str {
        "gc"
    }

    async fn run(&self, rr: &mut ReconciliationRequest<K>) -> Result<(), ActionError> {
        if !rr.generated {
            debug!("resources were not generated in this pass, skipping garbage collection");
            return Ok(());
        }

        let rr = &*rr;
        let opts = ListOptions::default().labels(format!("{LABEL_PART_OF}={}", rr.controller.name));
        let mut deleted = 0usize;

        for gvk in &rr.controller.owned {
            let items = match rr.client.list(gvk, &opts).await {
                Ok(items) => items,
                Err(e) if e.is_no_match() => continue,
                Err(e) => {
                    return Err(ActionError::client(
                        format!("cannot list child resources {}", gvk_string(gvk)),
                        e,
                    ))
                }
            };

            for item in &items {
                if !self.collectable(rr, item)? {
                    continue;
                }

                let key = ObjectKey::of(item);
                info!(gvk = %gvk_string(gvk), name = %key, "delete");
                match rr.client.delete(gvk, &key).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => {
                        return Err(ActionError::client(
                            format!("cannot delete {} {key}", gvk_string(gvk)),
                            e,
                        ))
                    }
                }

                deleted += 1;
                observability::metrics::increment_gc_deleted_resources_total(&rr.controller.name);
            }
        }

        debug!(deleted, "garbage collection done");
        Ok(())
    }
}
