//! Integration tests for the garbage collection action

mod common;

use common::{config_map_gvk, dashboard, deployment_gvk, object, request, CONTROLLER};
use dsc_operator::client::{ClusterClient, FakeClient, ObjectKey};
use dsc_operator::constants::{
    ANNOTATION_INSTANCE_GENERATION, ANNOTATION_INSTANCE_UID, ANNOTATION_MANAGED,
    ANNOTATION_PLATFORM_TYPE, ANNOTATION_PLATFORM_VERSION, LABEL_PART_OF,
};
use dsc_operator::controller::actions::deploy::DeployAction;
use dsc_operator::controller::actions::gc::{is_stale, GcAction};
use dsc_operator::controller::actions::Action;
use dsc_operator::resources::{controller_reference, set_annotation, set_label, set_owner_reference};
use kube::api::DynamicObject;
use serde_json::json;
use std::sync::Arc;

fn settings(name: &str, value: &str) -> DynamicObject {
    object(
        &config_map_gvk(),
        Some("opendatahub"),
        name,
        json!({"data": {"key": value}}),
    )
}

/// An object deployed by an earlier pass of `uid` at `generation`, owned by
/// that instance
fn deployed(name: &str, uid: &str, generation: i64, version: &str) -> DynamicObject {
    let mut obj = unowned(name, uid, generation, version);
    let reference = controller_reference(&dashboard(uid, generation)).unwrap();
    set_owner_reference(&mut obj, reference);
    obj
}

/// Stamped like a deployed object but without an owner reference
fn unowned(name: &str, uid: &str, generation: i64, version: &str) -> DynamicObject {
    let mut obj = settings(name, "v");
    set_label(&mut obj, LABEL_PART_OF, CONTROLLER);
    set_annotation(&mut obj, ANNOTATION_INSTANCE_UID, uid);
    set_annotation(&mut obj, ANNOTATION_INSTANCE_GENERATION, generation.to_string());
    set_annotation(&mut obj, ANNOTATION_PLATFORM_TYPE, "OpenDataHub");
    set_annotation(&mut obj, ANNOTATION_PLATFORM_VERSION, version);
    obj
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::namespaced("opendatahub", name)
}

fn names(client: &FakeClient) -> Vec<String> {
    client
        .objects(&config_map_gvk())
        .into_iter()
        .filter_map(|o| o.metadata.name)
        .collect()
}

#[tokio::test]
async fn test_staleness() {
    let client = Arc::new(FakeClient::new());
    let rr = request(client, dashboard("uid-1", 2), vec![config_map_gvk()], &[]);

    assert!(!is_stale(&rr, &deployed("current", "uid-1", 2, "1.0.0")).unwrap());
    assert!(is_stale(&rr, &deployed("old-generation", "uid-1", 1, "1.0.0")).unwrap());
    assert!(is_stale(&rr, &deployed("old-instance", "uid-0", 2, "1.0.0")).unwrap());
    assert!(is_stale(&rr, &deployed("old-release", "uid-1", 2, "0.9.0")).unwrap());
    assert!(!is_stale(&rr, &settings("untracked", "v")).unwrap());

    let mut unmanaged = deployed("unmanaged", "uid-0", 1, "0.9.0");
    set_annotation(&mut unmanaged, ANNOTATION_MANAGED, "false");
    assert!(!is_stale(&rr, &unmanaged).unwrap());

    let mut corrupt = deployed("corrupt", "uid-1", 2, "1.0.0");
    set_annotation(&mut corrupt, ANNOTATION_INSTANCE_GENERATION, "two");
    assert!(is_stale(&rr, &corrupt).is_err());
}

#[tokio::test]
async fn test_gc_deletes_stale_owned_resources() {
    let client = Arc::new(FakeClient::new().with_objects([
        deployed("current", "uid-1", 2, "1.0.0"),
        deployed("stale", "uid-1", 1, "1.0.0"),
    ]));

    let mut rr = request(client.clone(), dashboard("uid-1", 2), vec![config_map_gvk()], &[]);
    GcAction::new().run(&mut rr).await.unwrap();
    assert_eq!(names(&client).len(), 2, "gc must wait for generated resources");

    rr.generated = true;
    GcAction::new().run(&mut rr).await.unwrap();

    assert_eq!(names(&client), vec!["current"]);
    assert_eq!(client.delete_count(), 1);
}

#[tokio::test]
async fn test_gc_keeps_resources_the_instance_does_not_own() {
    let client = Arc::new(FakeClient::new().with_objects([
        unowned("adopted", "uid-1", 1, "1.0.0"),
        deployed("foreign", "uid-0", 1, "1.0.0"),
    ]));

    let mut rr = request(client.clone(), dashboard("uid-1", 2), vec![config_map_gvk()], &[]);
    rr.generated = true;
    GcAction::new().run(&mut rr).await.unwrap();

    assert_eq!(names(&client), vec!["adopted", "foreign"]);
    assert_eq!(client.delete_count(), 0);
}

#[tokio::test]
async fn test_gc_can_collect_unowned_resources() {
    let client = Arc::new(FakeClient::new().with_objects([
        unowned("adopted", "uid-1", 1, "1.0.0"),
        unowned("current", "uid-1", 2, "1.0.0"),
    ]));

    let mut rr = request(client.clone(), dashboard("uid-1", 2), vec![config_map_gvk()], &[]);
    rr.generated = true;
    GcAction::new()
        .with_only_collect_owned(false)
        .run(&mut rr)
        .await
        .unwrap();

    assert_eq!(names(&client), vec!["current"]);
}

#[tokio::test]
async fn test_create_only_objects_survive_a_generation_change() {
    let client = Arc::new(FakeClient::new());
    let mut seed = settings("seed", "initial");
    set_annotation(&mut seed, ANNOTATION_MANAGED, "false");

    for generation in [1, 2] {
        let mut rr = request(
            client.clone(),
            dashboard("uid-1", generation),
            vec![config_map_gvk()],
            &[],
        );
        rr.resources.push(seed.clone());
        rr.generated = true;
        DeployAction::new().run(&mut rr).await.unwrap();
        GcAction::new().run(&mut rr).await.unwrap();

        if generation == 1 {
            let mut edited = client.get(&config_map_gvk(), &key("seed")).await.unwrap();
            edited.data["data"]["key"] = json!("user-value");
            client.update(&edited).await.unwrap();
        }
    }

    let stored = client.get(&config_map_gvk(), &key("seed")).await.unwrap();
    assert_eq!(stored.data["data"]["key"], "user-value");
    assert_eq!(client.delete_count(), 0);
}

#[tokio::test]
async fn test_gc_skips_kinds_that_are_not_installed() {
    let client = Arc::new(FakeClient::new().without_kind(deployment_gvk()).with_objects([
        deployed("stale", "uid-1", 1, "1.0.0"),
    ]));

    let mut rr = request(
        client.clone(),
        dashboard("uid-1", 2),
        vec![deployment_gvk(), config_map_gvk()],
        &[],
    );
    rr.generated = true;
    GcAction::new().run(&mut rr).await.unwrap();

    assert!(client.objects(&config_map_gvk()).is_empty());
}
