mod common;

use common::{client, pod_json, spawn_fleet, Fleet};
use lium_common::generate_huid;
use lium_sdk::{LiumError, PodRef};

fn fleet() -> Fleet {
    Fleet {
        pods: vec![
            pod_json("pod-a", "trainer", "RUNNING", Some("10.0.0.1")),
            pod_json("pod-b", "evaluator", "PENDING", None),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn resolves_by_id_name_and_huid() {
    let (url, state) = spawn_fleet(fleet()).await;
    let lium = client(&url);

    let by_id = lium.resolve("pod-a").await.unwrap();
    assert_eq!(state.hits("pods"), 1);

    let by_name = lium.resolve("trainer").await.unwrap();
    let by_huid = lium.resolve(generate_huid("pod-a")).await.unwrap();
    assert_eq!(by_id, by_name);
    assert_eq!(by_id, by_huid);
    assert_eq!(by_id.ssh_port(), 2200);
    assert_eq!(by_id.executor_id(), Some("exec-pod-a"));

    // Served from the cache filled by the first lookup.
    assert_eq!(state.hits("pods"), 1);
}

#[tokio::test]
async fn resolving_a_pod_does_no_io() {
    let (url, state) = spawn_fleet(fleet()).await;
    let lium = client(&url);
    let pod = lium.list_pods().await.unwrap().remove(1);
    assert_eq!(state.hits("pods"), 1);

    let again = lium.resolve(&pod).await.unwrap();
    let twice = lium.resolve(PodRef::Pod(again.clone())).await.unwrap();
    assert_eq!(again, pod);
    assert_eq!(twice, pod);
    assert_eq!(state.hits("pods"), 1);
}

#[tokio::test]
async fn unknown_pod_refreshes_once() {
    let (url, state) = spawn_fleet(fleet()).await;
    let lium = client(&url);

    let err = lium.resolve("ghost").await.unwrap_err();
    assert!(matches!(err, LiumError::NotFound(ref what) if what == "pod 'ghost'"));
    assert_eq!(state.hits("pods"), 1);
}

#[tokio::test]
async fn new_pods_found_after_refresh() {
    let (url, state) = spawn_fleet(fleet()).await;
    let lium = client(&url);
    lium.list_pods().await.unwrap();

    state.with(|f| f.pods.push(pod_json("pod-c", "late", "PENDING", None)));
    let pod = lium.resolve("late").await.unwrap();
    assert_eq!(pod.id, "pod-c");
    assert_eq!(state.hits("pods"), 2);
}

#[tokio::test]
async fn pod_by_name_is_live() {
    let (url, state) = spawn_fleet(fleet()).await;
    let lium = client(&url);

    assert_eq!(lium.pod_by_name("evaluator").await.unwrap().id, "pod-b");
    let huid = generate_huid("pod-a");
    assert_eq!(lium.pod_by_name(&huid).await.unwrap().id, "pod-a");
    assert_eq!(state.hits("pods"), 2);
    assert!(matches!(lium.pod_by_name("pod-a").await, Err(LiumError::NotFound(_))));
}
