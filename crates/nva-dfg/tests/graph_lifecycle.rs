//! End-to-end graph behaviour against the in-memory client

use nva_client::{Fault, MemoryClient, RemoteGraph};
use nva_core::{
    BlobEntry, Conflict, Distribution, Error, Factor, Labeled, Relation, RelationKind, Variable,
};
use nva_dfg::{list_agents, DfgOptions, DfgState, NavAbilityDfg};
use std::sync::Arc;
use uuid::Uuid;

fn init_logging() {
    let _ = nva_config::init_tracing(&nva_config::LoggingConfig::default());
}

fn client() -> MemoryClient {
    init_logging();
    MemoryClient::new(Uuid::new_v4())
}

fn creating(agent: &str, graph: &str) -> DfgOptions {
    DfgOptions::new(agent, graph)
        .add_agent_if_absent(true)
        .add_graph_if_absent(true)
}

fn pose3() -> Relation {
    let d = Distribution::diagonal(vec![0.0; 6], &[0.01; 6]).unwrap();
    Relation::pose_to_pose(d).unwrap()
}

#[tokio::test]
async fn test_missing_graph_without_flag_is_not_found() {
    let c = client();
    c.add_agent("robot1").await.unwrap();

    let opts = DfgOptions::new("robot1", "session1").add_graph_if_absent(false);
    let err = NavAbilityDfg::connect(&c, opts).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(c.list_graphs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_agent_uses_default_flag() {
    let c = client();
    let err = NavAbilityDfg::connect(&c, DfgOptions::new("robot1", "session1"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_then_reopen_without_flags() {
    let c = client();
    let first = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    assert_eq!(first.state(), DfgState::Open);
    drop(first);

    let again = NavAbilityDfg::connect(&c, DfgOptions::new("robot1", "session1"))
        .await
        .unwrap();
    assert_eq!(again.state(), DfgState::Open);
    assert_eq!(c.list_graphs().await.unwrap(), vec!["session1".to_string()]);
}

#[tokio::test]
async fn test_labels_are_case_sensitive() {
    let c = client();
    NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    let err = NavAbilityDfg::connect(&c, DfgOptions::new("Robot1", "session1"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_get_variable_lifecycle() {
    let c = client();
    let mut dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();

    assert!(dfg.get_variable("x99").await.unwrap().is_none());

    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();
    let record = dfg.get_variable("x0").await.unwrap().unwrap();
    assert_eq!(record.label(), "x0");
    assert_eq!(record.agent_label(), "robot1");
    assert_eq!(record.graph_label(), "session1");
    assert_eq!(dfg.list_variables().await.unwrap(), vec!["x0".to_string()]);

    dfg.close();
    assert!(matches!(dfg.get_variable("x0").await, Err(Error::State(_))));
    dfg.close();
}

#[tokio::test]
async fn test_offline_is_connection_error_not_absence() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    c.set_fault(Some(Fault::Offline));
    let err = dfg.get_variable("x0").await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_label_accessor_is_repeatable() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    assert_eq!(dfg.label(), "session1");
    assert_eq!(dfg.label(), "session1");
    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();
    assert!(dfg.get_variable("x0").await.unwrap().is_some());
}

#[tokio::test]
async fn test_list_agents_empty_and_populated() {
    let c = client();
    assert!(list_agents(&c).await.unwrap().is_empty());

    NavAbilityDfg::connect(&c, creating("robot2", "session1"))
        .await
        .unwrap();
    NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    let agents = list_agents(&c).await.unwrap();
    let labels: Vec<&str> = agents.iter().map(|a| a.label()).collect();
    assert_eq!(labels, vec!["robot1", "robot2"]);
}

#[tokio::test]
async fn test_factor_requires_known_variables() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();

    let dangling = Factor::between("x0", "x1", pose3()).unwrap();
    assert!(dfg.add_factor(&dangling).await.unwrap_err().is_not_found());
    assert!(dfg.list_factors().await.unwrap().is_empty());

    dfg.add_variable(&Variable::new("x1", "Pose3")).await.unwrap();
    dfg.add_factor(&dangling).await.unwrap();

    let prior = Distribution::diagonal(vec![0.0; 6], &[0.1; 6]).unwrap();
    let prior = Factor::prior("x0", Relation::new(RelationKind::PriorPose3, prior).unwrap()).unwrap();
    dfg.add_factor(&prior).await.unwrap();

    let mut factors = dfg.list_factors().await.unwrap();
    factors.sort();
    assert_eq!(factors, vec!["x0f1".to_string(), "x0x1f1".to_string()]);
}

#[tokio::test]
async fn test_blob_shared_by_two_variables() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();
    dfg.add_variable(&Variable::new("x7", "Pose3")).await.unwrap();

    let first = dfg
        .attach_blob("x0", &BlobEntry::create("LEFTCAM_1", "image/jpeg"), b"frame")
        .await
        .unwrap();

    // Same bytes referenced again from another variable under a new label.
    let reused = BlobEntry::create_full(nva_core::BlobEntryFields {
        blob_id: first.blob_id().to_string(),
        origin_id: Some(first.origin_id().to_string()),
        label: "loop_closure_image".to_string(),
        blobstore: first.blobstore().to_string(),
        hash: first.hash().to_string(),
        size: first.size().map(|s| s as i64),
        mime_type: "image/jpeg".to_string(),
        ..Default::default()
    })
    .unwrap();
    let second = dfg.add_blob_entry("x7", &reused).await.unwrap();

    assert!(first.same_blob(&second));
    assert_ne!(first.id(), second.id());

    let refs = dfg.blob_references(first.blob_id()).await.unwrap();
    assert_eq!(refs.len(), 2);
    assert!(dfg.audit_blob_entries().await.unwrap().is_empty());

    let store = dfg.default_blob_store().unwrap();
    let fetched = dfg.get_blob_entry("x7", "loop_closure_image").await.unwrap().unwrap();
    assert_eq!(store.resolve(&fetched).await.unwrap(), b"frame");
    assert_eq!(c.put_count(), 1);
}

#[tokio::test]
async fn test_audit_reports_divergent_content() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();

    let stored = dfg
        .attach_blob("x0", &BlobEntry::create("scan", "application/octet-stream"), b"points")
        .await
        .unwrap();
    let liar = BlobEntry::create_full(nva_core::BlobEntryFields {
        blob_id: stored.blob_id().to_string(),
        label: "scan_copy".to_string(),
        hash: nva_core::content_hash(b"other points"),
        ..Default::default()
    })
    .unwrap();
    dfg.add_agent_entry(&liar).await.unwrap();

    let conflicts = dfg.audit_blob_entries().await.unwrap();
    assert!(matches!(
        conflicts.as_slice(),
        [Conflict::DivergentContent { blob_id, .. }] if *blob_id == stored.blob_id()
    ));
}

#[tokio::test]
async fn test_agent_entries_and_metadata() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();

    let map = dfg
        .add_agent_entry(&BlobEntry::create("map", "application/octet-stream"))
        .await
        .unwrap();
    dfg.add_agent_entry(&BlobEntry::create("calibration", "application/json"))
        .await
        .unwrap();

    let json = dfg.list_agent_entries(Some("json")).await.unwrap();
    assert_eq!(json.len(), 1);
    assert_eq!(json[0].label(), "calibration");
    assert_eq!(dfg.list_agent_entries(None).await.unwrap().len(), 2);

    let updated = dfg.update_blob_entry_metadata(&map, "eyJ2IjoyfQ==").await.unwrap();
    assert_eq!(updated.metadata(), "eyJ2IjoyfQ==");
    let stored = dfg.list_agent_entries(Some("octet")).await.unwrap();
    assert_eq!(stored[0].metadata(), "eyJ2IjoyfQ==");

    dfg.delete_blob_entry(&map).await.unwrap();
    assert_eq!(dfg.list_agent_entries(None).await.unwrap().len(), 1);

    let unsaved = BlobEntry::create("draft", "text/plain");
    assert!(matches!(
        dfg.delete_blob_entry(&unsaved).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_blobless_entry_on_variable() {
    let c = client();
    let dfg = NavAbilityDfg::connect(&c, creating("robot1", "session1"))
        .await
        .unwrap();
    dfg.add_variable(&Variable::new("x0", "Pose3")).await.unwrap();

    let marker = dfg
        .add_blob_entry("x0", &BlobEntry::create("keyframe", "text/plain"))
        .await
        .unwrap();
    assert!(marker.is_blobless());

    let store = dfg.default_blob_store().unwrap();
    assert!(store.resolve(&marker).await.unwrap_err().is_not_found());
    assert!(dfg.get_blob_entry("x0", "missing").await.unwrap().is_none());
    assert!(dfg.get_blob_entry("x9", "keyframe").await.unwrap().is_none());

    let dup = dfg
        .add_blob_entry("x0", &BlobEntry::create("keyframe", "text/plain"))
        .await
        .unwrap_err();
    assert!(matches!(dup, Error::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handles_usable_concurrently() {
    let c = Arc::new(client());
    NavAbilityDfg::connect(c.as_ref(), creating("robot1", "session1"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for agent in ["robot1", "robot2", "robot3", "robot4"] {
        let c = Arc::clone(&c);
        tasks.push(tokio::spawn(async move {
            let dfg = NavAbilityDfg::connect(c.as_ref(), creating(agent, "session1"))
                .await
                .unwrap();
            for i in 0..5 {
                let label = format!("x{}", i);
                dfg.add_variable(&Variable::new(&label, "Pose3")).await.unwrap();
                assert!(dfg.get_variable(&label).await.unwrap().is_some());
            }
            dfg.list_variables().await.unwrap().len()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), 5);
    }
    assert_eq!(list_agents(c.as_ref()).await.unwrap().len(), 4);
    assert_eq!(c.list_graphs().await.unwrap(), vec!["session1".to_string()]);
}
