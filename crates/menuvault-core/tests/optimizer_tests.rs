//! Integration tests for the database maintenance engine.

use menuvault_core::maintenance::{FindingStatus, IndexStatus};
use menuvault_core::reports::list_reports;
use menuvault_core::store::IndexSpec;
use menuvault_core::{
    Document, DocumentStore, IndexManager, Optimizer, OptimizerOptions, SqliteDocumentStore,
};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn seeded_store(temp: &TempDir) -> SqliteDocumentStore {
    let store = SqliteDocumentStore::create(temp.path().join("menuvault.db"))
        .await
        .expect("Failed to create store");
    let docs = [
        ("users", "u1", json!({"email": "owner@bistro.example"})),
        ("profiles", "p1", json!({"userId": "u1", "displayName": "Owner"})),
        ("restaurants", "r1", json!({"name": "Bistro", "owner": "u1", "cuisine": "french"})),
        ("menus", "m1", json!({"name": "Lunch", "restaurantId": "r1"})),
        ("menus", "m2", json!({"name": "Dinner", "restaurantId": "r-deleted"})),
        ("menuitems", "i1", json!({"name": "Soup", "menuId": "m1", "category": "starters"})),
    ];
    for (collection, id, body) in docs {
        store
            .insert(collection, Document::from_json(id, body))
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_dangling_restaurant_reference_is_one_warning() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp).await;

    let run = Optimizer::new(&store)
        .run(&OptimizerOptions::default())
        .await
        .unwrap();

    let orphaned = run
        .report
        .integrity_findings
        .iter()
        .find(|f| f.check_name == "orphanedMenus")
        .unwrap();
    assert_eq!(orphaned.issue_count, 1);
    assert_eq!(orphaned.status, FindingStatus::Warning);

    let others_ok = run
        .report
        .integrity_findings
        .iter()
        .filter(|f| f.check_name != "orphanedMenus")
        .all(|f| f.status == FindingStatus::Ok);
    assert!(others_ok);
}

#[tokio::test]
async fn test_skip_indexes_and_ttl_still_reports() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp).await;
    let reports_dir = temp.path().join("reports");

    let run = Optimizer::new(&store)
        .run(&OptimizerOptions {
            skip_indexes: true,
            skip_ttl: true,
            reports_dir: Some(reports_dir.clone()),
            ..OptimizerOptions::default()
        })
        .await
        .unwrap();

    assert!(run.report.index_results.is_empty());
    assert_eq!(run.report.collection_stats.len(), 5);
    assert_eq!(run.report.integrity_findings.len(), 6);

    let written = list_reports(&reports_dir, "optimization").unwrap();
    assert_eq!(written.len(), 1);
    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
    assert_eq!(report["indexResults"], json!([]));
    assert_eq!(report["collectionStats"].as_array().unwrap().len(), 5);
    assert!(report["integrityFindings"].is_array());
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_index_creation_is_idempotent_across_runs() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp).await;
    let options = OptimizerOptions {
        skip_settings: true,
        skip_analysis: true,
        skip_validation: true,
        ..OptimizerOptions::default()
    };

    let first = Optimizer::new(&store).run(&options).await.unwrap();
    let second = Optimizer::new(&store).run(&options).await.unwrap();

    assert!(first
        .report
        .index_results
        .iter()
        .filter(|r| !r.ttl)
        .all(|r| r.status == IndexStatus::Created));
    assert!(second
        .report
        .index_results
        .iter()
        .filter(|r| !r.ttl)
        .all(|r| r.status == IndexStatus::AlreadyExists));
}

#[tokio::test]
async fn test_ttl_index_expires_documents() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp).await;
    store
        .insert(
            "sessions",
            Document::from_json("s-old", json!({"expiresAt": "2020-01-01T00:00:00Z"})),
        )
        .await
        .unwrap();
    store
        .insert(
            "sessions",
            Document::from_json("s-new", json!({"expiresAt": "2999-01-01T00:00:00Z"})),
        )
        .await
        .unwrap();

    let results = IndexManager::new(&store).create_ttl().await;
    assert!(results
        .iter()
        .any(|r| r.name == "sessions_expiry" && r.status == IndexStatus::Created));

    let purged = store.purge_expired(chrono::Utc::now()).await.unwrap();
    assert_eq!(purged, 1);
    let remaining = store.distinct("sessions", "_id").await.unwrap();
    assert_eq!(remaining.into_iter().collect::<Vec<_>>(), vec!["s-new".to_string()]);
}

#[tokio::test]
async fn test_same_named_index_twice_reports_already_exists() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp).await;
    let spec = IndexSpec::new("menus", "menus_by_name").asc("name");

    let results = IndexManager::new(&store)
        .create_specs(&[spec.clone(), spec], false)
        .await;
    assert_eq!(results[0].status, IndexStatus::Created);
    assert_eq!(results[1].status, IndexStatus::AlreadyExists);
}
