//! SQLite store tests against a temporary database file.

use chrono::{Duration, Utc};
use repo_lens::db;
use repo_lens::migrate;
use repo_lens::models::{IndexedUnit, MemoryItem, MemoryKind, StoredDocument};
use repo_lens::store::{SqliteStore, VectorStore};
use tempfile::TempDir;

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let pool = db::open(&tmp.path().join("data/lens.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    // Re-applying must be harmless.
    migrate::apply(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn unit(owner: &str, path: &str, embedding: Vec<f32>, age_secs: i64) -> IndexedUnit {
    IndexedUnit {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner.to_string(),
        path: path.to_string(),
        raw_content: format!("// {}", path),
        summary_text: format!("summary of {}", path),
        embedding,
        created_at: Utc::now() - Duration::seconds(age_secs),
    }
}

#[tokio::test]
async fn test_nearest_units_ranked_with_stable_ties() {
    let (_tmp, store) = open_store().await;
    store.insert_unit(&unit("p", "tie-a.rs", vec![0.0, 1.0], 0)).await.unwrap();
    store.insert_unit(&unit("p", "best.rs", vec![1.0, 0.0], 0)).await.unwrap();
    store.insert_unit(&unit("p", "tie-b.rs", vec![0.0, 2.0], 0)).await.unwrap();
    store.insert_unit(&unit("q", "other-owner.rs", vec![1.0, 0.0], 0)).await.unwrap();

    let matches = store.nearest_units("p", &[1.0, 0.0], 10).await.unwrap();
    let paths: Vec<&str> = matches.iter().map(|m| m.unit.path.as_str()).collect();

    assert_eq!(paths, vec!["best.rs", "tie-a.rs", "tie-b.rs"]);
    assert!((matches[0].similarity - 1.0).abs() < 1e-6);
    assert_eq!(matches[1].similarity, matches[2].similarity);
    assert_eq!(matches[0].unit.embedding, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_recent_units_newest_first() {
    let (_tmp, store) = open_store().await;
    store.insert_unit(&unit("p", "old.rs", vec![1.0], 60)).await.unwrap();
    store.insert_unit(&unit("p", "new.rs", vec![1.0], 0)).await.unwrap();
    store.insert_unit(&unit("p", "mid.rs", vec![1.0], 30)).await.unwrap();

    let recent = store.recent_units("p", 2).await.unwrap();
    let paths: Vec<&str> = recent.iter().map(|u| u.path.as_str()).collect();
    assert_eq!(paths, vec!["new.rs", "mid.rs"]);
}

#[tokio::test]
async fn test_clear_units_scoped_to_owner() {
    let (_tmp, store) = open_store().await;
    store.insert_unit(&unit("p", "a.rs", vec![1.0], 0)).await.unwrap();
    store.insert_unit(&unit("p", "b.rs", vec![1.0], 0)).await.unwrap();
    store.insert_unit(&unit("q", "c.rs", vec![1.0], 0)).await.unwrap();

    assert_eq!(store.clear_units("p").await.unwrap(), 2);
    assert_eq!(store.count_units("p").await.unwrap(), 0);
    assert_eq!(store.count_units("q").await.unwrap(), 1);
}

#[tokio::test]
async fn test_memory_items_round_trip() {
    let (_tmp, store) = open_store().await;
    for (kind, content, v) in [
        (MemoryKind::Concept, "near", vec![1.0, 0.1]),
        (MemoryKind::Relationship, "far", vec![-1.0, 0.0]),
    ] {
        store
            .insert_memory(&MemoryItem {
                id: uuid::Uuid::new_v4().to_string(),
                owner_id: "p".to_string(),
                kind,
                content: content.to_string(),
                embedding: v,
                relevance_score: 1.0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let matches = store.nearest_memories("p", &[1.0, 0.0], 1).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].item.content, "near");
    assert_eq!(matches[0].item.kind, MemoryKind::Concept);
    assert!(store.nearest_memories("q", &[1.0, 0.0], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_document_by_kind() {
    let (_tmp, store) = open_store().await;
    let now = Utc::now();
    for (kind, content, age) in [("readme", "first", 20), ("readme", "second", 10), ("technical", "tech", 0)] {
        store
            .save_document(&StoredDocument {
                id: uuid::Uuid::new_v4().to_string(),
                owner_id: "p".to_string(),
                kind: kind.to_string(),
                content: content.to_string(),
                created_at: now - Duration::seconds(age),
            })
            .await
            .unwrap();
    }

    let latest = store.latest_document("p", "readme").await.unwrap().unwrap();
    assert_eq!(latest.content, "second");
    assert!(store.latest_document("q", "readme").await.unwrap().is_none());
}
