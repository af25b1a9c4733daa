//! Durability and query behaviour of the post store.

use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio_test::assert_ok;

use postwatch::core::{PostStore, StoreError};
use postwatch::domain::{FeedItem, PostStatus, PostUpdate};

fn item(id: &str) -> FeedItem {
    FeedItem::new(id, format!("Text of {}", id), format!("https://example.com/{}", id))
}

#[tokio::test]
async fn test_mutations_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("posts.json");

    {
        let store = PostStore::open(&path).await.unwrap();
        assert_ok!(store.insert("p1", &item("p1")).await);
        assert_ok!(
            store
                .transition(
                    "p1",
                    PostStatus::PendingApproval,
                    PostUpdate::new().token("tok1").commentary("Nice"),
                )
                .await
        );
    }

    let store = PostStore::open(&path).await.unwrap();
    let record = store.find("p1").await.unwrap();
    assert_eq!(record.status, PostStatus::PendingApproval);
    assert_eq!(record.request_token.as_deref(), Some("tok1"));
    assert_eq!(record.commentary.as_deref(), Some("Nice"));
    assert_eq!(record.text, "Text of p1");
}

#[tokio::test]
async fn test_insert_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = PostStore::open(temp.path().join("posts.json")).await.unwrap();

    assert!(store.insert("p1", &item("p1")).await.unwrap());
    store
        .transition("p1", PostStatus::Skipped, PostUpdate::new())
        .await
        .unwrap();

    // A second sighting never resets the record
    assert!(!store.insert("p1", &item("p1")).await.unwrap());
    assert_eq!(store.find("p1").await.unwrap().status, PostStatus::Skipped);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_payload_is_immutable_through_updates() {
    let temp = TempDir::new().unwrap();
    let store = PostStore::open(temp.path().join("posts.json")).await.unwrap();
    store.insert("p1", &item("p1")).await.unwrap();
    let created = store.find("p1").await.unwrap();

    let updated = store
        .transition(
            "p1",
            PostStatus::Failed,
            PostUpdate::new().error("boom").result_url("x"),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.text, created.text);
    assert_eq!(updated.url, created.url);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_queries_and_counts() {
    let temp = TempDir::new().unwrap();
    let store = PostStore::open(temp.path().join("posts.json")).await.unwrap();

    for id in ["a", "b", "c", "d"] {
        store.insert(id, &item(id)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    store
        .transition("a", PostStatus::PendingApproval, PostUpdate::new())
        .await
        .unwrap();
    store
        .transition("c", PostStatus::PendingApproval, PostUpdate::new())
        .await
        .unwrap();
    store
        .transition("d", PostStatus::Posted, PostUpdate::new())
        .await
        .unwrap();

    let pending: Vec<String> = store
        .query_by_status(PostStatus::PendingApproval)
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec!["a", "c"]);

    let recent: Vec<String> = store
        .list_recent(3)
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(recent, vec!["d", "c", "b"]);

    let counts = store.aggregate_counts().await;
    assert_eq!(counts.total, 4);
    assert_eq!(counts.pending_approval, 2);
    assert_eq!(counts.posted, 1);
    assert_eq!(counts.new, 1);
    assert_eq!(counts.failed, 0);
}

#[tokio::test]
async fn test_purge_removes_old_records_in_any_status() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("posts.json");

    {
        let store = PostStore::open(&path).await.unwrap();
        store.insert("old-pending", &item("old-pending")).await.unwrap();
        store.insert("old-posted", &item("old-posted")).await.unwrap();
        store.insert("fresh", &item("fresh")).await.unwrap();
        store
            .transition("old-posted", PostStatus::Posted, PostUpdate::new())
            .await
            .unwrap();
    }

    // Age two records by editing the file, as an operator might
    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let old = (Utc::now() - Duration::days(40)).to_rfc3339();
    for id in ["old-pending", "old-posted"] {
        json[id]["created_at"] = serde_json::Value::String(old.clone());
    }
    std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();

    let store = PostStore::open(&path).await.unwrap();
    let removed = store.purge_older_than(Duration::days(30)).await.unwrap();

    assert_eq!(removed, 2);
    assert!(store.contains("fresh").await);
    assert!(!store.contains("old-posted").await);
    assert_eq!(store.purge_older_than(Duration::days(30)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hand_edited_key_wins_over_record_id() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("posts.json");
    {
        let store = PostStore::open(&path).await.unwrap();
        store.insert("p1", &item("p1")).await.unwrap();
    }

    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    json["p1"]["id"] = serde_json::Value::String("something-else".to_string());
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    let store = PostStore::open_read_only(&path).await.unwrap();
    assert_eq!(store.find("p1").await.unwrap().id, "p1");
}

#[tokio::test]
async fn test_corrupt_file_is_a_serialization_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("posts.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = PostStore::open(&path).await.err().unwrap();
    assert!(matches!(err, StoreError::Serialization(_)));
}

#[tokio::test]
async fn test_read_only_snapshot_sees_writer_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("posts.json");
    let writer = PostStore::open(&path).await.unwrap();
    writer.insert("p1", &item("p1")).await.unwrap();

    let reader = PostStore::open_read_only(&path).await.unwrap();
    assert!(reader.contains("p1").await);
    assert!(matches!(
        reader.insert("p2", &item("p2")).await,
        Err(StoreError::ReadOnly)
    ));
}
