//! Store-level scenarios: build a small object set directly through the
//! store API (bypassing the ingest writer, which has its own unit tests) and
//! check the query layer's prefix pushdown and count path against it.

use std::sync::Arc;

use chrono::Utc;
use coldindex_store::{
    count_query, execute_query, IndexSetRecord, IndexStore, ObjectRecord, ProviderIdentity,
    QueryParams,
};

async fn store_with_objects(index_set_id: &str, keys: &[(&str, u64)]) -> Arc<IndexStore> {
    let store = Arc::new(IndexStore::open_in_memory().await.unwrap());
    store
        .find_or_create_index_set(IndexSetRecord {
            index_set_id: index_set_id.to_string(),
            base_uri: "s3://bucket/data/".to_string(),
            provider: "s3".to_string(),
            identity: ProviderIdentity::default(),
            index_build_hash: "hash".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let run = store.create_run(index_set_id, "manual", None).await.unwrap();
    let records: Vec<ObjectRecord> = keys
        .iter()
        .map(|(key, size)| ObjectRecord {
            index_set_id: index_set_id.to_string(),
            rel_key: key.to_string(),
            size_bytes: *size,
            last_modified: Some(Utc::now()),
            etag: "etag".to_string(),
            last_seen_run_id: run.run_id.clone(),
            last_seen_at: Utc::now(),
            deleted_at: None,
        })
        .collect();
    store.upsert_objects_batch(&records).await.unwrap();
    store
}

/// Initial build and query: a query for `**/*.json` over a small mixed set
/// returns only the JSON rows, and the count path agrees with the row count.
#[tokio::test]
async fn initial_build_and_query_returns_only_matching_rows() {
    let store = store_with_objects(
        "idx_a",
        &[
            ("2025/01/a.json", 100),
            ("2025/01/b.xml", 200),
            ("2025/02/c.json", 300),
        ],
    )
    .await;

    let params = QueryParams {
        index_set_id: "idx_a".to_string(),
        glob: Some("**/*.json".to_string()),
        ..Default::default()
    };
    let (rows, stats) = execute_query(&store, &params).await.unwrap();
    let mut keys: Vec<&str> = rows.iter().map(|r| r.rel_key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["2025/01/a.json", "2025/02/c.json"]);
    assert_eq!(stats.matched, 2);

    let count = count_query(&store, &params).await.unwrap();
    assert_eq!(count, 2);
}

/// Prefix pushdown must be an optimization, never a correctness difference:
/// a pattern whose literal prefix narrows the store scan must return exactly
/// the same rows as the equivalent pattern with no extractable prefix.
#[tokio::test]
async fn glob_prefix_pushdown_matches_unpushed_scan() {
    let mut keys: Vec<(String, u64)> = Vec::new();
    for year in ["2024", "2025"] {
        for i in 0..250 {
            keys.push((format!("{year}/{i:04}.bin"), i as u64));
        }
    }
    let borrowed: Vec<(&str, u64)> = keys.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let store = store_with_objects("idx_f", &borrowed).await;

    let pushed = QueryParams {
        index_set_id: "idx_f".to_string(),
        glob: Some("2025/**".to_string()),
        ..Default::default()
    };
    let (pushed_rows, _) = execute_query(&store, &pushed).await.unwrap();

    // No extractable literal prefix, so the store predicate can't narrow the
    // scan; client-side glob filtering must still land on the same set.
    let unpushed = QueryParams {
        index_set_id: "idx_f".to_string(),
        glob: Some("**".to_string()),
        ..Default::default()
    };
    let (all_rows, _) = execute_query(&store, &unpushed).await.unwrap();
    let unpushed_rows: Vec<_> = all_rows
        .into_iter()
        .filter(|r| r.rel_key.starts_with("2025/"))
        .collect();

    let mut pushed_keys: Vec<&str> = pushed_rows.iter().map(|r| r.rel_key.as_str()).collect();
    let mut unpushed_keys: Vec<&str> = unpushed_rows.iter().map(|r| r.rel_key.as_str()).collect();
    pushed_keys.sort();
    unpushed_keys.sort();
    assert_eq!(pushed_keys.len(), 250);
    assert_eq!(pushed_keys, unpushed_keys);
}

/// Soft-deleted rows stay invisible to default queries but remain countable
/// with `include_deleted`, and disappear permanently once purged.
#[tokio::test]
async fn purge_removes_rows_soft_deleted_before_the_cutoff() {
    let store = store_with_objects("idx_purge", &[("stale.txt", 1), ("fresh.txt", 2)]).await;
    let old_run = store.create_run("idx_purge", "manual", None).await.unwrap();
    store.finalize_run(&old_run.run_id, coldindex_store::RunStatus::Success).await.unwrap();

    let cutoff_marker = Utc::now();
    let run2 = store.create_run("idx_purge", "manual", None).await.unwrap();
    // Only "fresh.txt" is seen again; "stale.txt" is soft-deleted as of run2.
    store
        .upsert_objects_batch(&[ObjectRecord {
            index_set_id: "idx_purge".to_string(),
            rel_key: "fresh.txt".to_string(),
            size_bytes: 2,
            last_modified: Some(Utc::now()),
            etag: "etag".to_string(),
            last_seen_run_id: run2.run_id.clone(),
            last_seen_at: Utc::now(),
            deleted_at: None,
        }])
        .await
        .unwrap();
    store.soft_delete_unseen("idx_purge", &run2.run_id, cutoff_marker).await.unwrap();

    let visible = count_query(
        &store,
        &QueryParams { index_set_id: "idx_purge".to_string(), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(visible, 1);

    let including_deleted = count_query(
        &store,
        &QueryParams {
            index_set_id: "idx_purge".to_string(),
            include_deleted: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(including_deleted, 2);

    // Purge with a cutoff before the soft-delete: nothing eligible yet.
    let purged_none = store.purge("idx_purge", cutoff_marker).await.unwrap();
    assert_eq!(purged_none, 0);

    // Purge with a cutoff after it: the soft-deleted row is gone for good.
    let purged = store.purge("idx_purge", Utc::now()).await.unwrap();
    assert_eq!(purged, 1);
    let including_deleted_after_purge = count_query(
        &store,
        &QueryParams {
            index_set_id: "idx_purge".to_string(),
            include_deleted: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(including_deleted_after_purge, 1);
}
