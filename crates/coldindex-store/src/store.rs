//! The embedded, durable, single-writer index store.
//!
//! A store is opened by local file path (or `mem://` for tests). Exactly
//! one write connection is used at a time; concurrent writers serialize
//! behind a bounded busy-wait rather than failing immediately, matching the
//! single-writer/many-reader discipline a WAL-journaled embedded database
//! gives for free. SurrealDB's own MVCC engine doesn't need this to stay
//! correct, but the contract (bounded busy-wait, `StoreError::LockTimeout`
//! on exhaustion) is reimplemented explicitly here with a
//! `tokio::sync::Mutex` guarding every write path.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::migrations;
use crate::schema::{
    IndexRunRecord, IndexSetRecord, ObjectRecord, PrefixStatRecord, RunEventRecord, RunStatus,
};
use crate::Result;

/// Default bound on how long a caller waits for the write lock before
/// receiving [`StoreError::LockTimeout`] (roughly 5s).
pub const DEFAULT_BUSY_WAIT: Duration = Duration::from_secs(5);

/// An open handle to one index's durable store.
pub struct IndexStore {
    db: Surreal<Any>,
    write_lock: Mutex<()>,
    busy_wait: Duration,
}

impl IndexStore {
    /// Open (or create) a store at `path`, creating parent directories as
    /// needed, and run pending migrations.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with_busy_wait(path, DEFAULT_BUSY_WAIT).await
    }

    pub async fn open_with_busy_wait(path: &Path, busy_wait: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let endpoint = format!("surrealkv://{}", path.display());
        let db = surrealdb::engine::any::connect(&endpoint)
            .await
            .map_err(|source| StoreError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?;
        Self::finish_open(db, busy_wait).await
    }

    /// Open a purely in-memory store, for tests and short-lived query
    /// sessions that never need to persist.
    pub async fn open_in_memory() -> Result<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|source| StoreError::OpenFailed {
                path: "mem://".to_string(),
                source,
            })?;
        Self::finish_open(db, DEFAULT_BUSY_WAIT).await
    }

    async fn finish_open(db: Surreal<Any>, busy_wait: Duration) -> Result<Self> {
        db.use_ns("coldindex")
            .use_db("index")
            .await
            .map_err(|source| StoreError::OpenFailed {
                path: "<namespace selection>".to_string(),
                source,
            })?;
        migrations::init_schema(&db)
            .await
            .map_err(|e| match e {
                StoreError::Query(source) => StoreError::MigrationFailed {
                    version: migrations::CURRENT_SCHEMA_VERSION,
                    source,
                },
                other => other,
            })?;
        info!("index store opened");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            busy_wait,
        })
    }

    /// Acquire the single write slot, bounded by the configured busy-wait.
    async fn acquire_write(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        match tokio::time::timeout(self.busy_wait, self.write_lock.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(StoreError::LockTimeout {
                waited_ms: self.busy_wait.as_millis() as u64,
            }),
        }
    }

    // -- index sets ----------------------------------------------------

    /// Return the existing index set for `index_set_id`, or create it from
    /// `candidate` if absent. Never mutates an existing row.
    #[instrument(skip_all, fields(index_set_id = %candidate.index_set_id))]
    pub async fn find_or_create_index_set(
        &self,
        candidate: IndexSetRecord,
    ) -> Result<IndexSetRecord> {
        if let Some(existing) = self.get_index_set(&candidate.index_set_id).await? {
            return Ok(existing);
        }
        let _guard = self.acquire_write().await?;
        // Re-check under the lock: another writer may have created it while
        // we waited.
        if let Some(existing) = self.get_index_set(&candidate.index_set_id).await? {
            return Ok(existing);
        }
        let sql = r#"
            CREATE type::thing("index_sets", $id) CONTENT $content
        "#;
        self.db
            .query(sql)
            .bind(("id", candidate.index_set_id.clone()))
            .bind(("content", candidate.clone()))
            .await?;
        debug!("created new index set");
        Ok(candidate)
    }

    pub async fn get_index_set(&self, index_set_id: &str) -> Result<Option<IndexSetRecord>> {
        let sql = "SELECT * FROM type::thing('index_sets', $id)";
        let mut resp = self.db.query(sql).bind(("id", index_set_id.to_string())).await?;
        let row: Option<IndexSetRecord> = resp.take(0)?;
        Ok(row)
    }

    /// Most recently created index set whose `base_uri` matches.
    /// Cross-store tie-breaking (multiple stores with the same base_uri) is
    /// layered on top by `coldindex_core::identity::resolve_best_candidate`.
    pub async fn get_index_set_by_base_uri(
        &self,
        base_uri: &str,
    ) -> Result<Option<IndexSetRecord>> {
        let sql = r#"
            SELECT * FROM index_sets
            WHERE base_uri = $base_uri
            ORDER BY created_at DESC
            LIMIT 1
        "#;
        let mut resp = self.db.query(sql).bind(("base_uri", base_uri.to_string())).await?;
        let rows: Vec<IndexSetRecord> = resp.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// The end time of the most recent run against this index set, and
    /// whether that run succeeded — inputs to the cross-store resolver's
    /// tie-break ordering.
    pub async fn latest_run_summary(
        &self,
        index_set_id: &str,
    ) -> Result<Option<(DateTime<Utc>, bool)>> {
        let sql = r#"
            SELECT ended_at, status FROM index_runs
            WHERE index_set_id = $id AND ended_at IS NOT NONE
            ORDER BY ended_at DESC
            LIMIT 1
        "#;
        let mut resp = self.db.query(sql).bind(("id", index_set_id.to_string())).await?;
        let rows: Vec<IndexRunRecord> = resp.take(0)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.ended_at.map(|t| (t, r.status == RunStatus::Success))))
    }

    // -- runs ------------------------------------------------------------

    /// Start a new run. `status = running`, `ended_at = None`.
    #[instrument(skip_all, fields(index_set_id = %index_set_id))]
    pub async fn create_run(
        &self,
        index_set_id: &str,
        source_type: &str,
        source_snapshot_at: Option<DateTime<Utc>>,
    ) -> Result<IndexRunRecord> {
        let _guard = self.acquire_write().await?;
        let now = Utc::now();
        let run = IndexRunRecord {
            run_id: format!("run_{}", Uuid::new_v4()),
            index_set_id: index_set_id.to_string(),
            started_at: now,
            ended_at: None,
            acquired_at: now,
            source_type: source_type.to_string(),
            source_snapshot_at,
            status: RunStatus::Running,
        };
        let sql = r#"CREATE type::thing("index_runs", $id) CONTENT $content"#;
        self.db
            .query(sql)
            .bind(("id", run.run_id.clone()))
            .bind(("content", run.clone()))
            .await?;
        info!(run_id = %run.run_id, "run started");
        Ok(run)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<IndexRunRecord>> {
        let sql = "SELECT * FROM type::thing('index_runs', $id)";
        let mut resp = self.db.query(sql).bind(("id", run_id.to_string())).await?;
        Ok(resp.take(0)?)
    }

    /// Transition a run to a terminal status. Once terminal, never reverted
    /// — enforced here by refusing to touch an already terminal run.
    #[instrument(skip_all, fields(run_id = %run_id, status = %status))]
    pub async fn finalize_run(&self, run_id: &str, status: RunStatus) -> Result<IndexRunRecord> {
        if status == RunStatus::Running {
            return Err(StoreError::InvalidRunState {
                run_id: run_id.to_string(),
                actual: "running".to_string(),
                expected: "success|partial|failed".to_string(),
            });
        }
        let _guard = self.acquire_write().await?;
        let existing = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        if existing.status.is_terminal() {
            return Err(StoreError::InvalidRunState {
                run_id: run_id.to_string(),
                actual: existing.status.to_string(),
                expected: "running".to_string(),
            });
        }
        let ended_at = Utc::now();
        let sql = r#"
            UPDATE type::thing("index_runs", $id)
            SET status = $status, ended_at = $ended_at
        "#;
        let mut resp = self
            .db
            .query(sql)
            .bind(("id", run_id.to_string()))
            .bind(("status", status.as_str()))
            .bind(("ended_at", ended_at))
            .await?;
        let rows: Vec<IndexRunRecord> = resp.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    // -- events ------------------------------------------------------------

    /// Append one run event. This is a single short write, not part of the
    /// object-batch transaction, so it never blocks successful ingestion.
    pub async fn append_event(&self, event: RunEventRecord) -> Result<()> {
        let _guard = self.acquire_write().await?;
        let sql = r#"CREATE type::thing("index_run_events", $id) CONTENT $content"#;
        self.db
            .query(sql)
            .bind(("id", event.event_id.clone()))
            .bind(("content", event))
            .await?;
        Ok(())
    }

    pub async fn events_for_run(&self, run_id: &str) -> Result<Vec<RunEventRecord>> {
        let sql = r#"
            SELECT * FROM index_run_events
            WHERE run_id = $run_id
            ORDER BY occurred_at ASC
        "#;
        let mut resp = self.db.query(sql).bind(("run_id", run_id.to_string())).await?;
        Ok(resp.take(0)?)
    }

    pub async fn scope_violation_count(&self, run_id: &str) -> Result<u64> {
        let sql = r#"
            SELECT count() FROM index_run_events
            WHERE run_id = $run_id AND event_type = 'scope_violation'
            GROUP ALL
        "#;
        let mut resp = self.db.query(sql).bind(("run_id", run_id.to_string())).await?;
        let row: Option<serde_json::Value> = resp.take(0)?;
        Ok(row
            .and_then(|v| v.get("count").and_then(|c| c.as_u64()))
            .unwrap_or(0))
    }

    // -- objects -----------------------------------------------------------

    /// Upsert a batch of object rows in a single transaction. Conflict on
    /// `(index_set_id, rel_key)` updates size/etag/last_modified/last_seen
    /// and clears `deleted_at` (restore-on-sighting).
    #[instrument(skip_all, fields(count = objects.len()))]
    pub async fn upsert_objects_batch(&self, objects: &[ObjectRecord]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }
        let _guard = self.acquire_write().await?;
        let sql = r#"
            BEGIN TRANSACTION;
            FOR $obj IN $objects {
                LET $id = type::thing("objects_current", [$obj.index_set_id, $obj.rel_key]);
                UPSERT $id MERGE {
                    index_set_id: $obj.index_set_id,
                    rel_key: $obj.rel_key,
                    size_bytes: $obj.size_bytes,
                    last_modified: $obj.last_modified,
                    etag: $obj.etag,
                    last_seen_run_id: $obj.last_seen_run_id,
                    last_seen_at: $obj.last_seen_at,
                    deleted_at: NONE,
                };
            };
            COMMIT TRANSACTION;
        "#;
        self.db
            .query(sql)
            .bind(("objects", objects.to_vec()))
            .await
            .map_err(StoreError::FatalFlush)?;
        Ok(())
    }

    /// Insert a batch of prefix-stat rows. Insert-only: never updated.
    #[instrument(skip_all, fields(count = stats.len()))]
    pub async fn insert_prefix_stats_batch(&self, stats: &[PrefixStatRecord]) -> Result<()> {
        if stats.is_empty() {
            return Ok(());
        }
        let _guard = self.acquire_write().await?;
        let sql = r#"
            BEGIN TRANSACTION;
            FOR $stat IN $stats {
                LET $id = type::thing("prefix_stats", [$stat.index_set_id, $stat.run_id, $stat.prefix]);
                CREATE $id CONTENT $stat;
            };
            COMMIT TRANSACTION;
        "#;
        self.db
            .query(sql)
            .bind(("stats", stats.to_vec()))
            .await
            .map_err(StoreError::FatalFlush)?;
        Ok(())
    }

    /// Soft-delete every live object in `index_set_id` that was not seen by
    /// `run_id`. Caller (the finalizer) is responsible for only invoking this
    /// when the run's status is `success` — the store itself
    /// does not gate on run status so it stays a pure data operation.
    #[instrument(skip_all, fields(index_set_id = %index_set_id, run_id = %run_id))]
    pub async fn soft_delete_unseen(
        &self,
        index_set_id: &str,
        run_id: &str,
        run_started_at: DateTime<Utc>,
    ) -> Result<u64> {
        let _guard = self.acquire_write().await?;
        let sql = r#"
            UPDATE objects_current
            SET deleted_at = $started_at
            WHERE index_set_id = $index_set_id
              AND deleted_at IS NONE
              AND last_seen_run_id != $run_id
        "#;
        let mut resp = self
            .db
            .query(sql)
            .bind(("index_set_id", index_set_id.to_string()))
            .bind(("run_id", run_id.to_string()))
            .bind(("started_at", run_started_at))
            .await?;
        let rows: Vec<ObjectRecord> = resp.take(0)?;
        let count = rows.len() as u64;
        if count > 0 {
            warn!(count, "soft-deleted objects not seen in this run");
        }
        Ok(count)
    }

    /// Permanently remove soft-deleted rows older than `older_than`.
    #[instrument(skip_all, fields(index_set_id = %index_set_id))]
    pub async fn purge(&self, index_set_id: &str, older_than: DateTime<Utc>) -> Result<u64> {
        let _guard = self.acquire_write().await?;
        let sql = r#"
            DELETE objects_current
            WHERE index_set_id = $index_set_id
              AND deleted_at IS NOT NONE
              AND deleted_at < $older_than
            RETURN BEFORE
        "#;
        let mut resp = self
            .db
            .query(sql)
            .bind(("index_set_id", index_set_id.to_string()))
            .bind(("older_than", older_than))
            .await?;
        let rows: Vec<ObjectRecord> = resp.take(0)?;
        Ok(rows.len() as u64)
    }

    /// Direct access to the underlying handle for the query layer, which
    /// needs to build ad hoc `SELECT` statements with pushdown predicates.
    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ProviderIdentity;

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            storage_provider: Some("s3".into()),
            cloud_provider: Some("aws".into()),
            region_kind: Some("standard".into()),
            region: Some("us-east-1".into()),
            endpoint: None,
            endpoint_host: None,
        }
    }

    fn index_set(id: &str) -> IndexSetRecord {
        IndexSetRecord {
            index_set_id: id.to_string(),
            base_uri: "s3://bucket/data/".to_string(),
            provider: "s3".to_string(),
            identity: identity(),
            index_build_hash: "deadbeef".to_string(),
            created_at: Utc::now(),
        }
    }

    fn object(index_set_id: &str, rel_key: &str, run_id: &str) -> ObjectRecord {
        ObjectRecord {
            index_set_id: index_set_id.to_string(),
            rel_key: rel_key.to_string(),
            size_bytes: 100,
            last_modified: Some(Utc::now()),
            etag: "etag1".to_string(),
            last_seen_run_id: run_id.to_string(),
            last_seen_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn find_or_create_index_set_is_idempotent() {
        let store = IndexStore::open_in_memory().await.unwrap();
        let candidate = index_set("idx_abc");
        let first = store.find_or_create_index_set(candidate.clone()).await.unwrap();
        let second = store.find_or_create_index_set(candidate.clone()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn run_lifecycle_running_to_success() {
        let store = IndexStore::open_in_memory().await.unwrap();
        store.find_or_create_index_set(index_set("idx_abc")).await.unwrap();
        let run = store.create_run("idx_abc", "manual", None).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.ended_at.is_none());

        let finalized = store.finalize_run(&run.run_id, RunStatus::Success).await.unwrap();
        assert_eq!(finalized.status, RunStatus::Success);
        assert!(finalized.ended_at.is_some());
    }

    #[tokio::test]
    async fn finalize_run_twice_fails() {
        let store = IndexStore::open_in_memory().await.unwrap();
        store.find_or_create_index_set(index_set("idx_abc")).await.unwrap();
        let run = store.create_run("idx_abc", "manual", None).await.unwrap();
        store.finalize_run(&run.run_id, RunStatus::Success).await.unwrap();
        let second = store.finalize_run(&run.run_id, RunStatus::Failed).await;
        assert!(matches!(second, Err(StoreError::InvalidRunState { .. })));
    }

    #[tokio::test]
    async fn upsert_then_soft_delete_then_restore() {
        let store = IndexStore::open_in_memory().await.unwrap();
        store.find_or_create_index_set(index_set("idx_abc")).await.unwrap();

        let run1 = store.create_run("idx_abc", "manual", None).await.unwrap();
        store
            .upsert_objects_batch(&[
                object("idx_abc", "f1.txt", &run1.run_id),
                object("idx_abc", "f2.txt", &run1.run_id),
                object("idx_abc", "f3.txt", &run1.run_id),
            ])
            .await
            .unwrap();
        store.finalize_run(&run1.run_id, RunStatus::Success).await.unwrap();

        // Run 2 only sees f1, f2.
        let run2 = store.create_run("idx_abc", "manual", None).await.unwrap();
        store
            .upsert_objects_batch(&[
                object("idx_abc", "f1.txt", &run2.run_id),
                object("idx_abc", "f2.txt", &run2.run_id),
            ])
            .await
            .unwrap();
        let run2 = store.finalize_run(&run2.run_id, RunStatus::Success).await.unwrap();
        let deleted = store
            .soft_delete_unseen("idx_abc", &run2.run_id, run2.started_at)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        // f3 is now soft-deleted; seeing it again in run 3 restores it.
        let run3 = store.create_run("idx_abc", "manual", None).await.unwrap();
        store
            .upsert_objects_batch(&[object("idx_abc", "f3.txt", &run3.run_id)])
            .await
            .unwrap();

        let sql = "SELECT * FROM type::thing('objects_current', ['idx_abc', 'f3.txt'])";
        let mut resp = store.db().query(sql).await.unwrap();
        let row: Option<ObjectRecord> = resp.take(0).unwrap();
        assert!(row.unwrap().deleted_at.is_none());
    }

    #[tokio::test]
    async fn purge_removes_old_soft_deleted_rows_only() {
        let store = IndexStore::open_in_memory().await.unwrap();
        store.find_or_create_index_set(index_set("idx_abc")).await.unwrap();
        let run1 = store.create_run("idx_abc", "manual", None).await.unwrap();
        store
            .upsert_objects_batch(&[object("idx_abc", "old.txt", &run1.run_id)])
            .await
            .unwrap();
        let run1 = store.finalize_run(&run1.run_id, RunStatus::Success).await.unwrap();

        let run2 = store.create_run("idx_abc", "manual", None).await.unwrap();
        let run2 = store.finalize_run(&run2.run_id, RunStatus::Success).await.unwrap();
        store
            .soft_delete_unseen("idx_abc", &run2.run_id, run1.started_at)
            .await
            .unwrap();

        let future_cutoff = run2.started_at + chrono::Duration::seconds(1);
        let purged = store.purge("idx_abc", future_cutoff).await.unwrap();
        assert_eq!(purged, 1);
    }
}
