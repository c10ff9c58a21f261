//! Schema migrations and initialization for the index store.
//!
//! This module sets up all tables with proper indexes so the query layer's
//! prefix pushdown and the ingest writer's batched upserts have somewhere to
//! land. Migrations are forward-only and gated by a `schema_meta` version
//! row: `init_schema` is a no-op if the stored version already matches
//! [`CURRENT_SCHEMA_VERSION`].

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::Result;

/// Current schema version. Bump when adding a migration and appending a new
/// `migrate_to_vN` step below.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Initialize (or upgrade) all coldindex tables in the given SurrealDB handle.
///
/// Safe to call multiple times: each `DEFINE TABLE`/`DEFINE INDEX` statement
/// is idempotent, and the version check short-circuits once up to date.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    let current = read_schema_version(db).await?;
    if current >= CURRENT_SCHEMA_VERSION {
        debug!(version = current, "schema already at current version");
        return Ok(());
    }

    info!(from = current, to = CURRENT_SCHEMA_VERSION, "migrating index store schema");

    init_meta_table(db).await?;
    init_index_sets_table(db).await?;
    init_index_runs_table(db).await?;
    init_index_run_events_table(db).await?;
    init_objects_current_table(db).await?;
    init_prefix_stats_table(db).await?;

    write_schema_version(db, CURRENT_SCHEMA_VERSION).await?;
    info!("index store schema migration complete");
    Ok(())
}

async fn read_schema_version(db: &Surreal<Any>) -> Result<u32> {
    let sql = "SELECT version FROM schema_meta:current";
    let mut resp = db.query(sql).await?;
    let row: Option<serde_json::Value> = resp.take(0)?;
    Ok(row
        .and_then(|v| v.get("version").and_then(|v| v.as_u64()))
        .unwrap_or(0) as u32)
}

async fn write_schema_version(db: &Surreal<Any>, version: u32) -> Result<()> {
    let sql = "UPDATE schema_meta:current SET version = $version";
    db.query(sql).bind(("version", version)).await?;
    Ok(())
}

async fn init_meta_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing schema_meta table");
    let sql = r#"
        DEFINE TABLE schema_meta SCHEMAFULL;
        DEFINE FIELD version ON schema_meta TYPE int;
        UPSERT schema_meta:current SET version = 0;
    "#;
    db.query(sql).await?;
    Ok(())
}

/// `index_sets(index_set_id PK, base_uri, provider, identity tuple,
/// index_build_hash, created_at)`. Never mutated after creation; at most one
/// row per content-addressed identity.
async fn init_index_sets_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing index_sets table");
    let sql = r#"
        DEFINE TABLE index_sets SCHEMAFULL
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete FULL;

        DEFINE FIELD index_set_id ON index_sets TYPE string;
        DEFINE FIELD base_uri ON index_sets TYPE string;
        DEFINE FIELD provider ON index_sets TYPE string;
        DEFINE FIELD identity ON index_sets FLEXIBLE TYPE object;
        DEFINE FIELD index_build_hash ON index_sets TYPE string;
        DEFINE FIELD created_at ON index_sets TYPE datetime;

        DEFINE INDEX idx_index_set_id ON index_sets FIELDS index_set_id UNIQUE;
        DEFINE INDEX idx_base_uri ON index_sets FIELDS base_uri;
        DEFINE INDEX idx_base_uri_created_at ON index_sets FIELDS base_uri, created_at;
    "#;
    db.query(sql).await?;
    info!("index_sets table initialized");
    Ok(())
}

/// `index_runs(run_id PK, index_set_id FK, started_at, ended_at?, acquired_at,
/// source_type, source_snapshot_at?, status)`.
///
/// `status = running` implies `ended_at` is null; any other status implies
/// `ended_at` is set and never reverted (enforced in
/// `store::IndexStore::finalize_run`, not at the schema level).
async fn init_index_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing index_runs table");
    let sql = r#"
        DEFINE TABLE index_runs SCHEMAFULL
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD run_id ON index_runs TYPE string;
        DEFINE FIELD index_set_id ON index_runs TYPE string;
        DEFINE FIELD started_at ON index_runs TYPE datetime;
        DEFINE FIELD ended_at ON index_runs TYPE option<datetime>;
        DEFINE FIELD acquired_at ON index_runs TYPE datetime;
        DEFINE FIELD source_type ON index_runs TYPE string;
        DEFINE FIELD source_snapshot_at ON index_runs TYPE option<datetime>;
        DEFINE FIELD status ON index_runs TYPE string
            ASSERT $value INSIDE ['running', 'success', 'partial', 'failed'];

        DEFINE INDEX idx_run_id ON index_runs FIELDS run_id UNIQUE;
        DEFINE INDEX idx_run_index_set ON index_runs FIELDS index_set_id;
        DEFINE INDEX idx_run_index_set_status ON index_runs FIELDS index_set_id, status;
        DEFINE INDEX idx_run_index_set_ended_at ON index_runs FIELDS index_set_id, ended_at;
    "#;
    db.query(sql).await?;
    info!("index_runs table initialized");
    Ok(())
}

/// `index_run_events(event_id PK, run_id FK, occurred_at, event_type,
/// event_category, detail?, key?, prefix?, error_code?)`. Append-only.
async fn init_index_run_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing index_run_events table");
    let sql = r#"
        DEFINE TABLE index_run_events SCHEMAFULL
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE FIELD event_id ON index_run_events TYPE string;
        DEFINE FIELD run_id ON index_run_events TYPE string;
        DEFINE FIELD occurred_at ON index_run_events TYPE datetime;
        DEFINE FIELD event_type ON index_run_events TYPE string;
        DEFINE FIELD event_category ON index_run_events TYPE string
            ASSERT $value INSIDE ['info', 'warning', 'error', 'throttle', 'access'];
        DEFINE FIELD detail ON index_run_events TYPE option<string>;
        DEFINE FIELD key ON index_run_events TYPE option<string>;
        DEFINE FIELD prefix ON index_run_events TYPE option<string>;
        DEFINE FIELD error_code ON index_run_events TYPE option<string>;

        DEFINE INDEX idx_event_id ON index_run_events FIELDS event_id UNIQUE;
        DEFINE INDEX idx_event_run_id ON index_run_events FIELDS run_id;
        DEFINE INDEX idx_event_run_id_occurred_at ON index_run_events FIELDS run_id, occurred_at;
        DEFINE INDEX idx_event_type ON index_run_events FIELDS event_type;
        DEFINE INDEX idx_event_category ON index_run_events FIELDS event_category;
    "#;
    db.query(sql).await?;
    info!("index_run_events table initialized");
    Ok(())
}

/// `objects_current(index_set_id, rel_key, size_bytes, last_modified?, etag,
/// last_seen_run_id, last_seen_at, deleted_at?)`, composite key
/// `(index_set_id, rel_key)`, indexed for soft-delete scans and prefix
/// pushdown.
async fn init_objects_current_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing objects_current table");
    let sql = r#"
        DEFINE TABLE objects_current SCHEMAFULL
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE FIELD index_set_id ON objects_current TYPE string;
        DEFINE FIELD rel_key ON objects_current TYPE string;
        DEFINE FIELD size_bytes ON objects_current TYPE int;
        DEFINE FIELD last_modified ON objects_current TYPE option<datetime>;
        DEFINE FIELD etag ON objects_current TYPE string;
        DEFINE FIELD last_seen_run_id ON objects_current TYPE string;
        DEFINE FIELD last_seen_at ON objects_current TYPE datetime;
        DEFINE FIELD deleted_at ON objects_current TYPE option<datetime>;

        DEFINE INDEX idx_object_pk ON objects_current FIELDS index_set_id, rel_key UNIQUE;
        DEFINE INDEX idx_object_deleted ON objects_current FIELDS index_set_id, deleted_at;
        DEFINE INDEX idx_object_rel_key ON objects_current FIELDS rel_key;
        DEFINE INDEX idx_object_last_seen_run ON objects_current FIELDS last_seen_run_id;
    "#;
    db.query(sql).await?;
    info!("objects_current table initialized");
    Ok(())
}

/// `prefix_stats(index_set_id, run_id, prefix, depth, objects_direct,
/// bytes_direct, common_prefixes, truncated, truncated_reason?)`. Inserted
/// once per run per prefix; never updated.
async fn init_prefix_stats_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing prefix_stats table");
    let sql = r#"
        DEFINE TABLE prefix_stats SCHEMAFULL
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE FIELD index_set_id ON prefix_stats TYPE string;
        DEFINE FIELD run_id ON prefix_stats TYPE string;
        DEFINE FIELD prefix ON prefix_stats TYPE string;
        DEFINE FIELD depth ON prefix_stats TYPE int;
        DEFINE FIELD objects_direct ON prefix_stats TYPE int;
        DEFINE FIELD bytes_direct ON prefix_stats TYPE int;
        DEFINE FIELD common_prefixes ON prefix_stats TYPE int;
        DEFINE FIELD truncated ON prefix_stats TYPE bool;
        DEFINE FIELD truncated_reason ON prefix_stats TYPE option<string>;

        DEFINE INDEX idx_prefix_stat_pk ON prefix_stats FIELDS index_set_id, run_id, prefix UNIQUE;
        DEFINE INDEX idx_prefix_stat_run ON prefix_stats FIELDS run_id;
    "#;
    db.query(sql).await?;
    info!("prefix_stats table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mem_db() -> Surreal<Any> {
        let db = surrealdb::engine::any::connect("mem://").await.unwrap();
        db.use_ns("coldindex").use_db("test").await.unwrap();
        db
    }

    #[tokio::test]
    async fn init_schema_is_idempotent() {
        let db = mem_db().await;
        init_schema(&db).await.unwrap();
        init_schema(&db).await.unwrap();
        assert_eq!(read_schema_version(&db).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn init_schema_creates_all_tables() {
        let db = mem_db().await;
        init_schema(&db).await.unwrap();
        let mut resp = db.query("INFO FOR DB").await.unwrap();
        let info: serde_json::Value = resp.take::<Option<serde_json::Value>>(0).unwrap().unwrap();
        let tables = info.get("tables").and_then(|t| t.as_object()).unwrap();
        for table in [
            "index_sets",
            "index_runs",
            "index_run_events",
            "objects_current",
            "prefix_stats",
            "schema_meta",
        ] {
            assert!(tables.contains_key(table), "missing table {table}");
        }
    }
}
