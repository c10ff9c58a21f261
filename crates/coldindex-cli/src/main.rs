//! coldindex - local inventory index for remote object stores
//!
//! ## Commands
//!
//! - `build`: crawl a scoped region once, ingest it into a durable local
//!   store under a content-addressed identity.
//! - `query`: answer glob/filter/date queries against a built index without
//!   re-listing the remote store.
//! - `purge`: permanently remove soft-deleted rows older than a cutoff.
//! - `show-identity`: print the identity a manifest would resolve to,
//!   without building anything.

mod crawl;
mod local_provider;
mod manifest;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coldindex_core::domain::CrawlOutcome;
use coldindex_core::{compute, Finalizer, IngestWriter, ScopeCaps};
use coldindex_store::{IndexLayout, IndexSetRecord, IndexStore, ProviderIdentity as StoreProviderIdentity};
use tracing::Level;

use crate::local_provider::LocalFsProvider;
use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "coldindex")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Local inventory index for remote object stores", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a scoped region once and ingest it into a durable local store
    Build {
        /// Path to the build manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Query a previously built index
    Query {
        /// Path to the build manifest this index was built from
        #[arg(short, long)]
        manifest: PathBuf,

        /// Glob pattern, evaluated relative to the source's base prefix
        #[arg(long)]
        glob: Option<String>,

        /// Regex pattern applied to the relative key
        #[arg(long)]
        regex: Option<String>,

        /// Minimum object size in bytes
        #[arg(long)]
        min_size: Option<u64>,

        /// Maximum object size in bytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Only objects modified at or after this RFC 3339 timestamp
        #[arg(long)]
        modified_after: Option<chrono::DateTime<chrono::Utc>>,

        /// Only objects modified before this RFC 3339 timestamp
        #[arg(long)]
        modified_before: Option<chrono::DateTime<chrono::Utc>>,

        /// Include soft-deleted rows
        #[arg(long)]
        include_deleted: bool,

        /// Cap the number of rows returned
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Permanently remove soft-deleted rows older than a cutoff
    Purge {
        /// Path to the build manifest this index was built from
        #[arg(short, long)]
        manifest: PathBuf,

        /// Remove rows soft-deleted more than this many days ago
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },

    /// Print the identity a manifest would resolve to, without building
    ShowIdentity {
        /// Path to the build manifest (TOML)
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    coldindex_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Build { manifest } => cmd_build(&manifest).await,
        Commands::Query {
            manifest,
            glob,
            regex,
            min_size,
            max_size,
            modified_after,
            modified_before,
            include_deleted,
            limit,
        } => {
            cmd_query(
                &manifest,
                glob,
                regex,
                min_size,
                max_size,
                modified_after,
                modified_before,
                include_deleted,
                limit,
            )
            .await
        }
        Commands::Purge { manifest, older_than_days } => cmd_purge(&manifest, older_than_days).await,
        Commands::ShowIdentity { manifest } => cmd_show_identity(&manifest),
    }
}

fn to_store_identity(identity: coldindex_core::ProviderIdentity) -> StoreProviderIdentity {
    StoreProviderIdentity {
        storage_provider: identity.storage_provider,
        cloud_provider: identity.cloud_provider,
        region_kind: identity.region_kind,
        region: identity.region,
        endpoint: identity.endpoint,
        endpoint_host: identity.endpoint_host,
    }
}

async fn open_index(manifest: &Manifest) -> Result<(IndexStore, String, IndexLayout)> {
    let build_params = manifest.build_params();
    let computed = compute(&build_params).context("computing index identity")?;
    let layout = IndexLayout::new(&manifest.store.data_root, &computed.dir_name);
    coldindex_store::identity_file::check_coherence(&layout, &computed.index_set_id)
        .context("checking identity coherence against existing index.db")?;
    let store = IndexStore::open(&layout.store_path())
        .await
        .context("opening index store")?;
    Ok((store, computed.index_set_id, layout))
}

async fn cmd_build(manifest_path: &PathBuf) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let build_params = manifest.build_params();
    let computed = compute(&build_params).context("computing index identity")?;
    let layout = IndexLayout::new(&manifest.store.data_root, &computed.dir_name);

    coldindex_store::identity_file::check_coherence(&layout, &computed.index_set_id)
        .context("checking identity coherence against existing index.db")?;
    coldindex_store::identity_file::write_identity_file(&layout, &computed.canonical_json)?;
    let manifest_toml = std::fs::read_to_string(manifest_path)?;
    coldindex_store::identity_file::write_manifest_file(&layout, &manifest_toml)?;

    let store = std::sync::Arc::new(
        IndexStore::open(&layout.store_path())
            .await
            .context("opening index store")?,
    );

    store
        .find_or_create_index_set(IndexSetRecord {
            index_set_id: computed.index_set_id.clone(),
            base_uri: manifest.source.base_uri.clone(),
            provider: manifest.source.provider.clone(),
            identity: to_store_identity(build_params.identity.clone()),
            index_build_hash: computed.index_set_id.clone(),
            created_at: chrono::Utc::now(),
        })
        .await?;

    let run = store
        .create_run(&computed.index_set_id, &manifest.source.source_type, None)
        .await?;

    let _run_span = coldindex_core::obs::RunSpan::enter(&run.run_id, &computed.index_set_id);
    coldindex_core::obs::emit_run_started(&run.run_id, &computed.index_set_id, &manifest.source.source_type);

    let provider = LocalFsProvider::new(&manifest.source.local_root);
    let scope = manifest
        .scope()
        .unwrap_or_else(|| coldindex_core::Scope::PrefixList(vec![String::new()]));
    let caps = ScopeCaps::default();
    let lister: &dyn coldindex_core::provider::DelimiterListing = &provider;
    let plan = coldindex_core::compile_scope(&scope, &manifest.source.base_prefix, Some(lister), &caps)
        .await
        .context("compiling scope")?;

    let writer = IngestWriter::with_batch_sizes(
        store.clone(),
        computed.index_set_id.clone(),
        run.run_id.clone(),
        manifest.source.base_prefix.clone(),
        manifest.store.object_batch_size,
        manifest.store.prefix_batch_size,
    );

    let listing: &dyn coldindex_core::provider::Listing = &provider;
    let outcome = match crawl::run_crawl(listing, &writer, &plan).await {
        Ok(outcome) => outcome,
        Err(e) => CrawlOutcome::Failed(e.to_string()),
    };

    writer.close().await.context("flushing ingest writer")?;
    let ingest_result = writer.result().await;

    let finalizer = Finalizer::new(store.clone());
    let partial_cause = match &outcome {
        CrawlOutcome::Failed(message) => Some(message.clone()),
        CrawlOutcome::Cancelled => Some("cancelled".to_string()),
        CrawlOutcome::Completed if ingest_result.scope_violations > 0 => {
            Some(format!("{} scope violations", ingest_result.scope_violations))
        }
        CrawlOutcome::Completed => None,
    };

    let finalize_result = finalizer
        .finalize(
            &run.run_id,
            &computed.index_set_id,
            ingest_result,
            outcome,
            manifest.is_full_coverage(),
        )
        .await;

    match finalize_result {
        Ok(outcome) => {
            coldindex_core::obs::print_summary(
                &run.run_id,
                "success",
                ingest_result.objects_ingested,
                outcome.soft_deleted,
                partial_cause.as_deref(),
            );
            Ok(())
        }
        Err(e) => {
            coldindex_core::obs::emit_finalize_error(&run.run_id, &e);
            coldindex_core::obs::print_summary(
                &run.run_id,
                "failed",
                ingest_result.objects_ingested,
                0,
                Some(&e.to_string()),
            );
            Err(e.into())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_query(
    manifest_path: &PathBuf,
    glob: Option<String>,
    regex: Option<String>,
    min_size: Option<u64>,
    max_size: Option<u64>,
    modified_after: Option<chrono::DateTime<chrono::Utc>>,
    modified_before: Option<chrono::DateTime<chrono::Utc>>,
    include_deleted: bool,
    limit: Option<usize>,
) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let (store, index_set_id, _layout) = open_index(&manifest).await?;

    let params = coldindex_store::QueryParams {
        index_set_id,
        glob,
        regex,
        min_size,
        max_size,
        modified_after,
        modified_before,
        include_deleted,
        limit,
    };

    let (rows, stats) = coldindex_store::execute_query(&store, &params)
        .await
        .context("running query")?;
    for row in &rows {
        let envelope = ObjectRecordEnvelope::wrap(row, &manifest.source.base_uri, &manifest.source.base_prefix);
        println!("{}", serde_json::to_string(&envelope)?);
    }
    eprintln!(
        "scanned={} matched={} parse_errors={}",
        stats.scanned, stats.matched, stats.parse_errors
    );
    Ok(())
}

/// The query output's record taxonomy: one envelope per line, wrapping the
/// stored row's data with a type tag and an emission timestamp.
#[derive(serde::Serialize)]
struct ObjectRecordEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    ts: String,
    data: ObjectRecordData,
}

#[derive(serde::Serialize)]
struct ObjectRecordData {
    base_uri: String,
    rel_key: String,
    key: String,
    size_bytes: u64,
    last_modified: Option<chrono::DateTime<chrono::Utc>>,
    etag: String,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ObjectRecordEnvelope {
    fn wrap(row: &coldindex_store::ObjectRecord, base_uri: &str, base_prefix: &str) -> Self {
        Self {
            kind: "coldindex.index.object.v1",
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            data: ObjectRecordData {
                base_uri: base_uri.to_string(),
                rel_key: row.rel_key.clone(),
                key: format!("{base_prefix}{}", row.rel_key),
                size_bytes: row.size_bytes,
                last_modified: row.last_modified,
                etag: row.etag.clone(),
                deleted_at: row.deleted_at,
            },
        }
    }
}

async fn cmd_purge(manifest_path: &PathBuf, older_than_days: i64) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let (store, index_set_id, _layout) = open_index(&manifest).await?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(older_than_days);
    let purged = store.purge(&index_set_id, cutoff).await?;
    println!("purged {purged} rows older than {older_than_days} days");
    Ok(())
}

fn cmd_show_identity(manifest_path: &PathBuf) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let computed = compute(&manifest.build_params()).context("computing index identity")?;
    println!("index_set_id: {}", computed.index_set_id);
    println!("dir_name: {}", computed.dir_name);
    println!("canonical_json: {}", computed.canonical_json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &std::path::Path, local_root: &std::path::Path, data_root: &std::path::Path) -> PathBuf {
        let manifest_path = dir.join("manifest.toml");
        let body = format!(
            r#"
            [source]
            base_uri = "s3://bucket/data/"
            base_prefix = ""
            provider = "s3"
            local_root = "{}"

            [store]
            data_root = "{}"
            object_batch_size = 2
            prefix_batch_size = 2
            "#,
            local_root.display(),
            data_root.display(),
        );
        fs::write(&manifest_path, body).unwrap();
        manifest_path
    }

    #[tokio::test]
    async fn build_then_query_round_trip() {
        let bucket = tempfile::tempdir().unwrap();
        fs::write(bucket.path().join("a.json"), b"{}").unwrap();
        fs::write(bucket.path().join("b.json"), b"{}").unwrap();

        let data_root = tempfile::tempdir().unwrap();
        let manifest_dir = tempfile::tempdir().unwrap();
        let manifest_path = write_manifest(manifest_dir.path(), bucket.path(), data_root.path());

        cmd_build(&manifest_path).await.unwrap();

        let manifest = Manifest::load(&manifest_path).unwrap();
        let (store, index_set_id, _layout) = open_index(&manifest).await.unwrap();
        let params = coldindex_store::QueryParams {
            index_set_id,
            glob: Some("*.json".to_string()),
            ..Default::default()
        };
        let (rows, _stats) = coldindex_store::execute_query(&store, &params).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn show_identity_computes_without_building() {
        let bucket = tempfile::tempdir().unwrap();
        let data_root = tempfile::tempdir().unwrap();
        let manifest_dir = tempfile::tempdir().unwrap();
        let manifest_path = write_manifest(manifest_dir.path(), bucket.path(), data_root.path());
        cmd_show_identity(&manifest_path).unwrap();
    }
}
