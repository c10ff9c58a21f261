//! Domain-level sightings the crawler reports to the ingest writer — distinct
//! from `coldindex_store::schema::ObjectRecord`/`PrefixStatRecord`, which are
//! the store's on-disk shape. The writer translates one into the other.

use chrono::{DateTime, Utc};

/// One object as observed during a crawl, keyed by its full remote key (not
/// yet stripped to `rel_key` — that happens in `ingest::IngestWriter`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSighting {
    pub key: String,
    pub size_bytes: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Per-prefix listing statistics reported once per prefix per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSighting {
    pub prefix: String,
    pub depth: u32,
    pub objects_direct: u64,
    pub bytes_direct: u64,
    pub common_prefixes: u64,
    pub truncated: bool,
    pub truncated_reason: Option<String>,
}
