//! Row types for the index store's fixed relational schema.
//!
//! Tables:
//! - `index_sets`: identity + provider metadata for one content-addressed index.
//! - `index_runs`: one build execution against an index set.
//! - `index_run_events`: append-only event log for a run.
//! - `objects_current`: the latest known state of every object seen.
//! - `prefix_stats`: per-run, per-prefix listing statistics (historical).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity tuple describing where and how an index's objects are stored.
///
/// Components that are ambiguous (e.g. a custom endpoint with no declared
/// host) must be supplied explicitly by the caller; the engine never infers
/// them (see `coldindex_core::identity`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub storage_provider: Option<String>,
    pub cloud_provider: Option<String>,
    pub region_kind: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub endpoint_host: Option<String>,
}

/// The identity and metadata row for an index. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSetRecord {
    pub index_set_id: String,
    pub base_uri: String,
    pub provider: String,
    pub identity: ProviderIdentity,
    pub index_build_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Terminal (and non-terminal) status of a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run's crawl input came from (mirrors the manifest's `source_type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceType(pub String);

/// A single build execution against an `IndexSet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRunRecord {
    pub run_id: String,
    pub index_set_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub acquired_at: DateTime<Utc>,
    pub source_type: String,
    pub source_snapshot_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

/// Category used to route a run event for display/alerting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Info,
    Warning,
    Error,
    Throttle,
    Access,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Info => "info",
            EventCategory::Warning => "warning",
            EventCategory::Error => "error",
            EventCategory::Throttle => "throttle",
            EventCategory::Access => "access",
        }
    }
}

/// A single append-only event recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEventRecord {
    pub event_id: String,
    pub run_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub event_category: EventCategory,
    pub detail: Option<String>,
    pub key: Option<String>,
    pub prefix: Option<String>,
    pub error_code: Option<String>,
}

/// The latest known state of an object within an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub index_set_id: String,
    pub rel_key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub last_seen_run_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Per-run, per-prefix listing statistics. Inserted once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixStatRecord {
    pub index_set_id: String,
    pub run_id: String,
    pub prefix: String,
    pub depth: u32,
    pub objects_direct: u64,
    pub bytes_direct: u64,
    pub common_prefixes: u64,
    pub truncated: bool,
    pub truncated_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_json() {
        for status in [
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Partial,
            RunStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            let back: RunStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, back);
        }
    }

    #[test]
    fn run_status_is_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Partial.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn event_category_as_str() {
        assert_eq!(EventCategory::Throttle.as_str(), "throttle");
        assert_eq!(EventCategory::Access.as_str(), "access");
    }
}
