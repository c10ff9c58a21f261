//! TOML manifest loader: the thin shell that turns a user-authored build
//! declaration into the engine's `BuildParams` and `Scope`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use coldindex_core::{BuildParams, ProviderIdentity, Scope};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub source: SourceSection,
    #[serde(default)]
    pub build: BuildSection,
    pub store: StoreSection,
}

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    pub base_uri: String,
    pub base_prefix: String,
    pub provider: String,
    /// Directory on disk standing in for the remote bucket, walked by the
    /// bundled local-filesystem provider.
    pub local_root: std::path::PathBuf,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub identity: ManifestIdentity,
}

fn default_source_type() -> String {
    "manual".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct ManifestIdentity {
    pub storage_provider: Option<String>,
    pub cloud_provider: Option<String>,
    pub region_kind: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub endpoint_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BuildSection {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_engine_version")]
    pub engine_version: String,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub filters_hash: String,
    #[serde(default)]
    pub scope_hash: String,
    #[serde(default)]
    pub path_date_extraction: Option<String>,
    /// Absence means full coverage of `base_prefix` — the convention that
    /// keeps soft-delete enabled.
    pub scope: Option<ManifestScope>,
}

fn default_schema_version() -> u32 {
    coldindex_store::migrations::CURRENT_SCHEMA_VERSION
}

fn default_engine_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManifestScope {
    PrefixList {
        prefixes: Vec<String>,
    },
    DatePartitions {
        discover_segments: usize,
        date_segment_index: usize,
        date_format: String,
        range_after: Option<NaiveDate>,
        range_before: Option<NaiveDate>,
    },
    Union {
        scopes: Vec<ManifestScope>,
    },
}

impl From<&ManifestScope> for Scope {
    fn from(value: &ManifestScope) -> Self {
        match value {
            ManifestScope::PrefixList { prefixes } => Scope::PrefixList(prefixes.clone()),
            ManifestScope::DatePartitions {
                discover_segments,
                date_segment_index,
                date_format,
                range_after,
                range_before,
            } => Scope::DatePartitions {
                discover_segments: *discover_segments,
                date_segment_index: *date_segment_index,
                date_format: date_format.clone(),
                range_after: *range_after,
                range_before: *range_before,
            },
            ManifestScope::Union { scopes } => {
                Scope::Union(scopes.iter().map(Scope::from).collect())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreSection {
    pub data_root: std::path::PathBuf,
    #[serde(default = "default_object_batch_size")]
    pub object_batch_size: usize,
    #[serde(default = "default_prefix_batch_size")]
    pub prefix_batch_size: usize,
}

fn default_object_batch_size() -> usize {
    coldindex_core::ingest::DEFAULT_OBJECT_BATCH_SIZE
}

fn default_prefix_batch_size() -> usize {
    coldindex_core::ingest::DEFAULT_PREFIX_BATCH_SIZE
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing manifest {}", path.display()))
    }

    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            base_uri: self.source.base_uri.clone(),
            provider: self.source.provider.clone(),
            identity: ProviderIdentity {
                storage_provider: self.source.identity.storage_provider.clone(),
                cloud_provider: self.source.identity.cloud_provider.clone(),
                region_kind: self.source.identity.region_kind.clone(),
                region: self.source.identity.region.clone(),
                endpoint: self.source.identity.endpoint.clone(),
                endpoint_host: self.source.identity.endpoint_host.clone(),
            },
            source_type: self.source.source_type.clone(),
            schema_version: self.build.schema_version,
            engine_version: self.build.engine_version.clone(),
            include_patterns: self.build.include_patterns.clone(),
            exclude_patterns: self.build.exclude_patterns.clone(),
            include_hidden: self.build.include_hidden,
            filters_hash: self.build.filters_hash.clone(),
            scope_hash: self.build.scope_hash.clone(),
            path_date_extraction: self.build.path_date_extraction.clone(),
        }
    }

    pub fn scope(&self) -> Option<Scope> {
        self.build.scope.as_ref().map(Scope::from)
    }

    /// Soft-delete stays enabled only when no scope narrowing was declared.
    pub fn is_full_coverage(&self) -> bool {
        self.build.scope.is_none()
    }
}
