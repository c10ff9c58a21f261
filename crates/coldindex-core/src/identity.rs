//! Content-addressed identity for an index.
//!
//! A pure function over a canonicalized parameter tuple: canonicalize →
//! canonical JSON (RFC 8785-class: UTF-16 key ordering, integer-valued float
//! normalization, NaN/Infinity rejection) → SHA-256 → `index_set_id`.
//! No I/O; deterministic byte-for-byte across machines and runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// Explicit storage/cloud/region/endpoint identity. Never inferred: an
/// ambiguous component must be supplied by the caller or identity
/// computation fails (`IdentityUnderspecified`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub storage_provider: Option<String>,
    pub cloud_provider: Option<String>,
    pub region_kind: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub endpoint_host: Option<String>,
}

/// The canonical identity tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildParams {
    pub base_uri: String,
    pub provider: String,
    pub identity: ProviderIdentity,
    pub source_type: String,
    pub schema_version: u32,
    pub engine_version: String,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub include_hidden: bool,
    pub filters_hash: String,
    pub scope_hash: String,
    pub path_date_extraction: Option<String>,
}

/// Result of [`compute`]: the identifiers derived from a `BuildParams`, plus
/// the canonical JSON they were derived from (for `identity.json`).
#[derive(Debug, Clone)]
pub struct ComputedIdentity {
    pub index_set_id: String,
    pub dir_name: String,
    pub canonical_json: String,
}

fn validate(params: &BuildParams) -> Result<(), IdentityError> {
    let id = &params.identity;
    if id.endpoint.is_some() && id.endpoint_host.as_deref().unwrap_or("").is_empty() {
        return Err(IdentityError::Underspecified(
            "endpoint is configured but endpoint_host is empty".to_string(),
        ));
    }
    if id.region_kind.is_some() && id.region.as_deref().unwrap_or("").is_empty() {
        return Err(IdentityError::Underspecified(
            "region_kind is set but region is empty".to_string(),
        ));
    }
    Ok(())
}

fn canonicalize(params: &BuildParams) -> BuildParams {
    let mut sorted_includes = params.include_patterns.clone();
    sorted_includes.sort();
    let mut sorted_excludes = params.exclude_patterns.clone();
    sorted_excludes.sort();
    BuildParams {
        base_uri: params.base_uri.trim().to_string(),
        provider: params.provider.trim().to_string(),
        identity: ProviderIdentity {
            storage_provider: non_empty(&params.identity.storage_provider),
            cloud_provider: non_empty(&params.identity.cloud_provider),
            region_kind: non_empty(&params.identity.region_kind),
            region: non_empty(&params.identity.region),
            endpoint: non_empty(&params.identity.endpoint),
            endpoint_host: non_empty(&params.identity.endpoint_host),
        },
        source_type: params.source_type.trim().to_string(),
        schema_version: params.schema_version,
        engine_version: params.engine_version.trim().to_string(),
        include_patterns: sorted_includes,
        exclude_patterns: sorted_excludes,
        include_hidden: params.include_hidden,
        filters_hash: params.filters_hash.trim().to_string(),
        scope_hash: params.scope_hash.trim().to_string(),
        path_date_extraction: non_empty(&params.path_date_extraction),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Canonicalize one JSON value for hashing in a single descent: object keys
/// are reordered by UTF-16 code unit (RFC 8785 §3.2.3) and integer-valued
/// floats are folded to their integer representation as the tree is walked,
/// rather than as two separate passes over the value.
///
/// `path` accumulates a dotted field path purely for error reporting —
/// `BuildParams` is a small, caller-authored record, so when a number turns
/// out to be NaN/Infinity the caller needs to know *which* field misbehaved,
/// not just that canonicalization failed somewhere in the tree.
fn canonicalize_for_hashing(value: &serde_json::Value, path: &str) -> Result<serde_json::Value, IdentityError> {
    match value {
        serde_json::Value::Object(map) => {
            // Precompute each key's UTF-16 sort key once rather than
            // re-encoding both operands on every comparator call.
            let mut entries: Vec<(Vec<u16>, &String, &serde_json::Value)> = map
                .iter()
                .map(|(k, v)| (k.encode_utf16().collect(), k, v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (_, key, val) in entries {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                sorted.insert(key.clone(), canonicalize_for_hashing(val, &field_path)?);
            }
            Ok(serde_json::Value::Object(sorted))
        }
        serde_json::Value::Array(arr) => {
            let canonicalized = arr
                .iter()
                .enumerate()
                .map(|(i, v)| canonicalize_for_hashing(v, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, IdentityError>>()?;
            Ok(serde_json::Value::Array(canonicalized))
        }
        serde_json::Value::Number(n) => Ok(serde_json::Value::Number(fold_integer_valued(n, path)?)),
        other => Ok(other.clone()),
    }
}

/// Fold an integer-valued float to its integer representation; pass
/// already-integral or fractional numbers through unchanged. NaN/Infinity
/// never reach a canonical identity payload.
fn fold_integer_valued(n: &serde_json::Number, path: &str) -> Result<serde_json::Number, IdentityError> {
    if n.is_i64() || n.is_u64() {
        return Ok(n.clone());
    }
    let Some(f) = n.as_f64() else {
        return Ok(n.clone());
    };
    if !f.is_finite() {
        return Err(IdentityError::Underspecified(format!(
            "{path}: NaN/Infinity not permitted in canonical identity payload"
        )));
    }
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Ok(serde_json::Number::from(f as i64))
    } else {
        Ok(n.clone())
    }
}

fn canonical_json(value: &serde_json::Value) -> Result<String, IdentityError> {
    let canonicalized = canonicalize_for_hashing(value, "")?;
    Ok(serde_json::to_string(&canonicalized)?)
}

/// Compute `(index_set_id, dir_name, canonical_json)` for a parameter tuple.
pub fn compute(params: &BuildParams) -> Result<ComputedIdentity, IdentityError> {
    validate(params)?;
    let canonical_params = canonicalize(params);
    let value = serde_json::to_value(&canonical_params)?;
    let canonical_json = canonical_json(&value)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    let hash_hex = hex::encode(hasher.finalize());

    Ok(ComputedIdentity {
        index_set_id: format!("idx_{hash_hex}"),
        dir_name: format!("idx_{}", &hash_hex[..16]),
        canonical_json,
    })
}

/// Pick the best index set among candidates that share the same `base_uri`.
/// Tie-break order: latest successful-run end time, else latest run end
/// time at all, else `created_at`, else `index_set_id` lexical order, for
/// full determinism when every other field ties.
pub fn resolve_best_candidate<'a, T>(
    candidates: &'a [(T, Option<(chrono::DateTime<chrono::Utc>, bool)>, chrono::DateTime<chrono::Utc>, &'a str)],
) -> Option<&'a T> {
    candidates
        .iter()
        .max_by(|a, b| {
            let key = |c: &'a (T, Option<(chrono::DateTime<chrono::Utc>, bool)>, chrono::DateTime<chrono::Utc>, &'a str)| {
                let (latest_end, was_success) = c.1.map(|(t, s)| (Some(t), s)).unwrap_or((None, false));
                (latest_end, was_success, c.2, c.3)
            };
            key(a).cmp(&key(b))
        })
        .map(|(value, ..)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> BuildParams {
        BuildParams {
            base_uri: "s3://bucket/data/".to_string(),
            provider: "s3".to_string(),
            identity: ProviderIdentity {
                storage_provider: Some("s3".to_string()),
                cloud_provider: Some("aws".to_string()),
                region_kind: Some("standard".to_string()),
                region: Some("us-east-1".to_string()),
                endpoint: None,
                endpoint_host: None,
            },
            source_type: "manual".to_string(),
            schema_version: 1,
            engine_version: "0.1.0".to_string(),
            include_patterns: vec!["*.json".to_string(), "*.csv".to_string()],
            exclude_patterns: vec![],
            include_hidden: false,
            filters_hash: "f0".to_string(),
            scope_hash: "s0".to_string(),
            path_date_extraction: None,
        }
    }

    #[test]
    fn compute_is_deterministic() {
        let a = compute(&base_params()).unwrap();
        let b = compute(&base_params()).unwrap();
        assert_eq!(a.index_set_id, b.index_set_id);
        assert_eq!(a.canonical_json, b.canonical_json);
    }

    #[test]
    fn index_set_id_and_dir_name_share_prefix() {
        let id = compute(&base_params()).unwrap();
        assert!(id.index_set_id.starts_with("idx_"));
        assert!(id.dir_name.starts_with("idx_"));
        assert_eq!(id.dir_name.len(), "idx_".len() + 16);
        assert!(id.index_set_id.starts_with(&id.dir_name));
    }

    #[test]
    fn list_order_does_not_affect_identity() {
        let mut reordered = base_params();
        reordered.include_patterns = vec!["*.csv".to_string(), "*.json".to_string()];
        let a = compute(&base_params()).unwrap();
        let b = compute(&reordered).unwrap();
        assert_eq!(a.index_set_id, b.index_set_id);
    }

    #[test]
    fn semantically_significant_change_produces_new_identity() {
        let mut changed = base_params();
        changed.base_uri = "s3://other-bucket/data/".to_string();
        let a = compute(&base_params()).unwrap();
        let b = compute(&changed).unwrap();
        assert_ne!(a.index_set_id, b.index_set_id);
    }

    #[test]
    fn endpoint_without_host_is_underspecified() {
        let mut params = base_params();
        params.identity.endpoint = Some("https://minio.local".to_string());
        params.identity.endpoint_host = None;
        assert!(matches!(compute(&params), Err(IdentityError::Underspecified(_))));
    }

    #[test]
    fn region_kind_without_region_is_underspecified() {
        let mut params = base_params();
        params.identity.region_kind = Some("custom".to_string());
        params.identity.region = None;
        assert!(matches!(compute(&params), Err(IdentityError::Underspecified(_))));
    }

    #[test]
    fn whitespace_and_empty_optionals_are_dropped() {
        let mut params = base_params();
        params.base_uri = "  s3://bucket/data/  ".to_string();
        params.identity.endpoint = Some("   ".to_string());
        let a = compute(&base_params()).unwrap();
        let mut canonical_base = base_params();
        canonical_base.identity.endpoint = None;
        let b_expected = compute(&canonical_base).unwrap();
        let b = compute(&params).unwrap();
        assert_eq!(b.index_set_id, b_expected.index_set_id);
        assert_ne!(a.index_set_id, "");
    }
}
