//! Glob-and-filter query layer with prefix pushdown.
//!
//! Prefix pushdown translates the literal portion of a glob pattern into a
//! `string::starts_with(rel_key, …)` predicate the store can evaluate
//! against its `rel_key` index, instead of scanning every row in the index
//! set. This is SurrealQL's analogue of a SQL `LIKE 'prefix%' ESCAPE '\'`
//! pushdown — SurrealQL has no `LIKE`, so `string::starts_with` plays the
//! same role without needing wildcard-character escaping.

use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::error::{QueryError, QueryResult};
use crate::schema::ObjectRecord;
use crate::store::IndexStore;

/// Parameters accepted by the query layer.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub index_set_id: String,
    pub glob: Option<String>,
    pub regex: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

/// Statistics returned alongside a query's rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueryStats {
    /// Rows the store predicate returned, before client-side glob/regex filtering.
    pub scanned: u64,
    /// Rows that passed glob/regex filtering.
    pub matched: u64,
    /// Rows where `last_modified` or `deleted_at` failed to parse as a
    /// timestamp and was nulled out rather than failing the query.
    pub parse_errors: u64,
}

/// Derive the literal prefix preceding the first unescaped glob
/// metacharacter (`*`, `?`, `[`), truncated at the last path separator so the
/// pushed-down predicate never excludes a row the full glob would accept.
pub fn literal_prefix(pattern: &str) -> Option<String> {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    let mut escaped = false;
    let mut meta_at = None;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '*' || c == '?' || c == '[' {
            meta_at = Some(i);
            break;
        }
        i += 1;
    }
    let end = meta_at.unwrap_or(bytes.len());
    if end == 0 {
        return None;
    }
    let candidate = &pattern[..end];
    match candidate.rfind('/') {
        Some(sep) => {
            let prefix = &candidate[..=sep];
            if prefix.is_empty() {
                None
            } else {
                Some(prefix.to_string())
            }
        }
        None => None,
    }
}

fn compile_glob(pattern: Option<&str>) -> QueryResult<Option<GlobMatcher>> {
    let Some(pattern) = pattern else { return Ok(None) };
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| QueryError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(Some(glob.compile_matcher()))
}

fn compile_regex(pattern: Option<&str>) -> QueryResult<Option<Regex>> {
    let Some(pattern) = pattern else { return Ok(None) };
    let re = Regex::new(pattern).map_err(|source| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(Some(re))
}

struct BoundQuery {
    sql: String,
}

/// Build the shared `WHERE` predicate (everything but the final `ORDER
/// BY`/`LIMIT`), so the row path and the fast-count path stay in lockstep:
/// `COUNT` and `len(rows)` must always agree for the same filters.
fn build_where(params: &QueryParams, prefix: Option<&str>) -> BoundQuery {
    let mut sql = String::from("WHERE index_set_id = $index_set_id");
    if !params.include_deleted {
        sql.push_str(" AND deleted_at IS NONE");
    }
    if prefix.is_some() {
        sql.push_str(" AND string::starts_with(rel_key, $prefix)");
    }
    if params.min_size.is_some() {
        sql.push_str(" AND size_bytes >= $min_size");
    }
    if params.max_size.is_some() {
        sql.push_str(" AND size_bytes <= $max_size");
    }
    if params.modified_after.is_some() {
        sql.push_str(" AND last_modified >= $modified_after");
    }
    if params.modified_before.is_some() {
        sql.push_str(" AND last_modified < $modified_before");
    }
    BoundQuery { sql }
}

macro_rules! bind_common {
    ($q:expr, $params:expr, $prefix:expr) => {{
        let mut q = $q.bind(("index_set_id", $params.index_set_id.clone()));
        if let Some(p) = $prefix {
            q = q.bind(("prefix", p.to_string()));
        }
        if let Some(v) = $params.min_size {
            q = q.bind(("min_size", v));
        }
        if let Some(v) = $params.max_size {
            q = q.bind(("max_size", v));
        }
        if let Some(v) = $params.modified_after {
            q = q.bind(("modified_after", v));
        }
        if let Some(v) = $params.modified_before {
            q = q.bind(("modified_before", v));
        }
        q
    }};
}

/// Decode one raw row into an `ObjectRecord`, tolerating a malformed
/// `last_modified` or `deleted_at` rather than failing the whole row: stored
/// timestamps can originate from heterogeneous providers, and one bad value
/// must not sink the query for every other row. On the first decode attempt
/// failing, both timestamp fields are nulled out and decoding is retried;
/// a row that still doesn't decode after that is dropped.
fn decode_row_tolerant(raw: serde_json::Value) -> (Option<ObjectRecord>, bool) {
    if let Ok(record) = serde_json::from_value::<ObjectRecord>(raw.clone()) {
        return (Some(record), false);
    }
    let serde_json::Value::Object(mut fields) = raw else {
        return (None, true);
    };
    fields.insert("last_modified".to_string(), serde_json::Value::Null);
    fields.insert("deleted_at".to_string(), serde_json::Value::Null);
    match serde_json::from_value::<ObjectRecord>(serde_json::Value::Object(fields)) {
        Ok(record) => (Some(record), true),
        Err(_) => (None, true),
    }
}

/// Execute the full row-returning query: store predicate (incl. prefix
/// pushdown) first, then client-side glob/regex filtering, streaming until
/// `limit` rows have matched.
pub async fn execute_query(
    store: &IndexStore,
    params: &QueryParams,
) -> QueryResult<(Vec<ObjectRecord>, QueryStats)> {
    if params.index_set_id.is_empty() {
        return Err(QueryError::IndexSetIdRequired);
    }
    let glob_matcher = compile_glob(params.glob.as_deref())?;
    let regex_matcher = compile_regex(params.regex.as_deref())?;
    let has_client_filter = glob_matcher.is_some() || regex_matcher.is_some();
    let prefix = params.glob.as_deref().and_then(literal_prefix);

    let where_clause = build_where(params, prefix.as_deref());
    let mut sql = format!("SELECT * FROM objects_current {}", where_clause.sql);
    sql.push_str(" ORDER BY rel_key ASC");
    // Only push the limit down when no client-side filter remains.
    if !has_client_filter {
        if params.limit.is_some() {
            sql.push_str(" LIMIT $limit");
        }
    }

    let q = store.db().query(sql);
    let mut q = bind_common!(q, params, prefix.as_deref());
    if !has_client_filter {
        if let Some(limit) = params.limit {
            q = q.bind(("limit", limit as i64));
        }
    }

    let mut resp = q.await.map_err(crate::error::StoreError::from)?;
    // Decoded as raw JSON first, not straight into `ObjectRecord`: a
    // provider-supplied timestamp that fails to parse must drop that one
    // field, not the whole row or the whole query.
    let raw_rows: Vec<serde_json::Value> = resp.take(0).map_err(crate::error::StoreError::from)?;

    let mut stats = QueryStats::default();
    let mut out = Vec::new();
    for raw in raw_rows {
        let (row, had_parse_error) = decode_row_tolerant(raw);
        let Some(row) = row else { continue };
        if had_parse_error {
            stats.parse_errors += 1;
        }
        stats.scanned += 1;
        if let Some(g) = &glob_matcher {
            if !g.is_match(&row.rel_key) {
                continue;
            }
        }
        if let Some(r) = &regex_matcher {
            if !r.is_match(&row.rel_key) {
                continue;
            }
        }
        stats.matched += 1;
        out.push(row);
        if has_client_filter {
            if let Some(limit) = params.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
    }
    Ok((out, stats))
}

/// Count matches. Fast `COUNT` path when there's no client-side filter
/// (no glob, no regex); otherwise streams and counts through
/// [`execute_query`] so the two paths never disagree.
pub async fn count_query(store: &IndexStore, params: &QueryParams) -> QueryResult<u64> {
    if params.index_set_id.is_empty() {
        return Err(QueryError::IndexSetIdRequired);
    }
    if params.glob.is_none() && params.regex.is_none() {
        let where_clause = build_where(params, None);
        let sql = format!(
            "SELECT count() AS c FROM objects_current {} GROUP ALL",
            where_clause.sql
        );
        let q = store.db().query(sql);
        let q = bind_common!(q, params, None::<&str>);
        let mut resp = q.await.map_err(crate::error::StoreError::from)?;
        let row: Option<serde_json::Value> = resp.take(0).map_err(crate::error::StoreError::from)?;
        return Ok(row
            .and_then(|v| v.get("c").and_then(|c| c.as_u64()))
            .unwrap_or(0));
    }
    let unbounded = QueryParams {
        limit: None,
        ..params.clone()
    };
    let (rows, _stats) = execute_query(store, &unbounded).await?;
    Ok(rows.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_prefix_simple() {
        assert_eq!(literal_prefix("data/2025/**"), Some("data/2025/".to_string()));
        assert_eq!(literal_prefix("data/**/*.json"), Some("data/".to_string()));
        assert_eq!(literal_prefix("**"), None);
        assert_eq!(literal_prefix("*.json"), None);
        assert_eq!(literal_prefix("data/a?c"), Some("data/".to_string()));
    }

    #[test]
    fn literal_prefix_respects_escaping() {
        // The escaped star at "data/\*literal" is not a metacharacter
        // boundary; the unescaped star in "more*" is, so the prefix extends
        // up to the last separator before *that* one.
        assert_eq!(
            literal_prefix(r"data/\*literal/more*"),
            Some(r"data/\*literal/".to_string())
        );
    }

    #[test]
    fn literal_prefix_no_separator_before_meta_is_none() {
        assert_eq!(literal_prefix("abc*def"), None);
    }
}
