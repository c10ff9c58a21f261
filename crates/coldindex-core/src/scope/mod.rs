//! Scope planner: compiles a declarative scope into a bounded,
//! explicit list of literal crawl prefixes.

pub mod plan;

use chrono::NaiveDate;

use crate::error::ScopeError;
use crate::provider::DelimiterListing;

/// A declarative narrowing of the crawl region. Tagged union over a small,
/// closed set of variants — dispatched by `match`, not by subtyping.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Literal prefixes relative to `base_prefix`.
    PrefixList(Vec<String>),
    /// Enumerate by discovering distinct segment values via delimiter
    /// listings, then filtering by date range at the declared segment.
    DatePartitions {
        discover_segments: usize,
        date_segment_index: usize,
        date_format: String,
        range_after: Option<NaiveDate>,
        range_before: Option<NaiveDate>,
    },
    /// Concatenation of child scopes, deduplicated.
    Union(Vec<Scope>),
}

/// Expansion thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ScopeCaps {
    pub warn_limit: usize,
    pub max_limit: usize,
    pub discovery_cap: usize,
}

impl Default for ScopeCaps {
    fn default() -> Self {
        Self {
            warn_limit: 1_000,
            max_limit: 50_000,
            discovery_cap: 10_000,
        }
    }
}

/// A compiled, bounded list of literal prefixes to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub prefixes: Vec<String>,
}

/// Compile `scope` into a [`Plan`], relative to `base_prefix`.
///
/// `prefix_list` never calls the provider. `date_partitions` and `union`
/// branches containing one may require `lister`; its absence is a fail-fast
/// `ScopeRequiresLister`, reported before any ingestion begins.
pub async fn compile(
    scope: &Scope,
    base_prefix: &str,
    lister: Option<&dyn DelimiterListing>,
    caps: &ScopeCaps,
) -> Result<Plan, ScopeError> {
    let mut prefixes = Vec::new();
    let mut stack = vec![scope];
    while let Some(node) = stack.pop() {
        match node {
            Scope::PrefixList(list) => {
                prefixes.extend(list.iter().map(|p| format!("{base_prefix}{p}")));
            }
            Scope::DatePartitions {
                discover_segments,
                date_segment_index,
                date_format,
                range_after,
                range_before,
            } => {
                let lister = lister.ok_or(ScopeError::RequiresLister)?;
                let expanded = plan::compile_date_partitions(
                    *discover_segments,
                    *date_segment_index,
                    date_format,
                    *range_after,
                    *range_before,
                    base_prefix,
                    lister,
                    caps,
                )
                .await?;
                prefixes.extend(expanded);
            }
            Scope::Union(children) => {
                stack.extend(children.iter());
            }
        }
    }

    prefixes.sort();
    prefixes.dedup();

    if prefixes.len() > caps.max_limit {
        return Err(ScopeError::TooLarge {
            actual: prefixes.len(),
            max: caps.max_limit,
        });
    }
    if prefixes.len() > caps.warn_limit {
        tracing::warn!(
            count = prefixes.len(),
            limit = caps.warn_limit,
            "scope expansion exceeds warn threshold, proceeding"
        );
    }

    Ok(Plan { prefixes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_list_needs_no_provider() {
        let scope = Scope::PrefixList(vec!["2025/".to_string(), "2024/".to_string()]);
        let plan = compile(&scope, "data/", None, &ScopeCaps::default()).await.unwrap();
        assert_eq!(plan.prefixes, vec!["data/2024/".to_string(), "data/2025/".to_string()]);
    }

    #[tokio::test]
    async fn every_prefix_starts_with_base_prefix() {
        let scope = Scope::PrefixList(vec!["a/".to_string(), "b/".to_string()]);
        let plan = compile(&scope, "root/", None, &ScopeCaps::default()).await.unwrap();
        for p in &plan.prefixes {
            assert!(p.starts_with("root/"));
        }
    }

    #[tokio::test]
    async fn union_dedups_children() {
        let scope = Scope::Union(vec![
            Scope::PrefixList(vec!["a/".to_string()]),
            Scope::PrefixList(vec!["a/".to_string(), "b/".to_string()]),
        ]);
        let plan = compile(&scope, "root/", None, &ScopeCaps::default()).await.unwrap();
        assert_eq!(plan.prefixes, vec!["root/a/".to_string(), "root/b/".to_string()]);
    }

    #[tokio::test]
    async fn date_partitions_without_lister_fails_fast() {
        let scope = Scope::DatePartitions {
            discover_segments: 1,
            date_segment_index: 0,
            date_format: "%Y".to_string(),
            range_after: None,
            range_before: None,
        };
        let err = compile(&scope, "root/", None, &ScopeCaps::default()).await.unwrap_err();
        assert!(matches!(err, ScopeError::RequiresLister));
    }

    #[tokio::test]
    async fn expansion_above_max_limit_is_too_large() {
        let scope = Scope::PrefixList((0..10).map(|i| format!("{i}/")).collect());
        let caps = ScopeCaps {
            warn_limit: 1,
            max_limit: 5,
            discovery_cap: 100,
        };
        let err = compile(&scope, "root/", None, &caps).await.unwrap_err();
        assert!(matches!(err, ScopeError::TooLarge { actual: 10, max: 5 }));
    }
}
