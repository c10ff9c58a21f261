//! Date-partition discovery: repeated delimiter listings that build a
//! Cartesian product of segment values, then filter by date at the declared
//! segment position.

use chrono::NaiveDate;

use crate::error::ScopeError;
use crate::provider::DelimiterListing;

use super::ScopeCaps;

struct Candidate {
    prefix: String,
    segments: Vec<String>,
}

fn extract_segment(parent_prefix: &str, common_prefix: &str) -> String {
    common_prefix
        .strip_prefix(parent_prefix)
        .unwrap_or(common_prefix)
        .trim_end_matches('/')
        .to_string()
}

/// Discover `discover_segments` levels of delimiter listings beneath
/// `base_prefix`, then keep only the branches whose value at
/// `date_segment_index` parses under `date_format` and falls inside
/// `[range_after, range_before)`. Undecodable segment values are skipped,
/// not errors.
pub async fn compile_date_partitions(
    discover_segments: usize,
    date_segment_index: usize,
    date_format: &str,
    range_after: Option<NaiveDate>,
    range_before: Option<NaiveDate>,
    base_prefix: &str,
    lister: &dyn DelimiterListing,
    caps: &ScopeCaps,
) -> Result<Vec<String>, ScopeError> {
    let mut frontier = vec![Candidate {
        prefix: base_prefix.to_string(),
        segments: Vec::new(),
    }];

    for level in 0..discover_segments {
        let mut next = Vec::new();
        for candidate in &frontier {
            let mut continuation: Option<String> = None;
            loop {
                let page = lister
                    .list_with_delimiter(&candidate.prefix, "/", continuation.as_deref())
                    .await
                    .map_err(|e| ScopeError::Provider(e.to_string()))?;
                for common_prefix in page.common_prefixes {
                    let segment = extract_segment(&candidate.prefix, &common_prefix);
                    let mut segments = candidate.segments.clone();
                    segments.push(segment);
                    next.push(Candidate {
                        prefix: common_prefix,
                        segments,
                    });
                    if next.len() > caps.discovery_cap {
                        return Err(ScopeError::DiscoveryCapExceeded {
                            segment: level,
                            cap: caps.discovery_cap,
                        });
                    }
                }
                if page.is_truncated {
                    continuation = page.continuation_token;
                    if continuation.is_none() {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        frontier = next;
    }

    let mut out = Vec::new();
    let range_active = range_after.is_some() || range_before.is_some();
    for candidate in frontier {
        if range_active {
            match candidate
                .segments
                .get(date_segment_index)
                .map(|value| NaiveDate::parse_from_str(value, date_format))
            {
                Some(Ok(date)) => {
                    if let Some(after) = range_after {
                        if date < after {
                            continue;
                        }
                    }
                    if let Some(before) = range_before {
                        if date >= before {
                            continue;
                        }
                    }
                }
                // No declared date segment, or an undecodable value: the
                // branch cannot be judged against the range, so drop it.
                Some(Err(_)) | None => continue,
            }
        }
        out.push(candidate.prefix);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{DelimiterListingPage, ObjectSummary};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeLister {
        pages: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl DelimiterListing for FakeLister {
        async fn list_with_delimiter(
            &self,
            prefix: &str,
            _delimiter: &str,
            _continuation_token: Option<&str>,
        ) -> Result<DelimiterListingPage, crate::provider::BoxProviderError> {
            let common_prefixes = self.pages.get(prefix).cloned().unwrap_or_default();
            Ok(DelimiterListingPage {
                objects: Vec::<ObjectSummary>::new(),
                common_prefixes,
                continuation_token: None,
                is_truncated: false,
            })
        }
    }

    fn caps() -> ScopeCaps {
        ScopeCaps {
            warn_limit: 1000,
            max_limit: 10_000,
            discovery_cap: 1000,
        }
    }

    #[tokio::test]
    async fn discovers_and_filters_by_date_range() {
        let lister = FakeLister {
            pages: HashMap::from([(
                "data/".to_string(),
                vec![
                    "data/2025-01-01/".to_string(),
                    "data/2025-01-02/".to_string(),
                    "data/2024-12-31/".to_string(),
                ],
            )]),
        };
        let after = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let prefixes = compile_date_partitions(
            1,
            0,
            "%Y-%m-%d",
            Some(after),
            None,
            "data/",
            &lister,
            &caps(),
        )
        .await
        .unwrap();
        assert_eq!(
            prefixes,
            vec!["data/2025-01-01/".to_string(), "data/2025-01-02/".to_string()]
        );
    }

    #[tokio::test]
    async fn undecodable_segment_is_excluded_not_errored() {
        let lister = FakeLister {
            pages: HashMap::from([(
                "data/".to_string(),
                vec!["data/not-a-date/".to_string(), "data/2025-01-01/".to_string()],
            )]),
        };
        // A date-range filter is in effect, so a branch whose segment cannot
        // be parsed as a date is dropped rather than failing the whole plan.
        let after = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let prefixes = compile_date_partitions(1, 0, "%Y-%m-%d", Some(after), None, "data/", &lister, &caps())
            .await
            .unwrap();
        assert_eq!(prefixes, vec!["data/2025-01-01/".to_string()]);
    }

    #[tokio::test]
    async fn no_range_filter_keeps_every_branch_regardless_of_parseability() {
        let lister = FakeLister {
            pages: HashMap::from([(
                "data/".to_string(),
                vec!["data/not-a-date/".to_string(), "data/2025-01-01/".to_string()],
            )]),
        };
        let prefixes = compile_date_partitions(1, 0, "%Y-%m-%d", None, None, "data/", &lister, &caps())
            .await
            .unwrap();
        assert_eq!(
            prefixes,
            vec!["data/not-a-date/".to_string(), "data/2025-01-01/".to_string()]
        );
    }

    #[tokio::test]
    async fn discovery_cap_is_enforced() {
        let many: Vec<String> = (0..5).map(|i| format!("data/{i}/")).collect();
        let lister = FakeLister {
            pages: HashMap::from([("data/".to_string(), many)]),
        };
        let tight_caps = ScopeCaps {
            warn_limit: 1,
            max_limit: 1,
            discovery_cap: 2,
        };
        let err = compile_date_partitions(1, 0, "%Y", None, None, "data/", &lister, &tight_caps)
            .await
            .unwrap_err();
        assert!(matches!(err, ScopeError::DiscoveryCapExceeded { .. }));
    }
}
