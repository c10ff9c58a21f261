//! Contracts the engine consumes from a remote storage provider and its
//! driving crawler. The engine never implements these — they're named here
//! only so the ingest writer and scope planner have something concrete to
//! depend on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One object as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A page from a plain (non-delimiter) listing.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub objects: Vec<ObjectSummary>,
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

/// A page from a delimiter listing: objects at this level plus the distinct
/// "common prefixes" one level deeper, used by the scope planner's segment
/// discovery.
#[derive(Debug, Clone)]
pub struct DelimiterListingPage {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub continuation_token: Option<String>,
    pub is_truncated: bool,
}

#[derive(Debug, Clone)]
pub struct HeadResult {
    pub size: u64,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

/// Classification predicates a provider's error type must answer so the
/// ingest writer can route `write_error` into the right event category
/// without knowing the provider's concrete error representation.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    fn is_access_denied(&self) -> bool {
        false
    }
    fn is_not_found(&self) -> bool {
        false
    }
    fn is_throttled(&self) -> bool {
        false
    }
    fn is_timeout(&self) -> bool {
        false
    }
    fn is_provider_unavailable(&self) -> bool {
        false
    }
}

pub type BoxProviderError = Box<dyn ProviderError>;

/// Paginated listing over a single prefix.
#[async_trait]
pub trait Listing: Send + Sync {
    async fn list(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListingPage, BoxProviderError>;
}

/// Delimiter-bounded listing, used by the scope planner to discover distinct
/// segment values at a given depth.
#[async_trait]
pub trait DelimiterListing: Send + Sync {
    async fn list_with_delimiter(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation_token: Option<&str>,
    ) -> Result<DelimiterListingPage, BoxProviderError>;
}

/// Optional per-object metadata fetch. Not used by the ingest core itself.
#[async_trait]
pub trait Head: Send + Sync {
    async fn head(&self, key: &str) -> Result<HeadResult, BoxProviderError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    pub struct MockProviderError {
        pub kind: &'static str,
    }

    impl fmt::Display for MockProviderError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "mock provider error: {}", self.kind)
        }
    }

    impl std::error::Error for MockProviderError {}

    impl ProviderError for MockProviderError {
        fn is_access_denied(&self) -> bool {
            self.kind == "access_denied"
        }
        fn is_not_found(&self) -> bool {
            self.kind == "not_found"
        }
        fn is_throttled(&self) -> bool {
            self.kind == "throttled"
        }
        fn is_timeout(&self) -> bool {
            self.kind == "timeout"
        }
        fn is_provider_unavailable(&self) -> bool {
            self.kind == "unavailable"
        }
    }
}
