//! Error taxonomies for the identity, scope, ingest, and finalize modules
//! kinds, not type names.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity underspecified: {0}")]
    Underspecified(String),

    #[error("canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("scope expansion of {actual} prefixes exceeds the configured max of {max}")]
    TooLarge { actual: usize, max: usize },

    #[error("scope requires a prefix-listing capability the provider does not declare")]
    RequiresLister,

    #[error("discovery at segment {segment} exceeded the configured cap of {cap}")]
    DiscoveryCapExceeded { segment: usize, cap: usize },

    #[error("provider error during scope discovery: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fatal store error during flush: {0}")]
    FatalStore(#[from] coldindex_store::StoreError),

    #[error("ingest cancelled")]
    Cancelled,

    #[error("final flush did not complete within {0:?}")]
    FlushTimedOut(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Store(#[from] coldindex_store::StoreError),

    #[error("run {0} was cancelled")]
    Cancelled(String),

    #[error("run failed: {0}")]
    Failed(String),
}
