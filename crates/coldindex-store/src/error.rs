//! Error taxonomy for the index store.

use thiserror::Error;

/// Errors raised while opening, migrating, or writing to an index store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened (bad path, permissions, corrupt file).
    #[error("failed to open store at {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: surrealdb::Error,
    },

    /// A forward migration failed partway through.
    #[error("schema migration to version {version} failed: {source}")]
    MigrationFailed {
        version: u32,
        #[source]
        source: surrealdb::Error,
    },

    /// The write lock could not be acquired within the configured busy-wait.
    #[error("timed out after {waited_ms}ms waiting for the store write lock")]
    LockTimeout { waited_ms: u64 },

    /// A run is not in the state required for the requested transition.
    #[error("run {run_id} is {actual}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        actual: String,
        expected: String,
    },

    /// No index set matches the requested identifier.
    #[error("index set not found: {0}")]
    IndexSetNotFound(String),

    /// No run matches the requested identifier.
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// A batch flush transaction failed outright (fatal: caller must treat the
    /// owning run as `failed`, per the ingest-writer contract).
    #[error("fatal store error during flush: {0}")]
    FatalFlush(#[source] surrealdb::Error),

    /// Underlying query execution error not covered above.
    #[error("store query failed: {0}")]
    Query(#[source] surrealdb::Error),

    /// Serialization/deserialization of a stored row failed.
    #[error("(de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error touching the on-disk layout (identity.json, manifest.json, directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `identity.json`'s hash doesn't match the store's `index_set_id`.
    #[error("identity file {path} does not match index_set_id: expected {expected}, hash is {actual}")]
    IdentityFileMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Query(err)
    }
}

/// Errors raised by the query layer.
#[derive(Debug, Error)]
pub enum QueryError {
    /// `index_set_id` was not supplied.
    #[error("index_set_id is required")]
    IndexSetIdRequired,

    /// The glob pattern could not be compiled.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The key regex could not be compiled.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Propagated store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
pub type QueryResult<T> = std::result::Result<T, QueryError>;
