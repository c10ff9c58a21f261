//! Embedded, durable, single-writer relational store for one content-addressed
//! index: schema migrations, the CRUD/lifecycle surface consumed by the
//! ingest writer and run finalizer, the glob+filter query layer with prefix
//! pushdown, and the on-disk layout around the store file.

pub mod error;
pub mod identity_file;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod store;

pub use error::{QueryError, QueryResult, Result, StoreError};
pub use identity_file::IndexLayout;
pub use query::{execute_query, count_query, literal_prefix, QueryParams, QueryStats};
pub use schema::{
    EventCategory, IndexRunRecord, IndexSetRecord, ObjectRecord, PrefixStatRecord,
    ProviderIdentity, RunEventRecord, RunStatus, SourceType,
};
pub use store::{IndexStore, DEFAULT_BUSY_WAIT};
