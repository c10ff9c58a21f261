//! Index Engine domain logic: identity computation, scope planning, the
//! streaming ingest writer, and run finalization. The durable schema and
//! query layer live in `coldindex_store`; the CLI, manifest loader, and
//! crawler pipeline that drive this crate are thin shells outside it.

pub mod domain;
pub mod error;
pub mod finalize;
pub mod identity;
pub mod ingest;
pub mod obs;
pub mod provider;
pub mod scope;
pub mod telemetry;

pub use error::{FinalizeError, IdentityError, IngestError, ScopeError};
pub use finalize::{FinalizeOutcome, Finalizer};
pub use identity::{compute, resolve_best_candidate, BuildParams, ComputedIdentity, ProviderIdentity};
pub use ingest::{IngestResult, IngestWriter};
pub use scope::{compile as compile_scope, Plan as ScopePlan, Scope, ScopeCaps};
