pub mod object;
pub mod run;

pub use object::{ObjectSighting, PrefixSighting};
pub use run::{CrawlOutcome, ErrorEvent, ProgressEvent, ProviderErrorKind};
