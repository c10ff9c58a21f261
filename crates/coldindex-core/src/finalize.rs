//! Run finalizer: the terminal `running -> {success, partial, failed}`
//! transition, and the conditional soft-delete pass that only a successful,
//! fully covering run may trigger.

use std::sync::Arc;

use coldindex_store::{IndexRunRecord, IndexStore, RunStatus};
use tracing::instrument;

use crate::domain::CrawlOutcome;
use crate::error::FinalizeError;
use crate::ingest::IngestResult;
use crate::obs;

/// Result of a finalize call on the `Completed` (non-cancelled, non-fatal)
/// path.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub run: IndexRunRecord,
    pub soft_deleted: u64,
}

pub struct Finalizer {
    store: Arc<IndexStore>,
}

impl Finalizer {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// `scope_is_full_coverage` decides whether this run is eligible for the
    /// soft-delete pass at all: soft-delete is disabled whenever any scope
    /// narrowing was declared for the run, regardless of outcome.
    #[instrument(skip_all, fields(run_id = %run_id, index_set_id = %index_set_id))]
    pub async fn finalize(
        &self,
        run_id: &str,
        index_set_id: &str,
        ingest: IngestResult,
        outcome: CrawlOutcome,
        scope_is_full_coverage: bool,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let status = match &outcome {
            CrawlOutcome::Failed(_) => RunStatus::Failed,
            CrawlOutcome::Cancelled => RunStatus::Partial,
            CrawlOutcome::Completed => ingest.status,
        };

        let run = self.store.finalize_run(run_id, status).await?;

        let mut soft_deleted = 0;
        if status == RunStatus::Success && scope_is_full_coverage {
            soft_deleted = self
                .store
                .soft_delete_unseen(index_set_id, run_id, run.started_at)
                .await?;
            obs::emit_soft_delete(run_id, index_set_id, soft_deleted);
        }

        obs::emit_run_finished(
            run_id,
            status.as_str(),
            ingest.objects_ingested,
            ingest.prefixes_ingested,
            (chrono::Utc::now() - run.started_at).num_milliseconds().max(0) as u64,
        );

        match outcome {
            CrawlOutcome::Cancelled => Err(FinalizeError::Cancelled(run_id.to_string())),
            CrawlOutcome::Failed(message) => Err(FinalizeError::Failed(message)),
            CrawlOutcome::Completed => Ok(FinalizeOutcome { run, soft_deleted }),
        }
    }
}
