//! Streaming sink consuming `(object | prefix-stat | error | progress)`
//! events from the crawler and batching them into the store.
//!
//! Internally single-threaded: one mutex around buffer state and flush is
//! simpler than a message-passing pipeline, and the throughput bottleneck is
//! the store rather than the lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coldindex_store::{IndexStore, ObjectRecord, PrefixStatRecord, RunEventRecord, RunStatus};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{ErrorEvent, ObjectSighting, PrefixSighting, ProgressEvent, ProviderErrorKind};
use crate::error::IngestError;
use crate::obs;

pub const DEFAULT_OBJECT_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_PREFIX_BATCH_SIZE: usize = 1_000;

/// `close()`'s final flush runs under its own deadline, independent of
/// whatever cancellation context the crawl itself was running under — a
/// cancelled crawl must still persist what was already enqueued.
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(180);

struct WriterState {
    object_buffer: Vec<ObjectRecord>,
    prefix_buffer: Vec<PrefixStatRecord>,
    objects_ingested: u64,
    prefixes_ingested: u64,
    scope_violations: u64,
    scope_violation_event_emitted: bool,
    timeout_event_emitted: bool,
    error_flag: bool,
}

impl WriterState {
    fn new() -> Self {
        Self {
            object_buffer: Vec::new(),
            prefix_buffer: Vec::new(),
            objects_ingested: 0,
            prefixes_ingested: 0,
            scope_violations: 0,
            scope_violation_event_emitted: false,
            timeout_event_emitted: false,
            error_flag: false,
        }
    }
}

/// Outcome of a completed ingest, read via [`IngestWriter::result`].
#[derive(Debug, Clone, Copy)]
pub struct IngestResult {
    pub objects_ingested: u64,
    pub prefixes_ingested: u64,
    pub scope_violations: u64,
    pub status: RunStatus,
}

pub struct IngestWriter {
    store: Arc<IndexStore>,
    index_set_id: String,
    run_id: String,
    base_prefix: String,
    object_batch_size: usize,
    prefix_batch_size: usize,
    state: Mutex<WriterState>,
}

impl IngestWriter {
    pub fn new(store: Arc<IndexStore>, index_set_id: String, run_id: String, base_prefix: String) -> Self {
        Self::with_batch_sizes(
            store,
            index_set_id,
            run_id,
            base_prefix,
            DEFAULT_OBJECT_BATCH_SIZE,
            DEFAULT_PREFIX_BATCH_SIZE,
        )
    }

    pub fn with_batch_sizes(
        store: Arc<IndexStore>,
        index_set_id: String,
        run_id: String,
        base_prefix: String,
        object_batch_size: usize,
        prefix_batch_size: usize,
    ) -> Self {
        Self {
            store,
            index_set_id,
            run_id,
            base_prefix,
            object_batch_size,
            prefix_batch_size,
            state: Mutex::new(WriterState::new()),
        }
    }

    /// Scope containment: rows whose key doesn't begin with `base_prefix`
    /// never enter the table.
    pub async fn write_object(&self, obj: ObjectSighting) -> Result<(), IngestError> {
        if !obj.key.starts_with(&self.base_prefix) {
            let emit = {
                let mut state = self.state.lock().await;
                state.scope_violations += 1;
                state.error_flag = true;
                let first = !state.scope_violation_event_emitted;
                state.scope_violation_event_emitted = true;
                first
            };
            if emit {
                obs::emit_scope_violation(&self.run_id, &obj.key);
                self.store
                    .append_event(RunEventRecord {
                        event_id: format!("evt_{}", Uuid::new_v4()),
                        run_id: self.run_id.clone(),
                        occurred_at: Utc::now(),
                        event_type: "scope_violation".to_string(),
                        event_category: coldindex_store::EventCategory::Warning,
                        detail: Some(format!("key {:?} outside base prefix {:?}", obj.key, self.base_prefix)),
                        key: Some(obj.key),
                        prefix: Some(self.base_prefix.clone()),
                        error_code: None,
                    })
                    .await?;
            }
            return Ok(());
        }

        let rel_key = obj.key[self.base_prefix.len()..].to_string();
        let record = ObjectRecord {
            index_set_id: self.index_set_id.clone(),
            rel_key,
            size_bytes: obj.size_bytes,
            last_modified: obj.last_modified,
            etag: obj.etag,
            last_seen_run_id: self.run_id.clone(),
            last_seen_at: Utc::now(),
            deleted_at: None,
        };

        let mut state = self.state.lock().await;
        state.object_buffer.push(record);
        if state.object_buffer.len() >= self.object_batch_size {
            self.flush_objects(&mut state).await?;
        }
        Ok(())
    }

    pub async fn write_prefix(&self, stat: PrefixSighting) -> Result<(), IngestError> {
        let record = PrefixStatRecord {
            index_set_id: self.index_set_id.clone(),
            run_id: self.run_id.clone(),
            prefix: stat.prefix,
            depth: stat.depth,
            objects_direct: stat.objects_direct,
            bytes_direct: stat.bytes_direct,
            common_prefixes: stat.common_prefixes,
            truncated: stat.truncated,
            truncated_reason: stat.truncated_reason,
        };
        let mut state = self.state.lock().await;
        state.prefix_buffer.push(record);
        if state.prefix_buffer.len() >= self.prefix_batch_size {
            self.flush_prefixes(&mut state).await?;
        }
        Ok(())
    }

    /// Timeouts are logged once per run; every other
    /// classified error gets an event each time it's reported.
    pub async fn write_error(&self, event: ErrorEvent) -> Result<(), IngestError> {
        let emit = {
            let mut state = self.state.lock().await;
            state.error_flag = true;
            if event.kind == ProviderErrorKind::Timeout {
                let first = !state.timeout_event_emitted;
                state.timeout_event_emitted = true;
                first
            } else {
                true
            }
        };
        if !emit {
            return Ok(());
        }
        self.store
            .append_event(RunEventRecord {
                event_id: format!("evt_{}", Uuid::new_v4()),
                run_id: self.run_id.clone(),
                occurred_at: Utc::now(),
                event_type: event.kind.event_type().to_string(),
                event_category: event.kind.event_category(),
                detail: event.detail,
                key: event.key,
                prefix: event.prefix,
                error_code: Some(event.kind.event_type().to_string()),
            })
            .await?;
        Ok(())
    }

    /// Best-effort; never touches the store.
    pub fn write_progress(&self, progress: ProgressEvent) {
        debug!(
            event = "run.progress",
            run_id = %self.run_id,
            objects_seen = progress.objects_seen,
            bytes_seen = progress.bytes_seen,
            message = %progress.message,
        );
    }

    /// Flush whatever remains, under an independent bounded timeout that
    /// does not inherit the crawl's own cancellation.
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn close(&self) -> Result<(), IngestError> {
        tokio::time::timeout(FINAL_FLUSH_TIMEOUT, async {
            let mut state = self.state.lock().await;
            self.flush_objects(&mut state).await?;
            self.flush_prefixes(&mut state).await?;
            Ok::<(), IngestError>(())
        })
        .await
        .map_err(|_| IngestError::FlushTimedOut(FINAL_FLUSH_TIMEOUT))??;
        Ok(())
    }

    /// Must be called after `close()`. `partial` if any error flag was set
    /// during the run (provider error, timeout, or scope violation), else
    /// `success`.
    pub async fn result(&self) -> IngestResult {
        let state = self.state.lock().await;
        let status = if state.error_flag {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        IngestResult {
            objects_ingested: state.objects_ingested,
            prefixes_ingested: state.prefixes_ingested,
            scope_violations: state.scope_violations,
            status,
        }
    }

    async fn flush_objects(&self, state: &mut WriterState) -> Result<(), IngestError> {
        if state.object_buffer.is_empty() {
            return Ok(());
        }
        self.store.upsert_objects_batch(&state.object_buffer).await?;
        state.objects_ingested += state.object_buffer.len() as u64;
        state.object_buffer.clear();
        Ok(())
    }

    async fn flush_prefixes(&self, state: &mut WriterState) -> Result<(), IngestError> {
        if state.prefix_buffer.is_empty() {
            return Ok(());
        }
        self.store.insert_prefix_stats_batch(&state.prefix_buffer).await?;
        state.prefixes_ingested += state.prefix_buffer.len() as u64;
        state.prefix_buffer.clear();
        Ok(())
    }
}
