//! Structured observability hooks for index-build lifecycle events.
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`); the
//! finalizer's summary is the only line always written to stderr regardless
//! of level.

use serde::Serialize;
use tracing::info;

/// RAII guard that enters a run-scoped tracing span for the duration of a build.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str, index_set_id: &str) -> Self {
        let span = tracing::info_span!("coldindex.run", run_id = %run_id, index_set_id = %index_set_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, index_set_id: &str, source_type: &str) {
    info!(event = "run.started", run_id = %run_id, index_set_id = %index_set_id, source_type = %source_type);
}

pub fn emit_run_finished(run_id: &str, status: &str, objects_ingested: u64, prefixes_ingested: u64, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = %status,
        objects_ingested = objects_ingested,
        prefixes_ingested = prefixes_ingested,
        duration_ms = duration_ms,
    );
}

pub fn emit_scope_violation(run_id: &str, key: &str) {
    tracing::warn!(event = "run.scope_violation", run_id = %run_id, key = %key);
}

pub fn emit_soft_delete(run_id: &str, index_set_id: &str, count: u64) {
    info!(event = "run.soft_delete", run_id = %run_id, index_set_id = %index_set_id, count = count);
}

pub fn emit_finalize_error(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "run.finalize_error", run_id = %run_id, error = %error);
}

/// The per-run summary artifact written to stderr at the end of a build.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub status: &'a str,
    pub objects_ingested: u64,
    pub soft_deleted: u64,
    pub cause: Option<&'a str>,
}

/// Write the per-run summary to stderr as a single JSON line, not a
/// hand-formatted string — the same structured-artifact discipline the
/// build report writer uses for its own summary sections.
pub fn print_summary(
    run_id: &str,
    status: &str,
    objects_ingested: u64,
    soft_deleted: u64,
    partial_cause: Option<&str>,
) {
    let summary = RunSummary {
        run_id,
        status,
        objects_ingested,
        soft_deleted,
        cause: partial_cause,
    };
    match serde_json::to_string(&summary) {
        Ok(line) => eprintln!("{line}"),
        Err(e) => eprintln!("run {run_id}: failed to serialize summary: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_span_enters_without_panicking() {
        let _span = RunSpan::enter("run_test", "idx_test");
    }
}
