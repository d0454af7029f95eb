//! Structured lifecycle events for wait and capture sessions.
//!
//! Every event carries an `event` field so log pipelines can filter on it,
//! e.g. `event=wait.finished run_id=19217851608 outcome=succeeded`.

use std::path::Path;

use runwatch_domain::{JobTransition, Outcome, RunId, StatusSnapshot};
use tracing::{debug, info, warn};

use crate::waiter::WaitStats;

pub fn emit_wait_started(run_id: &RunId, interval_ms: u64, max_retries: u32) {
    info!(
        event = "wait.started",
        run_id = %run_id,
        interval_ms = interval_ms,
        max_retries = max_retries,
    );
}

/// Emitted for every snapshot that reaches the run state.
pub fn emit_snapshot_observed(run_id: &RunId, snapshot: &StatusSnapshot) {
    debug!(
        event = "snapshot.observed",
        run_id = %run_id,
        phase = %snapshot.phase(),
        jobs = snapshot.jobs().len(),
        elapsed_secs = snapshot.elapsed_secs(),
    );
}

pub fn emit_fetch_failed(run_id: &RunId, attempt: u32, max_retries: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "fetch.failed",
        run_id = %run_id,
        attempt = attempt,
        max_retries = max_retries,
        error = %error,
    );
}

pub fn emit_job_transition(run_id: &RunId, transition: &JobTransition) {
    let from = transition.from.map(|s| s.as_str()).unwrap_or("new");
    let conclusion = transition.conclusion.as_ref().map(|c| c.as_str()).unwrap_or("-");
    info!(
        event = "job.transition",
        run_id = %run_id,
        job = %transition.name,
        from = from,
        to = transition.to.as_str(),
        conclusion = conclusion,
    );
}

pub fn emit_wait_finished(run_id: &RunId, outcome: &Outcome, duration_ms: u64, stats: &WaitStats) {
    info!(
        event = "wait.finished",
        run_id = %run_id,
        outcome = outcome.label(),
        duration_ms = duration_ms,
        polls = stats.polls,
        snapshots = stats.snapshots,
        failures = stats.transport_failures + stats.malformed_snapshots,
    );
}

/// Non-retryable failure ended the session without an outcome.
pub fn emit_wait_aborted(run_id: &RunId, error: &dyn std::fmt::Display) {
    warn!(event = "wait.aborted", run_id = %run_id, error = %error);
}

pub fn emit_capture_saved(run_id: &RunId, path: &Path, snapshots: usize) {
    info!(
        event = "capture.saved",
        run_id = %run_id,
        path = %path.display(),
        snapshots = snapshots,
    );
}

pub fn emit_capture_save_error(run_id: &RunId, error: &dyn std::fmt::Display) {
    warn!(event = "capture.save_error", run_id = %run_id, error = %error);
}
