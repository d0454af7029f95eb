//! In-memory fakes for the `StatusSource` seam (testing only)
//!
//! `ScriptedSource` answers each fetch with the next scripted step, so poll
//! loop behavior can be driven without a network or a capture file.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use runwatch_domain::{ProviderPayload, RunId, StatusSnapshot};
use serde_json::json;

use crate::error::{Result, WatchError};
use crate::transport::StatusSource;

// ---------------------------------------------------------------------------
// Snapshot builders
// ---------------------------------------------------------------------------

/// A single-job snapshot with the given run status and conclusion, at t=0.
pub fn snapshot(status: &str, conclusion: Option<&str>) -> StatusSnapshot {
    snapshot_at(status, conclusion, 0.0)
}

/// A single-job snapshot captured `elapsed_secs` into the session.
///
/// # Panics
///
/// On a status value the domain model rejects; fakes are built from literals.
pub fn snapshot_at(status: &str, conclusion: Option<&str>, elapsed_secs: f64) -> StatusSnapshot {
    StatusSnapshot::from_payload(payload(status, conclusion), elapsed_secs)
        .unwrap_or_else(|e| panic!("invalid fake snapshot: {e}"))
}

/// Raw provider documents matching [`snapshot`].
pub fn payload(status: &str, conclusion: Option<&str>) -> ProviderPayload {
    let job_status = match status {
        "completed" => "completed",
        "in_progress" => "in_progress",
        _ => "queued",
    };
    ProviderPayload {
        run: json!({
            "id": 19217851608u64,
            "name": "CI",
            "status": status,
            "conclusion": conclusion,
        }),
        jobs: json!({
            "total_count": 1,
            "jobs": [{
                "id": 54831551871u64,
                "name": "test",
                "status": job_status,
                "conclusion": conclusion,
                "steps": [
                    { "name": "Set up job", "status": job_status, "conclusion": conclusion, "number": 1 }
                ]
            }]
        }),
    }
}

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

/// Answers fetches from a fixed script; fails with `ReplayExhausted` once the
/// script runs out.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<StatusSnapshot>>,
    latency: Duration,
    calls: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_snapshot(mut self, snapshot: StatusSnapshot) -> Self {
        self.script.push_back(Ok(snapshot));
        self
    }

    pub fn then_error(mut self, error: WatchError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    /// Delay every answer by `latency` (simulated network time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch(&mut self, _run_id: &RunId) -> Result<StatusSnapshot> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.calls += 1;
        self.script
            .pop_front()
            .unwrap_or(Err(WatchError::ReplayExhausted {
                consumed: self.calls - 1,
            }))
    }
}
