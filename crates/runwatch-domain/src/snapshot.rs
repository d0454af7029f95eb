//! Status snapshots parsed from provider responses.
//!
//! A snapshot is built from the two documents the provider returns for a run:
//! the "get run" body and the "list jobs for run" body. Both are kept verbatim
//! in [`ProviderPayload`] so a snapshot can be recorded and replayed exactly.
//! Fields the model does not know about are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, SnapshotError};
use crate::progress::ProgressStats;
use crate::status::{Conclusion, RunPhase, RunStatus};

// ============================================================================
// 1. RUN IDENTIFIER
// ============================================================================

/// Opaque identifier naming one CI run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        RunId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        RunId(id.to_string())
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        RunId(id.to_string())
    }
}

impl From<String> for RunId {
    fn from(id: String) -> Self {
        RunId(id)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Provider ids are numeric; hand-written fixtures sometimes keep them as numbers.
impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => Ok(RunId(s)),
            Repr::Number(n) => Ok(RunId(n.to_string())),
        }
    }
}

// ============================================================================
// 2. RAW PAYLOAD
// ============================================================================

/// The raw provider documents behind one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    /// Body of the "get run" endpoint.
    pub run: Value,
    /// Body of the "list jobs for run" endpoint (`{"total_count", "jobs"}`).
    pub jobs: Value,
}

// Wire shapes: only the fields the model reads.

#[derive(Deserialize)]
struct WireRun {
    id: Option<u64>,
    name: Option<String>,
    status: String,
    conclusion: Option<String>,
    head_sha: Option<String>,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct WireJobs {
    jobs: Vec<WireJob>,
}

#[derive(Deserialize)]
struct WireJob {
    id: u64,
    name: String,
    status: String,
    conclusion: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    steps: Option<Vec<WireStep>>,
}

#[derive(Deserialize)]
struct WireStep {
    name: String,
    status: String,
    conclusion: Option<String>,
    number: Option<u32>,
}

// ============================================================================
// 3. JOBS AND STEPS
// ============================================================================

/// One step inside a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStep {
    pub name: String,
    pub number: Option<u32>,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
}

/// Status of one job within the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<JobStep>,
}

impl JobStatus {
    /// Step-weighted progress of this job.
    pub fn progress(&self) -> ProgressStats {
        ProgressStats::from_statuses(self.steps.iter().map(|s| s.status))
    }

    fn from_wire(job: WireJob) -> Result<Self> {
        let steps = job
            .steps
            .unwrap_or_default()
            .into_iter()
            .map(|step| {
                Ok(JobStep {
                    name: step.name,
                    number: step.number,
                    status: parse_status("step status", &step.status)?,
                    conclusion: step.conclusion.as_deref().map(Conclusion::parse),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(JobStatus {
            id: job.id,
            name: job.name,
            status: parse_status("job status", &job.status)?,
            conclusion: job.conclusion.as_deref().map(Conclusion::parse),
            started_at: job.started_at,
            completed_at: job.completed_at,
            steps,
        })
    }
}

fn parse_status(field: &'static str, value: &str) -> Result<RunStatus> {
    value.parse::<RunStatus>().map_err(|_| SnapshotError::UnknownStatus {
        field,
        value: value.to_string(),
    })
}

// ============================================================================
// 4. STATUS SNAPSHOT
// ============================================================================

/// One provider response at one point in time.
///
/// Immutable once built; the only derived copy is [`StatusSnapshot::with_elapsed`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    provider_run_id: Option<u64>,
    name: String,
    status: RunStatus,
    conclusion: Option<Conclusion>,
    head_sha: Option<String>,
    html_url: Option<String>,
    jobs: Vec<JobStatus>,
    elapsed_secs: f64,
    payload: ProviderPayload,
}

impl StatusSnapshot {
    /// Parse a provider payload captured `elapsed_secs` after the session began.
    pub fn from_payload(payload: ProviderPayload, elapsed_secs: f64) -> Result<Self> {
        check_elapsed(elapsed_secs)?;

        let run = WireRun::deserialize(&payload.run).map_err(|e| SnapshotError::schema("run", e))?;
        let jobs =
            WireJobs::deserialize(&payload.jobs).map_err(|e| SnapshotError::schema("jobs", e))?;

        let status = parse_status("run status", &run.status)?;
        let jobs = jobs
            .jobs
            .into_iter()
            .map(JobStatus::from_wire)
            .collect::<Result<Vec<_>>>()?;

        Ok(StatusSnapshot {
            provider_run_id: run.id,
            name: run.name.unwrap_or_default(),
            status,
            conclusion: run.conclusion.as_deref().map(Conclusion::parse),
            head_sha: run.head_sha,
            html_url: run.html_url,
            jobs,
            elapsed_secs,
            payload,
        })
    }

    /// Same response, restamped with a different capture timestamp.
    pub fn with_elapsed(self, elapsed_secs: f64) -> Result<Self> {
        check_elapsed(elapsed_secs)?;
        Ok(self.restamp(elapsed_secs))
    }

    pub(crate) fn restamp(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = elapsed_secs;
        self
    }

    pub fn provider_run_id(&self) -> Option<u64> {
        self.provider_run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn conclusion(&self) -> Option<&Conclusion> {
        self.conclusion.as_ref()
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.head_sha.as_deref()
    }

    pub fn html_url(&self) -> Option<&str> {
        self.html_url.as_deref()
    }

    pub fn jobs(&self) -> &[JobStatus] {
        &self.jobs
    }

    /// Seconds since the capture or replay session began.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn payload(&self) -> &ProviderPayload {
        &self.payload
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_status(self.status, self.conclusion.as_ref())
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }
}

fn check_elapsed(elapsed_secs: f64) -> Result<()> {
    if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
        return Err(SnapshotError::InvalidTimestamp(elapsed_secs));
    }
    Ok(())
}
