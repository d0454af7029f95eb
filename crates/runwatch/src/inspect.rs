//! Capture inspection: what a capture contains and what replaying it implies.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use runwatch_domain::{Outcome, RunId, RunState, RunStatus};
use serde::Serialize;

use crate::capture::CaptureFile;
use crate::error::Result;

/// One record of a capture, as parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureEntry {
    pub index: usize,
    pub elapsed_secs: f64,
    pub status: Option<RunStatus>,
    pub conclusion: Option<String>,
    pub jobs: usize,
    pub jobs_completed: usize,
    /// Parse error, when the record is not a valid snapshot
    pub error: Option<String>,
}

/// Summary of a whole capture file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub run_id: RunId,
    pub format_version: u32,
    pub recorded_at: DateTime<Utc>,
    pub entries: Vec<CaptureEntry>,
    /// Outcome a replay through the poll loop would produce
    pub outcome: Option<Outcome>,
    /// Ends in a completed snapshot
    pub usable_as_fixture: bool,
    /// SHA-256 over the records
    pub digest: String,
}

impl CaptureSummary {
    pub fn from_capture(capture: &CaptureFile) -> Result<Self> {
        let mut state = RunState::new(capture.run_id.clone());
        let mut entries = Vec::with_capacity(capture.len());

        for (index, record) in capture.snapshots.iter().enumerate() {
            let entry = match record.to_snapshot() {
                Ok(snapshot) => {
                    let entry = CaptureEntry {
                        index,
                        elapsed_secs: record.elapsed_secs,
                        status: Some(snapshot.status()),
                        conclusion: snapshot.conclusion().map(|c| c.as_str().to_string()),
                        jobs: snapshot.jobs().len(),
                        jobs_completed: snapshot
                            .jobs()
                            .iter()
                            .filter(|j| j.status.is_terminal())
                            .count(),
                        error: None,
                    };
                    state.observe(snapshot);
                    entry
                }
                Err(e) => CaptureEntry {
                    index,
                    elapsed_secs: record.elapsed_secs,
                    status: None,
                    conclusion: None,
                    jobs: 0,
                    jobs_completed: 0,
                    error: Some(e.to_string()),
                },
            };
            entries.push(entry);
        }

        Ok(CaptureSummary {
            run_id: capture.run_id.clone(),
            format_version: capture.format_version,
            recorded_at: capture.recorded_at,
            entries,
            outcome: state.outcome(),
            usable_as_fixture: capture.ends_completed(),
            digest: capture.digest()?,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Capture for run {}", self.run_id);
        if self.format_version == 0 {
            let _ = writeln!(out, "  format:      legacy (no header)");
        } else {
            let _ = writeln!(out, "  format:      v{}", self.format_version);
            let _ = writeln!(out, "  recorded at: {}", self.recorded_at.to_rfc3339());
        }
        let _ = writeln!(out, "  snapshots:   {}", self.entries.len());
        let _ = writeln!(out, "  digest:      {}", self.digest);

        for entry in &self.entries {
            match (&entry.error, entry.status) {
                (Some(error), _) => {
                    let _ = writeln!(
                        out,
                        "  [{:>3}] {:>8.1}s  malformed: {error}",
                        entry.index, entry.elapsed_secs
                    );
                }
                (None, status) => {
                    let status = status.map(|s| s.as_str()).unwrap_or("?");
                    let _ = writeln!(
                        out,
                        "  [{:>3}] {:>8.1}s  {:<11} {:<15} jobs {}/{}",
                        entry.index,
                        entry.elapsed_secs,
                        status,
                        entry.conclusion.as_deref().unwrap_or("-"),
                        entry.jobs_completed,
                        entry.jobs
                    );
                }
            }
        }

        match &self.outcome {
            Some(outcome) => {
                let _ = write!(out, "Replay outcome: {outcome}");
            }
            None => {
                let _ = write!(
                    out,
                    "Replay outcome: none (capture does not end in a completed run)"
                );
            }
        }
        out
    }
}
