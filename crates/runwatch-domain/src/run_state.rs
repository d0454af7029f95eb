//! Per-run accumulator: the latest snapshot, the history, and the terminal decision.

use std::fmt::Write as _;
use tracing::warn;

use crate::outcome::Outcome;
use crate::progress::ProgressStats;
use crate::snapshot::{RunId, StatusSnapshot};
use crate::status::{Conclusion, RunStatus};

/// A job whose status or conclusion changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub job_id: u64,
    pub name: String,
    /// `None` when the job first appears.
    pub from: Option<RunStatus>,
    pub to: RunStatus,
    pub conclusion: Option<Conclusion>,
}

/// What [`RunState::observe`] did with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Appended to the history and now the latest snapshot.
    Recorded { job_transitions: Vec<JobTransition> },
    /// Older than the latest snapshot and not terminal; dropped.
    Stale,
    /// The run had already completed; dropped.
    AfterTerminal,
}

/// Mutable state of one observed run.
///
/// Invariants:
/// - `history` is non-decreasing in `elapsed_secs`
/// - nothing is appended after a `completed` snapshot
#[derive(Debug, Clone)]
pub struct RunState {
    run_id: RunId,
    history: Vec<StatusSnapshot>,
}

impl RunState {
    pub fn new(run_id: RunId) -> Self {
        RunState {
            run_id,
            history: Vec::new(),
        }
    }

    /// Feed a fresh snapshot.
    ///
    /// A completed snapshot is accepted even when its timestamp is older than
    /// the latest one; it is restamped to the latest timestamp so the history
    /// stays ordered. Older non-terminal snapshots are stale.
    pub fn observe(&mut self, snapshot: StatusSnapshot) -> Observation {
        if self.is_finished() {
            return Observation::AfterTerminal;
        }

        let snapshot = match self.latest() {
            Some(latest) if snapshot.elapsed_secs() < latest.elapsed_secs() => {
                if !snapshot.is_completed() {
                    return Observation::Stale;
                }
                let at = latest.elapsed_secs();
                snapshot.restamp(at)
            }
            _ => snapshot,
        };

        if let Some(Conclusion::Unrecognized(raw)) = snapshot.conclusion() {
            warn!(run_id = %self.run_id, conclusion = %raw, "unrecognized run conclusion, treating as failure");
        }

        let job_transitions = job_transitions(self.latest(), &snapshot);
        self.history.push(snapshot);
        Observation::Recorded { job_transitions }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn latest(&self) -> Option<&StatusSnapshot> {
        self.history.last()
    }

    /// Every accepted snapshot, oldest first.
    pub fn history(&self) -> &[StatusSnapshot] {
        &self.history
    }

    /// True once the latest snapshot reports `completed`.
    pub fn is_finished(&self) -> bool {
        self.latest().is_some_and(StatusSnapshot::is_completed)
    }

    /// The outcome implied by the latest snapshot, if the run is finished.
    pub fn outcome(&self) -> Option<Outcome> {
        self.latest()
            .filter(|s| s.is_completed())
            .map(|s| Outcome::from_conclusion(s.conclusion()))
    }

    /// Step-weighted progress over all jobs; 100% once the run completed.
    pub fn progress(&self) -> ProgressStats {
        let Some(latest) = self.latest() else {
            return ProgressStats::default();
        };
        let stats: ProgressStats = latest.jobs().iter().map(|j| j.progress()).sum();
        if latest.is_completed() {
            stats.finished()
        } else {
            stats
        }
    }

    /// Human-readable summary of the latest snapshot.
    pub fn render_summary(&self, indent: usize) -> String {
        let pad = " ".repeat(indent);
        let mut out = String::new();

        let Some(latest) = self.latest() else {
            let _ = write!(out, "{pad}Run {}: no status received", self.run_id);
            return out;
        };

        let _ = writeln!(
            out,
            "{pad}Run {} ({}): {}, {} jobs",
            self.run_id,
            if latest.name().is_empty() { "unnamed" } else { latest.name() },
            latest.phase(),
            latest.jobs().len()
        );

        for status in RunStatus::ALL {
            let count = latest.jobs().iter().filter(|j| j.status == status).count();
            if count > 0 {
                let _ = writeln!(out, "{pad}  {:<11}: {count}", status.as_str());
            }
        }

        if !latest.jobs().is_empty() {
            let width = latest.jobs().iter().map(|j| j.name.len()).max().unwrap_or(0) + 1;
            let _ = writeln!(out, "{pad}Jobs:");
            for job in latest.jobs() {
                let state = match &job.conclusion {
                    Some(c) if job.status.is_terminal() => format!("{} ({c})", job.status),
                    _ => job.status.to_string(),
                };
                let progress = job.progress();
                let _ = writeln!(
                    out,
                    "{pad}  {:<width$} {:<24} steps {}/{} {:>6.2}%",
                    format!("{}:", job.name),
                    state,
                    progress.complete,
                    progress.total,
                    progress.percent_complete(),
                );
            }
        }

        let progress = self.progress();
        let _ = write!(
            out,
            "{pad}Run percent complete: {:.2}% ({:.2}/{:.2})",
            progress.percent_complete(),
            progress.completed(),
            f64::from(progress.total)
        );
        out
    }
}

fn job_transitions(prev: Option<&StatusSnapshot>, next: &StatusSnapshot) -> Vec<JobTransition> {
    next.jobs()
        .iter()
        .filter_map(|job| {
            let before = prev.and_then(|p| p.jobs().iter().find(|j| j.id == job.id));
            match before {
                Some(b) if b.status == job.status && b.conclusion == job.conclusion => None,
                _ => Some(JobTransition {
                    job_id: job.id,
                    name: job.name.clone(),
                    from: before.map(|b| b.status),
                    to: job.status,
                    conclusion: job.conclusion.clone(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ProviderPayload;
    use serde_json::json;

    fn snap(status: &str, conclusion: Option<&str>, at: f64) -> StatusSnapshot {
        let job_status = if status == "completed" { "completed" } else { "in_progress" };
        let payload = ProviderPayload {
            run: json!({ "id": 7, "name": "ci", "status": status, "conclusion": conclusion }),
            jobs: json!({
                "total_count": 1,
                "jobs": [{
                    "id": 1,
                    "name": "test",
                    "status": job_status,
                    "conclusion": conclusion,
                    "steps": [
                        { "name": "checkout", "status": "completed", "conclusion": "success" },
                        { "name": "cargo test", "status": job_status, "conclusion": conclusion }
                    ]
                }]
            }),
        };
        StatusSnapshot::from_payload(payload, at).unwrap()
    }

    #[test]
    fn test_new_state_is_unfinished() {
        let state = RunState::new(RunId::from(7u64));
        assert!(!state.is_finished());
        assert!(state.outcome().is_none());
        assert!(state.latest().is_none());
        assert_eq!(state.progress(), ProgressStats::default());
    }

    #[test]
    fn test_queued_in_progress_success() {
        let mut state = RunState::new(RunId::from(7u64));
        state.observe(snap("queued", None, 0.0));
        state.observe(snap("in_progress", None, 5.0));
        assert!(!state.is_finished());
        state.observe(snap("completed", Some("success"), 40.0));
        assert!(state.is_finished());
        assert_eq!(state.outcome(), Some(Outcome::Succeeded));
        assert_eq!(state.history().len(), 3);
    }

    #[test]
    fn test_nothing_accepted_after_terminal() {
        let mut state = RunState::new(RunId::from(7u64));
        state.observe(snap("completed", Some("failure"), 10.0));
        let obs = state.observe(snap("in_progress", None, 20.0));
        assert_eq!(obs, Observation::AfterTerminal);
        assert_eq!(state.history().len(), 1);
        assert_eq!(
            state.outcome(),
            Some(Outcome::Failed {
                conclusion: "failure".to_string()
            })
        );
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let mut state = RunState::new(RunId::from(7u64));
        state.observe(snap("in_progress", None, 20.0));
        let obs = state.observe(snap("queued", None, 10.0));
        assert_eq!(obs, Observation::Stale);
        assert_eq!(state.latest().unwrap().elapsed_secs(), 20.0);
    }

    #[test]
    fn test_out_of_order_completion_still_terminates() {
        let mut state = RunState::new(RunId::from(7u64));
        state.observe(snap("in_progress", None, 30.0));
        let obs = state.observe(snap("completed", Some("cancelled"), 12.0));
        assert!(matches!(obs, Observation::Recorded { .. }));
        assert_eq!(state.outcome(), Some(Outcome::Cancelled));

        let stamps: Vec<f64> = state.history().iter().map(|s| s.elapsed_secs()).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_duplicates_converge() {
        let mut state = RunState::new(RunId::from(7u64));
        for _ in 0..3 {
            state.observe(snap("in_progress", None, 5.0));
        }
        state.observe(snap("completed", Some("success"), 5.0));
        state.observe(snap("completed", Some("success"), 5.0));
        assert_eq!(state.outcome(), Some(Outcome::Succeeded));
        assert_eq!(state.history().len(), 4);
    }

    #[test]
    fn test_job_transitions_reported_once() {
        let mut state = RunState::new(RunId::from(7u64));
        let first = state.observe(snap("in_progress", None, 0.0));
        let Observation::Recorded { job_transitions } = first else {
            panic!("expected Recorded");
        };
        assert_eq!(job_transitions.len(), 1);
        assert_eq!(job_transitions[0].from, None);

        let second = state.observe(snap("in_progress", None, 2.0));
        assert_eq!(
            second,
            Observation::Recorded {
                job_transitions: vec![]
            }
        );

        let third = state.observe(snap("completed", Some("success"), 4.0));
        let Observation::Recorded { job_transitions } = third else {
            panic!("expected Recorded");
        };
        assert_eq!(job_transitions[0].from, Some(RunStatus::InProgress));
        assert_eq!(job_transitions[0].to, RunStatus::Completed);
    }

    #[test]
    fn test_progress_forced_complete_on_finish() {
        let mut state = RunState::new(RunId::from(7u64));
        state.observe(snap("in_progress", None, 0.0));
        assert_eq!(state.progress().percent_complete(), 75.0);
        state.observe(snap("completed", Some("failure"), 1.0));
        assert_eq!(state.progress().percent_complete(), 100.0);
    }

    #[test]
    fn test_render_summary() {
        let mut state = RunState::new(RunId::from(7u64));
        assert!(state.render_summary(0).contains("no status received"));

        state.observe(snap("in_progress", None, 0.0));
        let summary = state.render_summary(2);
        assert!(summary.starts_with("  Run 7 (ci): in_progress, 1 jobs"));
        assert!(summary.contains("test:"));
        assert!(summary.contains("steps 1/2"));
        assert!(summary.contains("Run percent complete: 75.00% (1.50/2.00)"));
    }
}
