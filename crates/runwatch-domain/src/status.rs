//! Provider status vocabularies and the run state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SnapshotError;

// ============================================================================
// 1. STATUS - where a run or job is in its lifecycle
// ============================================================================

/// Lifecycle status reported by the provider for a run, job or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Pending,
    Waiting,
    Requested,
    InProgress,
    Completed,
}

impl RunStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [RunStatus; 6] = [
        RunStatus::Requested,
        RunStatus::Pending,
        RunStatus::Queued,
        RunStatus::Waiting,
        RunStatus::InProgress,
        RunStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Pending => "pending",
            RunStatus::Waiting => "waiting",
            RunStatus::Requested => "requested",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
        }
    }

    /// `completed` is the only status with no outgoing transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl FromStr for RunStatus {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "pending" => Ok(RunStatus::Pending),
            "waiting" => Ok(RunStatus::Waiting),
            "requested" => Ok(RunStatus::Requested),
            "in_progress" => Ok(RunStatus::InProgress),
            "completed" => Ok(RunStatus::Completed),
            other => Err(SnapshotError::UnknownStatus {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// 2. CONCLUSION - final disposition of a completed run or job
// ============================================================================

/// Final disposition of a completed run, job or step.
///
/// Values the provider documents get their own variant. Anything else is kept
/// verbatim in `Unrecognized` so it can be reported instead of silently folded
/// into a known value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    Stale,
    StartupFailure,
    Unrecognized(String),
}

impl Conclusion {
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Conclusion::Success,
            "failure" => Conclusion::Failure,
            "cancelled" => Conclusion::Cancelled,
            "skipped" => Conclusion::Skipped,
            "timed_out" => Conclusion::TimedOut,
            "action_required" => Conclusion::ActionRequired,
            "neutral" => Conclusion::Neutral,
            "stale" => Conclusion::Stale,
            "startup_failure" => Conclusion::StartupFailure,
            other => Conclusion::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Skipped => "skipped",
            Conclusion::TimedOut => "timed_out",
            Conclusion::ActionRequired => "action_required",
            Conclusion::Neutral => "neutral",
            Conclusion::Stale => "stale",
            Conclusion::StartupFailure => "startup_failure",
            Conclusion::Unrecognized(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Conclusion::Success)
    }
}

impl From<String> for Conclusion {
    fn from(s: String) -> Self {
        Conclusion::parse(&s)
    }
}

impl From<Conclusion> for String {
    fn from(c: Conclusion) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// 3. RUN PHASE - the state machine the waiter reasons about
// ============================================================================

/// Collapsed run state: the provider has several pre-start statuses, the
/// waiter only cares whether the run has started and whether it has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Queued,
    InProgress,
    Completed(Option<Conclusion>),
}

impl RunPhase {
    pub fn from_status(status: RunStatus, conclusion: Option<&Conclusion>) -> Self {
        match status {
            RunStatus::Queued | RunStatus::Pending | RunStatus::Waiting | RunStatus::Requested => {
                RunPhase::Queued
            }
            RunStatus::InProgress => RunPhase::InProgress,
            RunStatus::Completed => RunPhase::Completed(conclusion.cloned()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed(_))
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Queued => write!(f, "queued"),
            RunPhase::InProgress => write!(f, "in_progress"),
            RunPhase::Completed(Some(c)) => write!(f, "completed ({c})"),
            RunPhase::Completed(None) => write!(f, "completed"),
        }
    }
}
