//! Terminal result of waiting on a run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::Conclusion;

/// How a wait ended.
///
/// `Failed`, `Cancelled` and `TimedOut` are legitimate CI results, not
/// software errors; each maps to its own exit code so calling scripts can
/// branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed { conclusion: String },
    Cancelled,
    TimedOut,
    TransportError { attempts: u32, last_error: String },
}

impl Outcome {
    /// Map a completed run's conclusion to an outcome.
    ///
    /// Only an explicit `success` succeeds and only an explicit `cancelled`
    /// cancels; a missing or unrecognized conclusion is a failure.
    pub fn from_conclusion(conclusion: Option<&Conclusion>) -> Self {
        match conclusion {
            Some(Conclusion::Success) => Outcome::Succeeded,
            Some(Conclusion::Cancelled) => Outcome::Cancelled,
            Some(other) => Outcome::Failed {
                conclusion: other.as_str().to_string(),
            },
            None => Outcome::Failed {
                conclusion: "none".to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Succeeded => 0,
            Outcome::Failed { .. } => 1,
            Outcome::Cancelled => 2,
            Outcome::TimedOut => 3,
            Outcome::TransportError { .. } => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed { .. } => "failed",
            Outcome::Cancelled => "cancelled",
            Outcome::TimedOut => "timed_out",
            Outcome::TransportError { .. } => "transport_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed { conclusion } => write!(f, "failed ({conclusion})"),
            Outcome::TransportError {
                attempts,
                last_error,
            } => write!(
                f,
                "transport error after {attempts} attempts: {last_error}"
            ),
            other => f.write_str(other.label()),
        }
    }
}
