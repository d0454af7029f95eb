//! Poll loop: fetch, observe, decide, sleep.
//!
//! The waiter is the only place that decides retry versus fatal. Sources and
//! the domain model never retry on their own.

use std::time::Duration;

use runwatch_domain::{Observation, Outcome, RunState};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::cancel::CancelSignal;
use crate::config::WaitConfig;
use crate::error::{Result, WatchError};
use crate::obs;
use crate::transport::StatusSource;

/// Counters for one wait session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaitStats {
    /// Fetches issued
    pub polls: u32,
    /// Snapshots handed to the run state
    pub snapshots: u32,
    pub transport_failures: u32,
    pub malformed_snapshots: u32,
    /// Snapshots dropped for being older than the latest one
    pub stale_snapshots: u32,
}

enum Tick {
    Elapsed,
    Cancelled,
    Deadline,
}

/// Waits for one run to reach a terminal state.
pub struct Waiter<S> {
    source: S,
    config: WaitConfig,
    state: RunState,
    stats: WaitStats,
    cancel: CancelSignal,
}

impl<S: StatusSource> Waiter<S> {
    pub fn new(source: S, config: WaitConfig) -> Self {
        let state = RunState::new(config.run_id.clone());
        Waiter {
            source,
            config,
            state,
            stats: WaitStats::default(),
            cancel: CancelSignal::never(),
        }
    }

    /// Abort the wait with `Outcome::Cancelled` when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn stats(&self) -> WaitStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Give the source back, e.g. to close a capture recorder.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Poll until the run finishes, the retry bound is hit, the deadline
    /// passes, or cancellation is requested.
    ///
    /// Returns `Err` only for non-retryable failures such as a mismatched or
    /// exhausted capture.
    #[instrument(skip(self), fields(run_id = %self.config.run_id))]
    pub async fn wait(&mut self) -> Result<Outcome> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|t| started + t);
        let run_id = self.config.run_id.clone();
        obs::emit_wait_started(
            &run_id,
            duration_ms(self.config.interval),
            self.config.max_retries,
        );

        let mut failures: u32 = 0;
        let outcome = loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Outcome::TimedOut;
            }

            self.stats.polls += 1;
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Outcome::Cancelled,
                _ = until(deadline) => break Outcome::TimedOut,
                result = self.source.fetch(&run_id) => result,
            };

            match fetched {
                Ok(snapshot) => {
                    failures = 0;
                    self.stats.snapshots += 1;
                    obs::emit_snapshot_observed(&run_id, &snapshot);

                    match self.state.observe(snapshot) {
                        Observation::Recorded { job_transitions } => {
                            for transition in &job_transitions {
                                obs::emit_job_transition(&run_id, transition);
                            }
                        }
                        Observation::Stale => {
                            self.stats.stale_snapshots += 1;
                            debug!(%run_id, "dropped stale snapshot");
                        }
                        Observation::AfterTerminal => {}
                    }

                    if let Some(outcome) = self.state.outcome() {
                        break outcome;
                    }
                }
                Err(e) if e.is_retryable() => {
                    if matches!(e, WatchError::MalformedSnapshot(_)) {
                        self.stats.malformed_snapshots += 1;
                    } else {
                        self.stats.transport_failures += 1;
                    }
                    failures += 1;
                    obs::emit_fetch_failed(&run_id, failures, self.config.max_retries, &e);
                    if failures > self.config.max_retries {
                        break Outcome::TransportError {
                            attempts: failures,
                            last_error: e.to_string(),
                        };
                    }
                }
                Err(e) => {
                    obs::emit_wait_aborted(&run_id, &e);
                    return Err(e);
                }
            }

            let tick = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Tick::Cancelled,
                _ = until(deadline) => Tick::Deadline,
                _ = tokio::time::sleep(self.config.interval) => Tick::Elapsed,
            };
            match tick {
                Tick::Elapsed => {}
                Tick::Cancelled => break Outcome::Cancelled,
                Tick::Deadline => break Outcome::TimedOut,
            }
        };

        obs::emit_wait_finished(&run_id, &outcome, duration_ms(started.elapsed()), &self.stats);
        Ok(outcome)
    }
}

/// Resolves at `deadline`, or never without one.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
