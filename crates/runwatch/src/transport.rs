//! Fetching run status: the `StatusSource` seam and the GitHub REST transport.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use runwatch_domain::{ProviderPayload, RunId, StatusSnapshot};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::cancel::CancelSignal;
use crate::config::ProviderConfig;
use crate::error::{Result, WatchError};

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const JOBS_PER_PAGE: usize = 100;
const MAX_JOB_PAGES: u32 = 50;
const ERROR_BODY_LIMIT: usize = 200;

/// Anything that can answer "what is the status of this run right now".
///
/// Implemented by the live transport, the capture recorder, the replay driver
/// and the test fakes. Implementations never retry internally.
#[async_trait]
pub trait StatusSource: Send {
    async fn fetch(&mut self, run_id: &RunId) -> Result<StatusSnapshot>;
}

#[async_trait]
impl<S: StatusSource + ?Sized> StatusSource for Box<S> {
    async fn fetch(&mut self, run_id: &RunId) -> Result<StatusSnapshot> {
        (**self).fetch(run_id).await
    }
}

/// Live transport against the GitHub Actions REST API.
pub struct GithubTransport {
    config: ProviderConfig,
    repo_url: String,
    http_client: reqwest::Client,
    started: Instant,
}

impl GithubTransport {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let (owner, repo) = config.owner_repo()?;
        let repo_url = format!("{}/repos/{owner}/{repo}", config.api_url);

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| WatchError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(GithubTransport {
            config,
            repo_url,
            http_client,
            started: Instant::now(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut request = self
            .http_client
            .get(url)
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(WatchError::Transport(format!(
                "GET {url} returned {status}: {}",
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            WatchError::Transport(format!("GET {url} returned a non-JSON body: {e}"))
        })
    }

    /// All jobs of a run, following pages until `total_count` jobs are collected.
    async fn fetch_jobs(&self, run_id: &RunId) -> Result<Value> {
        let mut jobs: Vec<Value> = Vec::new();
        let mut total_count: Option<u64> = None;

        for page in 1..=MAX_JOB_PAGES {
            let url = format!(
                "{}/actions/runs/{run_id}/jobs?per_page={JOBS_PER_PAGE}&page={page}",
                self.repo_url
            );
            let body = self.get_json(&url).await?;

            let Some(page_jobs) = body.get("jobs").and_then(Value::as_array) else {
                // Not a jobs document; let the snapshot parser report it.
                return Ok(body);
            };
            let page_len = page_jobs.len();
            jobs.extend(page_jobs.iter().cloned());
            if total_count.is_none() {
                total_count = body.get("total_count").and_then(Value::as_u64);
            }

            let expected = total_count.unwrap_or(jobs.len() as u64);
            if page_len < JOBS_PER_PAGE || jobs.len() as u64 >= expected {
                break;
            }
        }

        Ok(json!({
            "total_count": total_count.unwrap_or(jobs.len() as u64),
            "jobs": jobs,
        }))
    }

    /// The newest run recorded for `head_sha`, if any.
    #[instrument(skip(self))]
    pub async fn latest_run_for_commit(&self, head_sha: &str) -> Result<Option<RunId>> {
        let url = format!(
            "{}/actions/runs?head_sha={head_sha}&per_page=10",
            self.repo_url
        );
        let body = self.get_json(&url).await?;
        let runs = body
            .get("workflow_runs")
            .and_then(Value::as_array)
            .ok_or_else(|| WatchError::Transport(format!("GET {url}: no workflow_runs array")))?;

        let newest = runs
            .iter()
            .filter_map(|run| {
                let id = run.get("id").and_then(Value::as_u64)?;
                let created = run
                    .get("created_at")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                    .unwrap_or_default();
                Some((created, id))
            })
            .max();

        Ok(newest.map(|(_, id)| RunId::from(id)))
    }

    /// Poll [`GithubTransport::latest_run_for_commit`] until a run shows up.
    ///
    /// Runs take a few seconds to appear after a push, so an empty answer is
    /// retried every `delay` for up to `attempts` tries. Returns `Ok(None)`
    /// when `cancel` fires first.
    pub async fn resolve_run_for_commit(
        &self,
        head_sha: &str,
        attempts: u32,
        delay: Duration,
        cancel: &CancelSignal,
    ) -> Result<Option<RunId>> {
        for attempt in 1..=attempts {
            let lookup = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                lookup = self.latest_run_for_commit(head_sha) => lookup,
            };
            match lookup {
                Ok(Some(run_id)) => {
                    debug!(%run_id, head_sha, attempt, "resolved run for commit");
                    return Ok(Some(run_id));
                }
                Ok(None) => debug!(head_sha, attempt, "no run for commit yet"),
                Err(e) if e.is_retryable() => {
                    warn!(head_sha, attempt, error = %e, "run lookup failed")
                }
                Err(e) => return Err(e),
            }
            if attempt < attempts && !cancel.sleep(delay).await {
                return Ok(None);
            }
        }
        Err(WatchError::RunNotFound(head_sha.to_string()))
    }
}

#[async_trait]
impl StatusSource for GithubTransport {
    async fn fetch(&mut self, run_id: &RunId) -> Result<StatusSnapshot> {
        let run = self
            .get_json(&format!("{}/actions/runs/{run_id}", self.repo_url))
            .await?;
        let jobs = self.fetch_jobs(run_id).await?;
        trace!(%run_id, run = %run, jobs = %jobs, "provider payload");

        let payload = ProviderPayload { run, jobs };
        let snapshot = StatusSnapshot::from_payload(payload, self.started.elapsed().as_secs_f64())?;
        Ok(snapshot)
    }
}

fn truncate(body: &str, limit: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
