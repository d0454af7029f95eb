//! Explicit configuration for the provider transport and the poll loop.

use std::time::Duration;

use runwatch_domain::RunId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_RETRIES: u32 = 60;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to reach the CI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// REST API base URL, without a trailing slash
    pub api_url: String,
    /// `owner/repo`
    pub repository: Option<String>,
    /// Bearer token (optional for public repositories)
    pub token: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_url: DEFAULT_API_URL.to_string(),
            repository: None,
            token: None,
            user_agent: format!("runwatch/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Read `GITHUB_API_URL`, `GITHUB_REPOSITORY` and `GITHUB_TOKEN` (or `GH_TOKEN`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ProviderConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = ProviderConfig::default();
        if let Some(url) = non_empty("GITHUB_API_URL") {
            config = config.with_api_url(&url);
        }
        config.repository = non_empty("GITHUB_REPOSITORY");
        config.token = non_empty("GITHUB_TOKEN").or_else(|| non_empty("GH_TOKEN"));
        config
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_repository(mut self, repository: &str) -> Self {
        self.repository = Some(repository.to_string());
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Split the configured repository into `(owner, repo)`.
    pub fn owner_repo(&self) -> Result<(&str, &str)> {
        let slug = self
            .repository
            .as_deref()
            .ok_or_else(|| WatchError::Config("no repository configured (owner/repo)".into()))?;
        match slug.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok((owner, repo))
            }
            _ => Err(WatchError::Config(format!(
                "repository must look like owner/repo, got {slug:?}"
            ))),
        }
    }
}

/// Parameters of one wait session.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitConfig {
    pub run_id: RunId,
    /// Fixed delay between polls
    pub interval: Duration,
    /// Consecutive failed fetches tolerated before giving up
    pub max_retries: u32,
    /// Overall deadline; `None` waits for as long as the run takes
    pub timeout: Option<Duration>,
}

impl WaitConfig {
    pub fn new(run_id: RunId) -> Self {
        WaitConfig {
            run_id,
            interval: DEFAULT_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
