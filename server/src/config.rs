use std::time::Duration;

use serde::Deserialize;
use shared::{github::GithubClientConfig, PointsFormula, RepoName};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Postgres,
    Memory,
}

fn default_true() -> bool {
    true
}

/// Process environment, loaded with `envy` after `.env` has been applied.
#[derive(Debug, Clone, Deserialize)]
pub struct Env {
    pub admin_token: String,
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default)]
    pub sync_repos: Vec<String>,
    pub sync_interval_in_minutes: Option<u32>,
    #[serde(default = "default_true")]
    pub incremental_sync: bool,
    #[serde(default)]
    pub fetch_diff_stats: bool,
    pub request_timeout_in_seconds: Option<u64>,
    pub per_page: Option<u8>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Env {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(envy::from_env::<Env>()?)
    }

    /// Scoring knobs come from `POINTS_*` variables.
    pub fn points_formula() -> anyhow::Result<PointsFormula> {
        Ok(envy::prefixed("POINTS_").from_env::<PointsFormula>()?)
    }

    pub fn github_config(&self) -> GithubClientConfig {
        let defaults = GithubClientConfig::default();
        GithubClientConfig {
            token: self.github_token.clone(),
            api_url: self.github_api_url.clone(),
            per_page: self.per_page.unwrap_or(defaults.per_page),
            request_timeout: self
                .request_timeout_in_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            fetch_diff_stats: self.fetch_diff_stats,
        }
    }

    pub fn sync_repos(&self) -> anyhow::Result<Vec<RepoName>> {
        Ok(self
            .sync_repos
            .iter()
            .filter(|repo| !repo.trim().is_empty())
            .map(|repo| repo.parse::<RepoName>())
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// At least one minute; a zero period would make the scheduler panic.
    pub fn sync_interval(&self) -> Duration {
        let minutes = self.sync_interval_in_minutes.unwrap_or(60).max(1);
        Duration::from_secs(minutes as u64 * 60)
    }

    /// Minimal settings for local runs and tests.
    pub fn in_memory(admin_token: &str) -> Self {
        Self {
            admin_token: admin_token.to_string(),
            github_token: None,
            github_api_url: None,
            storage: StorageKind::Memory,
            sync_repos: vec![],
            sync_interval_in_minutes: None,
            incremental_sync: true,
            fetch_diff_stats: false,
            request_timeout_in_seconds: None,
            per_page: None,
            allowed_origins: vec![],
        }
    }
}
