use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use http::{header::RETRY_AFTER, HeaderMap, StatusCode, Uri};
use octocrab::Octocrab;
use tracing::{instrument, warn};

use crate::{PullRequestSource, RawPullRequest, RepoName, SyncError};

/// Consecutive failed pages after which a listing gives up.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    pub token: Option<String>,
    /// Overrides `https://api.github.com`, e.g. for GitHub Enterprise.
    pub api_url: Option<String>,
    pub per_page: u8,
    pub request_timeout: Duration,
    /// Re-fetch every listed pull request to learn its merge flag and diff size.
    pub fetch_diff_stats: bool,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: None,
            per_page: 100,
            request_timeout: Duration::from_secs(30),
            fetch_diff_stats: false,
        }
    }
}

pub struct GithubClient {
    octocrab: Octocrab,
    per_page: u8,
    request_timeout: Duration,
    fetch_diff_stats: bool,
}

impl GithubClient {
    pub fn new(config: GithubClientConfig) -> Result<Self, SyncError> {
        let mut builder = Octocrab::builder();
        if let Some(token) = config.token {
            builder = builder.personal_token(token);
        }
        if let Some(api_url) = config.api_url {
            builder = builder
                .base_uri(api_url)
                .map_err(|e| SyncError::upstream(format!("invalid GitHub API url: {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| SyncError::upstream(format!("failed to build GitHub client: {e}")))?;

        Ok(Self {
            octocrab,
            per_page: config.per_page.max(1),
            request_timeout: config.request_timeout,
            fetch_diff_stats: config.fetch_diff_stats,
        })
    }

    async fn get(&self, path: &str) -> Result<String, SyncError> {
        let uri: Uri = path
            .parse()
            .map_err(|e| SyncError::upstream(format!("invalid request path {path}: {e}")))?;

        let request = async {
            let response = self
                .octocrab
                ._get(uri)
                .await
                .map_err(|e| SyncError::upstream(format!("GET {path}: {e}")))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = self
                .octocrab
                .body_to_string(response)
                .await
                .map_err(|e| SyncError::upstream(format!("GET {path}: failed to read body: {e}")))?;
            match classify_response(status, &headers, &body, Utc::now()) {
                Some(e) => Err(e),
                None => Ok(body),
            }
        };

        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                SyncError::upstream(format!(
                    "GET {path} timed out after {}s",
                    self.request_timeout.as_secs_f32()
                ))
            })?
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_page(
        &self,
        repo: &RepoName,
        page: u32,
    ) -> Result<Vec<Result<RawPullRequest, SyncError>>, SyncError> {
        let path = format!(
            "/repos/{}/{}/pulls?state=all&sort=updated&direction=desc&per_page={}&page={}",
            repo.owner(),
            repo.repo(),
            self.per_page,
            page
        );
        let body = self.get(&path).await?;
        let items: Vec<serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| SyncError::upstream(format!("page {page} is not a JSON array: {e}")))?;

        Ok(items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| SyncError::malformed(e.to_string()))
            })
            .collect())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<RawPullRequest, SyncError> {
        let path = format!("/repos/{}/{}/pulls/{}", repo.owner(), repo.repo(), number);
        let body = self.get(&path).await?;
        serde_json::from_str(&body).map_err(|e| SyncError::malformed(format!("#{number}: {e}")))
    }
}

impl PullRequestSource for GithubClient {
    fn pull_requests<'a>(
        &'a self,
        repo: &'a RepoName,
        since: Option<DateTime<Utc>>,
    ) -> BoxStream<'a, Result<RawPullRequest, SyncError>> {
        let pager = Pager {
            client: self,
            repo,
            since,
            page: 0,
            buffer: VecDeque::new(),
            done: false,
            failures: 0,
        };
        stream::unfold(pager, |mut pager| async move {
            let item = pager.next().await?;
            Some((item, pager))
        })
        .boxed()
    }
}

struct Pager<'a> {
    client: &'a GithubClient,
    repo: &'a RepoName,
    since: Option<DateTime<Utc>>,
    page: u32,
    buffer: VecDeque<Result<RawPullRequest, SyncError>>,
    done: bool,
    failures: u32,
}

impl Pager<'_> {
    async fn next(&mut self) -> Option<Result<RawPullRequest, SyncError>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(self.complete(item).await);
            }
            if self.done {
                return None;
            }

            self.page += 1;
            match self.client.list_page(self.repo, self.page).await {
                Ok(items) => {
                    self.failures = 0;
                    if items.len() < self.client.per_page as usize {
                        self.done = true;
                    }
                    for item in items {
                        if self.is_before_cursor(&item) {
                            // Sorted by update time, everything after this is older still
                            self.done = true;
                            break;
                        }
                        self.buffer.push_back(item);
                    }
                }
                Err(e) => {
                    self.failures += 1;
                    if matches!(e, SyncError::RateLimited { .. })
                        || self.failures >= MAX_CONSECUTIVE_PAGE_FAILURES
                    {
                        self.done = true;
                    }
                    warn!("Failed to list page {} of {}: {e}", self.page, self.repo);
                    return Some(Err(e));
                }
            }
        }
    }

    fn is_before_cursor(&self, item: &Result<RawPullRequest, SyncError>) -> bool {
        match (self.since, item) {
            (Some(since), Ok(pr)) => pr.updated_at.is_some_and(|updated| updated < since),
            _ => false,
        }
    }

    async fn complete(
        &mut self,
        item: Result<RawPullRequest, SyncError>,
    ) -> Result<RawPullRequest, SyncError> {
        let pr = item?;
        let Some(number) = pr.number.filter(|_| self.client.fetch_diff_stats) else {
            return Ok(pr);
        };
        let detailed = self.client.pull_request(self.repo, number).await;
        if let Err(SyncError::RateLimited { .. }) = detailed {
            self.done = true;
            self.buffer.clear();
        }
        detailed
    }
}

/// Maps a non-success response to the sync error taxonomy; `None` for 2xx.
pub(crate) fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> Option<SyncError> {
    if status.is_success() {
        return None;
    }

    let message = github_message(body).unwrap_or_else(|| "unknown error".to_string());
    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0");
    let is_rate_limit = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (quota_exhausted || message.to_lowercase().contains("rate limit")));

    if is_rate_limit {
        Some(SyncError::RateLimited {
            retry_after: retry_after(headers, now),
        })
    } else {
        Some(SyncError::upstream(format!(
            "GitHub returned {status}: {message}"
        )))
    }
}

fn header_u64(headers: &HeaderMap, name: impl http::header::AsHeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// `retry-after` seconds, else time until `x-ratelimit-reset`, else a minute.
pub(crate) fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    if let Some(seconds) = header_u64(headers, RETRY_AFTER) {
        return Duration::from_secs(seconds);
    }
    if let Some(reset_at) = header_u64(headers, "x-ratelimit-reset") {
        let wait = (reset_at as i64).saturating_sub(now.timestamp()).max(1);
        return Duration::from_secs(wait as u64);
    }
    DEFAULT_RETRY_AFTER
}

fn github_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(ToString::to_string)
}
