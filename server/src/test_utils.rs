use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use rocket::tokio::sync::Notify;
use shared::{
    ContributionRecord, LeaderboardEntry, PullRequestSource, RawBranch, RawPullRequest,
    RawRepository, RawUser, RepoName, SyncError, UpsertOutcome,
};

use crate::db::{ContributionStore, MemoryStore};

pub fn repo(name: &str) -> RepoName {
    name.parse().unwrap()
}

pub fn raw_pr(repo: &str, number: u64, author: &str, merged: bool) -> RawPullRequest {
    let merged_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    RawPullRequest {
        number: Some(number),
        state: Some(if merged { "closed" } else { "open" }.to_string()),
        merged: None,
        merged_at: merged.then_some(merged_at),
        updated_at: Some(merged_at),
        user: Some(RawUser {
            login: Some(author.to_string()),
        }),
        additions: Some(10),
        deletions: Some(2),
        base: Some(RawBranch {
            repo: Some(RawRepository {
                full_name: Some(repo.to_string()),
            }),
        }),
    }
}

/// Replays a fixed list of items on every call, optionally waiting on a gate first.
#[derive(Default)]
pub struct ScriptedSource {
    items: Mutex<Vec<Result<RawPullRequest, SyncError>>>,
    gate: Option<Arc<Notify>>,
    since_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl ScriptedSource {
    pub fn new(items: Vec<Result<RawPullRequest, SyncError>>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Default::default()
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_items(&self, items: Vec<Result<RawPullRequest, SyncError>>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn since_seen(&self) -> Vec<Option<DateTime<Utc>>> {
        self.since_seen.lock().unwrap().clone()
    }
}

impl PullRequestSource for ScriptedSource {
    fn pull_requests<'a>(
        &'a self,
        _repo: &'a RepoName,
        since: Option<DateTime<Utc>>,
    ) -> BoxStream<'a, Result<RawPullRequest, SyncError>> {
        self.since_seen.lock().unwrap().push(since);
        let items = self.items.lock().unwrap().clone();
        let gate = self.gate.clone();
        stream::once(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            stream::iter(items)
        })
        .flatten()
        .boxed()
    }
}

/// Reads work, every write fails.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
}

fn down() -> SyncError {
    SyncError::store("connection refused")
}

#[rocket::async_trait]
impl ContributionStore for FailingStore {
    async fn upsert(&self, _record: ContributionRecord) -> Result<UpsertOutcome, SyncError> {
        Err(down())
    }

    async fn contributions(&self) -> Result<Vec<ContributionRecord>, SyncError> {
        self.inner.contributions().await
    }

    async fn repo_contributions(
        &self,
        _repo: &RepoName,
        _page: u64,
        _limit: u64,
    ) -> Result<(Vec<ContributionRecord>, u64), SyncError> {
        Err(down())
    }

    async fn author_contributions(
        &self,
        login: &str,
    ) -> Result<Vec<ContributionRecord>, SyncError> {
        self.inner.author_contributions(login).await
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SyncError> {
        self.inner.leaderboard().await
    }

    async fn leaderboard_page(
        &self,
        _page: u64,
        _limit: u64,
    ) -> Result<(Vec<LeaderboardEntry>, u64), SyncError> {
        Err(down())
    }

    async fn leaderboard_entry(&self, login: &str) -> Result<Option<LeaderboardEntry>, SyncError> {
        self.inner.leaderboard_entry(login).await
    }

    async fn replace_leaderboard(&self, _entries: &[LeaderboardEntry]) -> Result<(), SyncError> {
        Err(down())
    }

    async fn sync_cursor(&self, repo: &RepoName) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.inner.sync_cursor(repo).await
    }

    async fn set_sync_cursor(&self, _repo: &RepoName, _at: DateTime<Utc>) -> Result<(), SyncError> {
        Err(down())
    }
}
