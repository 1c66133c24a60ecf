use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use rocket::{fairing::AdHoc, tokio::sync::Mutex, Build, Rocket};
use serde::{Deserialize, Serialize};
use shared::{normalize, PullRequestSource, RepoName, Scoring, SyncError, UpsertOutcome};
use strum::Display;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::db::SharedStore;

mod lock;
pub mod scheduled;

pub use lock::{SyncGuard, SyncLocks};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Normalizing,
    Upserting,
    Aggregating,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub repo_full_name: String,
    /// Pull requests that reached the store.
    pub prs_processed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Pull requests that failed to fetch or normalize.
    pub skipped: u64,
    pub upserted: u64,
    pub leaderboard_size: u64,
    pub leaderboard_updated: bool,
    /// Fetching stopped early because GitHub rate limited us.
    pub truncated: bool,
    pub success: bool,
    pub retry_after_secs: Option<u64>,
}

impl SyncSummary {
    fn new(repo: &RepoName) -> Self {
        Self {
            repo_full_name: repo.full_name(),
            ..Default::default()
        }
    }

    fn tally(&mut self, outcome: UpsertOutcome) {
        self.prs_processed += 1;
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Runs fetch, normalize, upsert and aggregate for one repository at a time.
pub struct SyncService {
    source: Arc<dyn PullRequestSource>,
    store: SharedStore,
    scoring: Arc<dyn Scoring>,
    locks: SyncLocks,
    /// Leaderboard rebuilds touch every repository's records, so they run one at a time.
    aggregation: Mutex<()>,
    incremental: bool,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn PullRequestSource>,
        store: SharedStore,
        scoring: Arc<dyn Scoring>,
        incremental: bool,
    ) -> Self {
        Self {
            source,
            store,
            scoring,
            locks: SyncLocks::default(),
            aggregation: Mutex::new(()),
            incremental,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn phase(&self, repo: &RepoName) -> SyncPhase {
        self.locks.phase(repo)
    }

    pub fn in_flight(&self) -> Vec<(RepoName, SyncPhase)> {
        self.locks.snapshot()
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn sync(&self, repo: &RepoName) -> Result<SyncSummary, SyncError> {
        let guard = self.locks.acquire(repo)?;
        let started_at = Utc::now();
        let since = if self.incremental {
            self.store.sync_cursor(repo).await?
        } else {
            None
        };
        let mut summary = SyncSummary::new(repo);
        let full_name = repo.full_name();

        let mut pull_requests = self.source.pull_requests(repo, since);
        while let Some(item) = pull_requests.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(SyncError::RateLimited { retry_after }) => {
                    warn!(
                        "Rate limited after {} pull requests, retry in {}s",
                        summary.prs_processed,
                        retry_after.as_secs()
                    );
                    summary.truncated = true;
                    summary.retry_after_secs = Some(retry_after.as_secs());
                    break;
                }
                Err(e) => {
                    warn!("Skipping unreadable page or pull request: {e}");
                    summary.skipped += 1;
                    continue;
                }
            };

            guard.set_phase(SyncPhase::Normalizing);
            let record = match normalize(raw) {
                Ok(record) if record.repo_full_name == full_name => record,
                Ok(record) => {
                    warn!(
                        "Skipping {}#{}: belongs to another repository",
                        record.repo_full_name, record.pr_number
                    );
                    summary.skipped += 1;
                    guard.set_phase(SyncPhase::Fetching);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping pull request: {e}");
                    summary.skipped += 1;
                    guard.set_phase(SyncPhase::Fetching);
                    continue;
                }
            };

            guard.set_phase(SyncPhase::Upserting);
            let outcome = self.store.upsert(record).await?;
            summary.tally(outcome);
            guard.set_phase(SyncPhase::Fetching);
        }
        drop(pull_requests);

        guard.set_phase(SyncPhase::Aggregating);
        let rebuild = {
            let _aggregating = self.aggregation.lock().await;
            self.store.rebuild_leaderboard(self.scoring.as_ref()).await?
        };
        summary.leaderboard_updated = rebuild.updated;
        summary.leaderboard_size = rebuild.entries.len() as u64;
        summary.upserted = summary.created + summary.updated;
        summary.success = !summary.truncated && summary.skipped == 0;

        if self.incremental && summary.success {
            self.store.set_sync_cursor(repo, started_at).await?;
        }

        info!(
            processed = summary.prs_processed,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            truncated = summary.truncated,
            leaderboard_updated = summary.leaderboard_updated,
            "Sync finished"
        );
        Ok(summary)
    }
}

/// Manages the [`SyncService`]. Must be attached after the store is managed.
pub fn stage(
    source: Arc<dyn PullRequestSource>,
    scoring: Arc<dyn Scoring>,
    incremental: bool,
) -> AdHoc {
    AdHoc::try_on_ignite("Sync service", move |rocket: Rocket<Build>| async move {
        let Some(store) = rocket.state::<SharedStore>().cloned() else {
            rocket::error!("Contribution store is not configured");
            return Err(rocket);
        };
        let service = SyncService::new(source, store, scoring, incremental);
        Ok(rocket.manage(Arc::new(service)))
    })
}
