use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::{
    fairing::{self, AdHoc},
    Build, Rocket,
};
use rocket_db_pools::Database;
use shared::{
    recompute, ContributionRecord, LeaderboardEntry, RepoName, Scoring, SyncError, UpsertOutcome,
};

use crate::config::StorageKind;

mod memory;
mod postgres;
pub mod types;

pub use memory::MemoryStore;
pub use postgres::DB;

/// Result of recomputing the cached leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRebuild {
    pub entries: Vec<LeaderboardEntry>,
    /// The cache differed and was replaced.
    pub updated: bool,
}

/// Persistent home of contribution records, the cached leaderboard and per-repo sync cursors.
///
/// Every method fails with [`SyncError::StoreUnavailable`] when the backend does.
/// `upsert` is atomic per key and follows [`shared::reconcile`].
#[rocket::async_trait]
pub trait ContributionStore: Send + Sync {
    async fn upsert(&self, record: ContributionRecord) -> Result<UpsertOutcome, SyncError>;

    async fn contributions(&self) -> Result<Vec<ContributionRecord>, SyncError>;

    /// Newest pull requests first. Returns the page and the total number of records.
    async fn repo_contributions(
        &self,
        repo: &RepoName,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ContributionRecord>, u64), SyncError>;

    async fn author_contributions(&self, login: &str)
        -> Result<Vec<ContributionRecord>, SyncError>;

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SyncError>;

    async fn leaderboard_page(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<LeaderboardEntry>, u64), SyncError>;

    async fn leaderboard_entry(&self, login: &str) -> Result<Option<LeaderboardEntry>, SyncError>;

    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<(), SyncError>;

    /// Recomputes the leaderboard from every stored record and replaces the cache if it changed.
    ///
    /// Backends override this to make the read, compare and replace one atomic step.
    async fn rebuild_leaderboard(
        &self,
        scoring: &dyn Scoring,
    ) -> Result<LeaderboardRebuild, SyncError> {
        let records = self.contributions().await?;
        let entries = recompute(&records, scoring);
        let updated = self.leaderboard().await? != entries;
        if updated {
            self.replace_leaderboard(&entries).await?;
        }
        Ok(LeaderboardRebuild { entries, updated })
    }

    async fn sync_cursor(&self, repo: &RepoName) -> Result<Option<DateTime<Utc>>, SyncError>;

    async fn set_sync_cursor(&self, repo: &RepoName, at: DateTime<Utc>) -> Result<(), SyncError>;
}

pub type SharedStore = Arc<dyn ContributionStore>;

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    let db = match DB::fetch(&rocket) {
        Some(db) => db.clone(),
        None => return Err(rocket),
    };
    match sqlx::migrate!("./migrations").run(&*db).await {
        Ok(_) => Ok(rocket.manage::<SharedStore>(Arc::new(db))),
        Err(e) => {
            rocket::error!("Failed to initialize SQLx database: {}", e);
            Err(rocket)
        }
    }
}

/// Installs the configured store, then attaches `next`, which may rely on it being managed.
pub fn stage(storage: StorageKind, next: AdHoc) -> AdHoc {
    AdHoc::on_ignite("Contribution store", move |rocket| async move {
        match storage {
            StorageKind::Postgres => rocket
                .attach(DB::init())
                .attach(AdHoc::try_on_ignite("SQLx Migrations", run_migrations))
                .attach(next),
            StorageKind::Memory => {
                let store: SharedStore = Arc::new(MemoryStore::default());
                rocket.manage(store).attach(next)
            }
        }
    })
}
