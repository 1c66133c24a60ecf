use std::str::FromStr;

use chrono::{DateTime, Utc};
use shared::{ContributionRecord, LeaderboardEntry, PrState, SyncError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContributionRow {
    pub repo_full_name: String,
    pub pr_number: i64,
    pub author_login: String,
    pub state: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub additions: i64,
    pub deletions: i64,
}

impl TryFrom<ContributionRow> for ContributionRecord {
    type Error = SyncError;

    fn try_from(row: ContributionRow) -> Result<Self, Self::Error> {
        let state = PrState::from_str(&row.state).map_err(|_| {
            SyncError::store(format!(
                "unknown state {:?} stored for {}#{}",
                row.state, row.repo_full_name, row.pr_number
            ))
        })?;
        Ok(Self {
            repo_full_name: row.repo_full_name,
            pr_number: row.pr_number as u64,
            author_login: row.author_login,
            state,
            merged_at: row.merged_at,
            additions: row.additions as u64,
            deletions: row.deletions as u64,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub contributor_login: String,
    pub merged_pr_count: i64,
    pub points: i64,
    pub rank: i32,
}

impl From<LeaderboardRow> for LeaderboardEntry {
    fn from(row: LeaderboardRow) -> Self {
        Self {
            contributor_login: row.contributor_login,
            merged_pr_count: row.merged_pr_count as u64,
            points: row.points as u64,
            rank: row.rank as u32,
        }
    }
}
