use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rocket::tokio::sync::RwLock;
use shared::{
    reconcile, recompute, ContributionRecord, LeaderboardEntry, RepoName, Scoring, SyncError,
    UpsertOutcome,
};

use super::{ContributionStore, LeaderboardRebuild};

#[derive(Default)]
struct State {
    contributions: BTreeMap<(String, u64), ContributionRecord>,
    leaderboard: Vec<LeaderboardEntry>,
    cursors: HashMap<RepoName, DateTime<Utc>>,
}

/// Process-local store. Lost on restart; meant for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

fn paginate<T: Clone>(items: &[T], page: u64, limit: u64) -> Vec<T> {
    let start = page.saturating_mul(limit) as usize;
    items
        .iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[rocket::async_trait]
impl ContributionStore for MemoryStore {
    async fn upsert(&self, record: ContributionRecord) -> Result<UpsertOutcome, SyncError> {
        let mut state = self.state.write().await;
        let key = record.key();
        let (outcome, write) = reconcile(state.contributions.get(&key), record);
        if let Some(record) = write {
            state.contributions.insert(key, record);
        }
        Ok(outcome)
    }

    async fn contributions(&self) -> Result<Vec<ContributionRecord>, SyncError> {
        Ok(self
            .state
            .read()
            .await
            .contributions
            .values()
            .cloned()
            .collect())
    }

    async fn repo_contributions(
        &self,
        repo: &RepoName,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ContributionRecord>, u64), SyncError> {
        let full_name = repo.full_name();
        let state = self.state.read().await;
        let records: Vec<_> = state
            .contributions
            .values()
            .rev()
            .filter(|record| record.repo_full_name == full_name)
            .cloned()
            .collect();
        Ok((paginate(&records, page, limit), records.len() as u64))
    }

    async fn author_contributions(
        &self,
        login: &str,
    ) -> Result<Vec<ContributionRecord>, SyncError> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .contributions
            .values()
            .filter(|record| record.author_login == login)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.merged_at.cmp(&a.merged_at));
        Ok(records)
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SyncError> {
        Ok(self.state.read().await.leaderboard.clone())
    }

    async fn leaderboard_page(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<LeaderboardEntry>, u64), SyncError> {
        let state = self.state.read().await;
        Ok((
            paginate(&state.leaderboard, page, limit),
            state.leaderboard.len() as u64,
        ))
    }

    async fn leaderboard_entry(&self, login: &str) -> Result<Option<LeaderboardEntry>, SyncError> {
        Ok(self
            .state
            .read()
            .await
            .leaderboard
            .iter()
            .find(|entry| entry.contributor_login == login)
            .cloned())
    }

    async fn replace_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<(), SyncError> {
        self.state.write().await.leaderboard = entries.to_vec();
        Ok(())
    }

    async fn rebuild_leaderboard(
        &self,
        scoring: &dyn Scoring,
    ) -> Result<LeaderboardRebuild, SyncError> {
        let mut state = self.state.write().await;
        let entries = recompute(state.contributions.values(), scoring);
        let updated = state.leaderboard != entries;
        if updated {
            state.leaderboard = entries.clone();
        }
        Ok(LeaderboardRebuild { entries, updated })
    }

    async fn sync_cursor(&self, repo: &RepoName) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.state.read().await.cursors.get(repo).copied())
    }

    async fn set_sync_cursor(&self, repo: &RepoName, at: DateTime<Utc>) -> Result<(), SyncError> {
        self.state.write().await.cursors.insert(repo.clone(), at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shared::PrState;

    use super::*;

    fn record(repo: &str, number: u64, author: &str, state: PrState) -> ContributionRecord {
        ContributionRecord {
            repo_full_name: repo.to_string(),
            pr_number: number,
            author_login: author.to_string(),
            state,
            merged_at: state.is_merged().then(Utc::now),
            additions: 1,
            deletions: 1,
        }
    }

    #[rocket::async_test]
    async fn upsert_applies_reconcile_policy() {
        let store = MemoryStore::default();
        let merged = record("octo/demo", 1, "alice", PrState::Merged);

        assert_eq!(
            store.upsert(merged.clone()).await.unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            store.upsert(merged.clone()).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            store
                .upsert(record("octo/demo", 1, "alice", PrState::Closed))
                .await
                .unwrap(),
            UpsertOutcome::Unchanged
        );

        let stored = store.contributions().await.unwrap();
        assert_eq!(stored, vec![merged]);
    }

    #[rocket::async_test]
    async fn same_number_in_other_repo_is_distinct() {
        let store = MemoryStore::default();
        store
            .upsert(record("octo/demo", 1, "alice", PrState::Open))
            .await
            .unwrap();
        store
            .upsert(record("octo/other", 1, "bob", PrState::Open))
            .await
            .unwrap();
        assert_eq!(store.contributions().await.unwrap().len(), 2);
    }

    #[rocket::async_test]
    async fn repo_contributions_are_paginated_newest_first() {
        let store = MemoryStore::default();
        for number in 1..=5 {
            store
                .upsert(record("octo/demo", number, "alice", PrState::Open))
                .await
                .unwrap();
        }
        store
            .upsert(record("octo/other", 9, "bob", PrState::Open))
            .await
            .unwrap();

        let repo: RepoName = "octo/demo".parse().unwrap();
        let (page, total) = store.repo_contributions(&repo, 1, 2).await.unwrap();
        assert_eq!(total, 5);
        let numbers: Vec<_> = page.iter().map(|r| r.pr_number).collect();
        assert_eq!(numbers, vec![3, 2]);
    }

    #[rocket::async_test]
    async fn leaderboard_is_replaced_wholesale() {
        let store = MemoryStore::default();
        let entry = |login: &str, rank| LeaderboardEntry {
            contributor_login: login.to_string(),
            merged_pr_count: 1,
            points: 10,
            rank,
        };
        store
            .replace_leaderboard(&[entry("alice", 1), entry("bob", 2)])
            .await
            .unwrap();
        store.replace_leaderboard(&[entry("carol", 1)]).await.unwrap();

        assert_eq!(store.leaderboard().await.unwrap(), vec![entry("carol", 1)]);
        assert_eq!(store.leaderboard_entry("alice").await.unwrap(), None);
        let (page, total) = store.leaderboard_page(0, 10).await.unwrap();
        assert_eq!((page.len(), total), (1, 1));
    }

    #[rocket::async_test]
    async fn rebuild_reports_whether_cache_changed() {
        let store = MemoryStore::default();
        let scoring = shared::PointsFormula::default();
        store
            .upsert(record("octo/demo", 1, "alice", PrState::Merged))
            .await
            .unwrap();

        let first = store.rebuild_leaderboard(&scoring).await.unwrap();
        assert!(first.updated);
        assert_eq!(store.leaderboard().await.unwrap(), first.entries);

        let second = store.rebuild_leaderboard(&scoring).await.unwrap();
        assert!(!second.updated);
        assert_eq!(second.entries, first.entries);
    }

    #[rocket::async_test]
    async fn cursors_are_per_repository() {
        let store = MemoryStore::default();
        let demo: RepoName = "octo/demo".parse().unwrap();
        let other: RepoName = "octo/other".parse().unwrap();
        let now = Utc::now();
        store.set_sync_cursor(&demo, now).await.unwrap();
        assert_eq!(store.sync_cursor(&demo).await.unwrap(), Some(now));
        assert_eq!(store.sync_cursor(&other).await.unwrap(), None);
    }
}
