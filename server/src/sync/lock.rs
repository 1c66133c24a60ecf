use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use shared::{RepoName, SyncError};
use tracing::debug;

use super::SyncPhase;

/// Repositories with a sync in flight and the phase each one is in.
#[derive(Debug, Default)]
pub struct SyncLocks {
    in_flight: Mutex<HashMap<RepoName, SyncPhase>>,
}

impl SyncLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<RepoName, SyncPhase>> {
        // The table stays consistent even if a holder panicked
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self, repo: &RepoName) -> Result<SyncGuard<'_>, SyncError> {
        let mut table = self.table();
        if table.contains_key(repo) {
            return Err(SyncError::SyncInProgress {
                repo: repo.full_name(),
            });
        }
        table.insert(repo.clone(), SyncPhase::Fetching);
        Ok(SyncGuard {
            locks: self,
            repo: repo.clone(),
        })
    }

    pub fn phase(&self, repo: &RepoName) -> SyncPhase {
        self.table().get(repo).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(RepoName, SyncPhase)> {
        let mut entries: Vec<_> = self
            .table()
            .iter()
            .map(|(repo, phase)| (repo.clone(), *phase))
            .collect();
        entries.sort_by(|a, b| a.0.full_name().cmp(&b.0.full_name()));
        entries
    }
}

/// Holds a repository's slot in [`SyncLocks`] until dropped.
pub struct SyncGuard<'a> {
    locks: &'a SyncLocks,
    repo: RepoName,
}

impl SyncGuard<'_> {
    pub fn set_phase(&self, phase: SyncPhase) {
        debug!(repo = %self.repo, %phase, "Sync phase changed");
        self.locks.table().insert(self.repo.clone(), phase);
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.locks.table().remove(&self.repo);
    }
}
