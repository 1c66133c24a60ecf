use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContributionRecord, PrState, SyncError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUser {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRepository {
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBranch {
    pub repo: Option<RawRepository>,
}

/// Pull request payload as returned by the GitHub REST API.
///
/// Every field is optional on the wire; [`normalize`] decides what is required.
/// The list endpoint omits `merged`, `additions` and `deletions`, the single
/// pull request endpoint returns all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPullRequest {
    pub number: Option<u64>,
    pub state: Option<String>,
    pub merged: Option<bool>,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub user: Option<RawUser>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub base: Option<RawBranch>,
}

impl RawPullRequest {
    pub fn repo_full_name(&self) -> Option<&str> {
        self.base
            .as_ref()
            .and_then(|base| base.repo.as_ref())
            .and_then(|repo| repo.full_name.as_deref())
    }

    pub fn author_login(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.login.as_deref())
    }
}

/// Maps a provider payload into a [`ContributionRecord`].
///
/// The merged flag wins over the state string, then `"open"` maps to open and
/// anything else to closed. The author is never guessed.
pub fn normalize(raw: RawPullRequest) -> Result<ContributionRecord, SyncError> {
    let pr_number = match raw.number {
        Some(number) if number > 0 => number,
        _ => return Err(SyncError::malformed("missing pull request number")),
    };
    let repo_full_name = raw
        .repo_full_name()
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| SyncError::malformed(format!("#{pr_number}: missing repository")))?;
    let author_login = raw
        .author_login()
        .filter(|login| !login.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| {
            SyncError::malformed(format!("{repo_full_name}#{pr_number}: missing author"))
        })?;

    let merged = raw.merged.unwrap_or(raw.merged_at.is_some());
    let state = if merged {
        PrState::Merged
    } else if raw.state.as_deref() == Some("open") {
        PrState::Open
    } else {
        PrState::Closed
    };
    let merged_at = match (state, raw.merged_at) {
        (PrState::Merged, Some(at)) => Some(at),
        (PrState::Merged, None) => {
            return Err(SyncError::malformed(format!(
                "{repo_full_name}#{pr_number}: merged without merge timestamp"
            )))
        }
        _ => None,
    };

    Ok(ContributionRecord {
        repo_full_name,
        pr_number,
        author_login,
        state,
        merged_at,
        additions: raw.additions.unwrap_or_default(),
        deletions: raw.deletions.unwrap_or_default(),
    })
}
