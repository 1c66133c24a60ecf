use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::GithubHandle;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PrState {
    Open,
    Merged,
    Closed,
}

impl PrState {
    pub fn is_merged(self) -> bool {
        self == PrState::Merged
    }
}

/// A pull request as the leaderboard sees it. Unique by `(repo_full_name, pr_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRecord {
    pub repo_full_name: String,
    pub pr_number: u64,
    pub author_login: GithubHandle,
    pub state: PrState,
    /// Set iff `state` is [`PrState::Merged`].
    pub merged_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
}

impl ContributionRecord {
    pub fn key(&self) -> (String, u64) {
        (self.repo_full_name.clone(), self.pr_number)
    }

    pub fn is_merged(&self) -> bool {
        self.state.is_merged()
    }

    pub fn lines_changed(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }

    pub fn pr_link(&self) -> String {
        format!(
            "https://github.com/{}/pull/{}",
            self.repo_full_name, self.pr_number
        )
    }
}
