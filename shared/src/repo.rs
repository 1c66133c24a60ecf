use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::SyncError;

/// Lower-cased `"<owner>/<repo>"` pair, the repository half of a contribution key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName {
    owner: String,
    repo: String,
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl RepoName {
    pub fn new(owner: &str, repo: &str) -> Result<Self, SyncError> {
        if !valid_segment(owner) || !valid_segment(repo) {
            return Err(SyncError::InvalidRepository {
                input: format!("{owner}/{repo}"),
            });
        }
        Ok(Self {
            owner: owner.to_ascii_lowercase(),
            repo: repo.to_ascii_lowercase(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl FromStr for RepoName {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SyncError::InvalidRepository {
            input: s.to_string(),
        };
        let (owner, repo) = s.trim().split_once('/').ok_or_else(invalid)?;
        if repo.contains('/') {
            return Err(invalid());
        }
        Self::new(owner, repo).map_err(|_| invalid())
    }
}

impl TryFrom<String> for RepoName {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoName> for String {
    fn from(value: RepoName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
