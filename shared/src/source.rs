use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::{RawPullRequest, RepoName, SyncError};

/// Where pull requests come from.
///
/// The stream is lazy and finite. Calling again starts over from the first
/// page. An `Err` item concerns one page or one pull request; the stream may
/// continue after it, except after [`SyncError::RateLimited`] which always
/// ends it.
pub trait PullRequestSource: Send + Sync {
    fn pull_requests<'a>(
        &'a self,
        repo: &'a RepoName,
        since: Option<DateTime<Utc>>,
    ) -> BoxStream<'a, Result<RawPullRequest, SyncError>>;
}
