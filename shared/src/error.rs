use std::time::Duration;

use thiserror::Error;

/// Failures of the contribution sync pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Network or HTTP failure talking to GitHub (non-2xx other than rate limiting, or timeout).
    #[error("GitHub is unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// GitHub signalled quota exhaustion.
    #[error("GitHub rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// A provider payload could not be turned into a contribution record.
    #[error("malformed pull request: {reason}")]
    MalformedRecord { reason: String },

    /// Another sync for the same repository is still running.
    #[error("sync already in progress for {repo}")]
    SyncInProgress { repo: String },

    /// The contribution store failed; the current sync cannot continue.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("invalid repository name: {input:?}, expected <owner>/<repo>")]
    InvalidRepository { input: String },
}

impl SyncError {
    pub fn upstream(message: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            message: message.to_string(),
        }
    }

    pub fn malformed(reason: impl ToString) -> Self {
        Self::MalformedRecord {
            reason: reason.to_string(),
        }
    }

    pub fn store(message: impl ToString) -> Self {
        Self::StoreUnavailable {
            message: message.to_string(),
        }
    }

    /// Transient errors may succeed on a later sync.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::RateLimited { .. }
        )
    }
}
