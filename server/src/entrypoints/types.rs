use chrono::{DateTime, Utc};
use rocket::{
    http::{Header, Status},
    request::Request,
    response::{self, Responder, Response},
    serde::json::Json,
};
use serde::{Deserialize, Serialize};
use shared::{ContributionRecord, LeaderboardEntry, SyncError};
use utoipa::ToSchema;

use crate::sync::SyncPhase;

#[derive(Clone, Debug, Serialize, Deserialize, Default, ToSchema)]
#[aliases(PaginatedLeaderboardResponse = PaginatedResponse<LeaderboardResponse>, PaginatedContributionResponse = PaginatedResponse<ContributionResponse>)]
pub struct PaginatedResponse<T: Serialize> {
    pub records: Vec<T>,
    pub page: u64,
    pub total_pages: u64,
    pub limit: u64,
    pub total_records: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(records: Vec<T>, page: u64, limit: u64, total_records: u64) -> Self {
        let extra_page = if total_records % limit == 0 { 0 } else { 1 };
        let total_pages = (total_records / limit) + extra_page;
        Self {
            records,
            page,
            total_pages,
            limit,
            total_records,
        }
    }
}

pub fn avatar_url(login: &str) -> String {
    format!("https://github.com/{}.png", login)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub contributor_login: String,
    #[serde(rename = "mergedPRCount")]
    pub merged_pr_count: u64,
    pub points: u64,
    pub rank: u32,
    pub avatar_url: String,
}

impl From<LeaderboardEntry> for LeaderboardResponse {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            avatar_url: avatar_url(&entry.contributor_login),
            contributor_login: entry.contributor_login,
            merged_pr_count: entry.merged_pr_count,
            points: entry.points,
            rank: entry.rank,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResponse {
    pub repo_full_name: String,
    pub pr_number: u64,
    pub author_login: String,
    pub state: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub additions: u64,
    pub deletions: u64,
    pub link: String,
}

impl From<ContributionRecord> for ContributionResponse {
    fn from(record: ContributionRecord) -> Self {
        Self {
            link: record.pr_link(),
            state: record.state.to_string(),
            repo_full_name: record.repo_full_name,
            pr_number: record.pr_number,
            author_login: record.author_login,
            merged_at: record.merged_at,
            additions: record.additions,
            deletions: record.deletions,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContributorResponse {
    pub login: String,
    pub avatar_url: String,
    /// Absent until the contributor has a merged pull request.
    pub leaderboard: Option<LeaderboardResponse>,
    pub contributions: Vec<ContributionResponse>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub repo_full_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InFlightSync {
    pub repo_full_name: String,
    pub phase: SyncPhase,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub in_flight: Vec<InFlightSync>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(status: Status, error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            code: status.code,
        }
    }
}

/// [`SyncError`] rendered as a JSON error with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self.0 {
            SyncError::InvalidRepository { .. } => Status::BadRequest,
            SyncError::SyncInProgress { .. } => Status::Conflict,
            SyncError::StoreUnavailable { .. } => Status::ServiceUnavailable,
            SyncError::UpstreamUnavailable { .. } => Status::BadGateway,
            SyncError::RateLimited { .. } => Status::TooManyRequests,
            SyncError::MalformedRecord { .. } => Status::UnprocessableEntity,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            tracing::error!("Request failed: {}", self.0);
        }
        let mut response =
            Response::build_from(Json(ErrorResponse::new(status, &self.0)).respond_to(request)?);
        response.status(status);
        if let SyncError::RateLimited { retry_after } = self.0 {
            response.header(Header::new("Retry-After", retry_after.as_secs().to_string()));
        }
        response.ok()
    }
}
