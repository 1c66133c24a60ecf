use rocket::{fairing::AdHoc, http::Status, serde::json::Json, Request};
use utoipa::OpenApi;

use crate::sync::{SyncPhase, SyncSummary};

pub mod admin;
pub mod contributions;
pub mod leaderboard;
pub mod types;

use types::{
    ContributionResponse, ContributorResponse, ErrorResponse, InFlightSync, LeaderboardResponse,
    PaginatedContributionResponse, PaginatedLeaderboardResponse, SyncRequest, SyncStatusResponse,
};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 100;
const MAX_PAGE: u64 = 1_000_000;

pub(crate) fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Zero-based page, capped so offsets stay far from integer limits.
pub(crate) fn clamp_page(page: Option<u64>) -> u64 {
    page.unwrap_or(0).min(MAX_PAGE)
}

#[derive(OpenApi)]
#[openapi(
    info(title = "CodeFest API"),
    paths(
        admin::trigger_sync,
        admin::sync_status,
        leaderboard::get_leaderboard,
        leaderboard::get_contributor,
        contributions::get_repo_contributions
    ),
    components(schemas(
        SyncRequest,
        SyncSummary,
        SyncPhase,
        SyncStatusResponse,
        InFlightSync,
        LeaderboardResponse,
        PaginatedLeaderboardResponse,
        ContributionResponse,
        PaginatedContributionResponse,
        ContributorResponse,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

#[get("/openapi.json")]
fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request<'_>) -> Json<ErrorResponse> {
    let reason = status.reason().unwrap_or("Unknown error");
    Json(ErrorResponse::new(status, reason))
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket
            .attach(admin::stage())
            .attach(leaderboard::stage())
            .attach(contributions::stage())
            .mount("/api-docs", rocket::routes![openapi])
            .register("/", rocket::catchers![default_catcher])
    })
}

#[cfg(test)]
mod tests;
