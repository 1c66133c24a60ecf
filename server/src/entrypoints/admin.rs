use std::sync::Arc;

use rocket::{serde::json::Json, State};
use shared::RepoName;

use super::types::{ApiError, InFlightSync, SyncRequest, SyncStatusResponse};
use crate::{
    auth::Admin,
    sync::{SyncService, SyncSummary},
};

#[utoipa::path(context_path = "/api/admin", request_body = SyncRequest, responses(
    (status = 200, description = "Sync a repository and rebuild the leaderboard", body = SyncSummary),
    (status = 400, description = "Invalid repository name", body = ErrorResponse),
    (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
    (status = 409, description = "A sync of this repository is already running", body = ErrorResponse),
    (status = 503, description = "Contribution store unavailable", body = ErrorResponse)
))]
#[post("/sync", data = "<request>")]
async fn trigger_sync(
    _admin: Admin,
    service: &State<Arc<SyncService>>,
    request: Json<SyncRequest>,
) -> Result<Json<SyncSummary>, ApiError> {
    let repo: RepoName = request.repo_full_name.parse()?;
    Ok(Json(service.sync(&repo).await?))
}

#[utoipa::path(context_path = "/api/admin", responses(
    (status = 200, description = "Repositories currently syncing", body = SyncStatusResponse),
    (status = 401, description = "Missing or wrong admin token", body = ErrorResponse)
))]
#[get("/sync")]
async fn sync_status(
    _admin: Admin,
    service: &State<Arc<SyncService>>,
) -> Json<SyncStatusResponse> {
    let in_flight = service
        .in_flight()
        .into_iter()
        .map(|(repo, phase)| InFlightSync {
            repo_full_name: repo.full_name(),
            phase,
        })
        .collect();
    Json(SyncStatusResponse { in_flight })
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing admin entrypoints", |rocket| async {
        rocket.mount("/api/admin", rocket::routes![trigger_sync, sync_status])
    })
}
