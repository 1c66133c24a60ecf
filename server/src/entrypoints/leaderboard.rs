use rocket::{serde::json::Json, State};

use super::types::{
    avatar_url, ApiError, ContributorResponse, LeaderboardResponse, PaginatedResponse,
};
use crate::db::SharedStore;

#[utoipa::path(context_path = "/api/leaderboard", responses(
    (status = 200, description = "Get the contributor leaderboard", body = PaginatedLeaderboardResponse)
))]
#[get("/?<page>&<limit>")]
async fn get_leaderboard(
    store: &State<SharedStore>,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<Json<PaginatedResponse<LeaderboardResponse>>, ApiError> {
    let page = super::clamp_page(page);
    let limit = super::clamp_limit(limit);
    let (entries, total) = store.leaderboard_page(page, limit).await?;
    Ok(Json(PaginatedResponse::new(
        entries.into_iter().map(Into::into).collect(),
        page.saturating_add(1),
        limit,
        total,
    )))
}

#[utoipa::path(context_path = "/api/leaderboard", responses(
    (status = 200, description = "Get a contributor's standing and pull requests", body = ContributorResponse),
    (status = 404, description = "Unknown contributor", body = ErrorResponse)
))]
#[get("/<login>")]
async fn get_contributor(
    store: &State<SharedStore>,
    login: &str,
) -> Result<Option<Json<ContributorResponse>>, ApiError> {
    let entry = store.leaderboard_entry(login).await?;
    let contributions = store.author_contributions(login).await?;
    if entry.is_none() && contributions.is_empty() {
        return Ok(None);
    }

    Ok(Some(Json(ContributorResponse {
        login: login.to_string(),
        avatar_url: avatar_url(login),
        leaderboard: entry.map(Into::into),
        contributions: contributions.into_iter().map(Into::into).collect(),
    })))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing leaderboard entrypoints", |rocket| async {
        rocket.mount(
            "/api/leaderboard",
            rocket::routes![get_leaderboard, get_contributor],
        )
    })
}
