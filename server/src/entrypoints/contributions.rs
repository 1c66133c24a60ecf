use rocket::{serde::json::Json, State};
use shared::RepoName;

use super::types::{ApiError, ContributionResponse, PaginatedResponse};
use crate::db::SharedStore;

#[utoipa::path(context_path = "/api/repos", responses(
    (status = 200, description = "Get a repository's pull requests, newest first", body = PaginatedContributionResponse),
    (status = 400, description = "Invalid repository name", body = ErrorResponse)
))]
#[get("/<owner>/<repo>/contributions?<page>&<limit>")]
async fn get_repo_contributions(
    store: &State<SharedStore>,
    owner: &str,
    repo: &str,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<Json<PaginatedResponse<ContributionResponse>>, ApiError> {
    let repo = RepoName::new(owner, repo)?;
    let page = super::clamp_page(page);
    let limit = super::clamp_limit(limit);
    let (records, total) = store.repo_contributions(&repo, page, limit).await?;
    Ok(Json(PaginatedResponse::new(
        records.into_iter().map(Into::into).collect(),
        page.saturating_add(1),
        limit,
        total,
    )))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing repository entrypoints", |rocket| async {
        rocket.mount("/api/repos", rocket::routes![get_repo_contributions])
    })
}
