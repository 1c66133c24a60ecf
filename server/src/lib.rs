#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::{http::Method, Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins, Cors, CorsOptions};
use rocket_prometheus::PrometheusMetrics;
use shared::{PullRequestSource, Scoring};

pub mod auth;
pub mod config;
pub mod db;
pub mod entrypoints;
pub mod sync;

#[cfg(test)]
mod test_utils;

use auth::AdminToken;
use config::Env;

fn cors(allowed_origins: &[String]) -> anyhow::Result<Cors> {
    let allowed_origins = if allowed_origins.is_empty() {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(allowed_origins)
    };

    Ok(CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::some(&["Authorization", "Content-Type"]),
        ..Default::default()
    }
    .to_cors()?)
}

/// Assembles the server: store, sync service, scheduled sync, CORS, metrics and routes.
pub fn build(
    env: Env,
    source: Arc<dyn PullRequestSource>,
    scoring: Arc<dyn Scoring>,
) -> anyhow::Result<Rocket<Build>> {
    let scheduled_repos = env.sync_repos()?;
    let prometheus = PrometheusMetrics::new();

    Ok(rocket::build()
        .manage(AdminToken(env.admin_token.clone()))
        .attach(db::stage(
            env.storage,
            sync::stage(source, scoring, env.incremental_sync),
        ))
        .attach(sync::scheduled::stage(scheduled_repos, env.sync_interval()))
        .attach(cors(&env.allowed_origins)?)
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .attach(entrypoints::stage()))
}
