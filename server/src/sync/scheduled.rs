use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use rocket::fairing::AdHoc;
use shared::RepoName;
use tracing::{error, info, instrument};

use super::SyncService;

#[instrument(skip(service, repos))]
async fn sync_all(service: &SyncService, repos: &[RepoName]) {
    for repo in repos {
        match service.sync(repo).await {
            Ok(summary) if !summary.success => info!(
                "Partial sync of {repo}: {} skipped, truncated: {}",
                summary.skipped, summary.truncated
            ),
            Ok(_) => {}
            Err(e) => error!("Failed to sync {repo}: {e}"),
        }
    }
}

/// Re-syncs `repos` every `sleep_duration` until shutdown.
pub fn stage(repos: Vec<RepoName>, sleep_duration: Duration) -> AdHoc {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    AdHoc::on_ignite("Scheduled repository sync", move |rocket| async move {
        if repos.is_empty() {
            return rocket;
        }

        rocket
            .attach(AdHoc::on_liftoff(
                "Sync configured repositories every X minutes",
                move |rocket| {
                    Box::pin(async move {
                        let Some(service) = rocket.state::<Arc<SyncService>>().cloned() else {
                            rocket::error!("Sync service is not configured, scheduled sync disabled");
                            return;
                        };
                        info!(
                            "Syncing {} repositories every {}s",
                            repos.len(),
                            sleep_duration.as_secs()
                        );

                        rocket::tokio::spawn(async move {
                            let mut interval = rocket::tokio::time::interval(sleep_duration);
                            while running.load(Ordering::Relaxed) {
                                interval.tick().await;
                                sync_all(&service, &repos).await;
                            }
                        });
                    })
                },
            ))
            .attach(AdHoc::on_shutdown("Stop scheduled repository sync", |_| {
                Box::pin(async move {
                    running_clone.store(false, Ordering::Relaxed);
                })
            }))
    })
}
