use std::sync::Arc;

use rocket::{
    http::{ContentType, Header, Status},
    local::asynchronous::{Client, LocalResponse},
    tokio::{self, sync::Notify},
};
use serde_json::{json, Value};
use shared::PointsFormula;

use crate::{
    auth::AdminToken,
    config::Env,
    db::{ContributionStore, SharedStore},
    sync::{self, SyncPhase, SyncService},
    test_utils::{raw_pr, repo, FailingStore, ScriptedSource},
};

const TOKEN: &str = "secret";

fn demo_source() -> ScriptedSource {
    ScriptedSource::new(vec![
        Ok(raw_pr("octo/demo", 1, "alice", true)),
        Ok(raw_pr("octo/demo", 2, "bob", false)),
        Ok(raw_pr("octo/demo", 3, "alice", true)),
    ])
}

async fn client(source: ScriptedSource) -> Client {
    let rocket = crate::build(
        Env::in_memory(TOKEN),
        Arc::new(source),
        Arc::new(PointsFormula::default()),
    )
    .unwrap();
    Client::tracked(rocket).await.unwrap()
}

async fn trigger_sync<'c>(
    client: &'c Client,
    repo: &str,
    token: Option<&str>,
) -> LocalResponse<'c> {
    let mut request = client
        .post("/api/admin/sync")
        .header(ContentType::JSON)
        .body(json!({ "repoFullName": repo }).to_string());
    if let Some(token) = token {
        request = request.header(Header::new("Authorization", format!("Bearer {token}")));
    }
    request.dispatch().await
}

async fn body(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().await.unwrap()
}

#[rocket::async_test]
async fn sync_requires_admin_token() {
    let client = client(demo_source()).await;

    let response = trigger_sync(&client, "octo/demo", None).await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(body(response).await["code"], 401);

    let response = trigger_sync(&client, "octo/demo", Some("wrong")).await;
    assert_eq!(response.status(), Status::Unauthorized);

    let (entries, _) = client
        .rocket()
        .state::<SharedStore>()
        .unwrap()
        .leaderboard_page(0, 10)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[rocket::async_test]
async fn sync_then_read_leaderboard() {
    let client = client(demo_source()).await;

    let response = trigger_sync(&client, "octo/demo", Some(TOKEN)).await;
    assert_eq!(response.status(), Status::Ok);
    let summary = body(response).await;
    assert_eq!(summary["repoFullName"], "octo/demo");
    assert_eq!(summary["prsProcessed"], 3);
    assert_eq!(summary["upserted"], 3);
    assert_eq!(summary["leaderboardUpdated"], true);
    assert_eq!(summary["truncated"], false);
    assert_eq!(summary["success"], true);

    let response = client.get("/api/leaderboard").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let page = body(response).await;
    assert_eq!(page["total_records"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(
        page["records"][0],
        json!({
            "contributorLogin": "alice",
            "mergedPRCount": 2,
            "points": 20,
            "rank": 1,
            "avatarUrl": "https://github.com/alice.png",
        })
    );
}

#[rocket::async_test]
async fn invalid_repository_is_rejected() {
    let client = client(demo_source()).await;

    let response = trigger_sync(&client, "not-a-repo", Some(TOKEN)).await;
    assert_eq!(response.status(), Status::BadRequest);
    let error = body(response).await;
    assert_eq!(error["code"], 400);
    assert!(error["error"].as_str().unwrap().contains("not-a-repo"));
}

#[rocket::async_test]
async fn repository_contributions_are_paginated() {
    let client = client(demo_source()).await;
    trigger_sync(&client, "octo/demo", Some(TOKEN)).await;

    let response = client
        .get("/api/repos/Octo/Demo/contributions?limit=2")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let page = body(response).await;
    assert_eq!(page["total_records"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["records"][0]["prNumber"], 3);
    assert_eq!(page["records"][0]["state"], "merged");
    assert_eq!(
        page["records"][0]["link"],
        "https://github.com/octo/demo/pull/3"
    );
    assert_eq!(page["records"][1]["prNumber"], 2);
    assert_eq!(page["records"][1]["mergedAt"], Value::Null);
}

#[rocket::async_test]
async fn contributor_endpoint() {
    let client = client(demo_source()).await;
    trigger_sync(&client, "octo/demo", Some(TOKEN)).await;

    let response = client.get("/api/leaderboard/bob").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let bob = body(response).await;
    assert_eq!(bob["leaderboard"], Value::Null);
    assert_eq!(bob["contributions"].as_array().unwrap().len(), 1);

    let response = client.get("/api/leaderboard/alice").dispatch().await;
    let alice = body(response).await;
    assert_eq!(alice["leaderboard"]["rank"], 1);
    assert_eq!(alice["contributions"].as_array().unwrap().len(), 2);

    let response = client.get("/api/leaderboard/nobody").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(body(response).await["code"], 404);
}

#[rocket::async_test]
async fn concurrent_sync_returns_conflict() {
    let gate = Arc::new(Notify::new());
    let client = client(demo_source().gated(gate.clone())).await;
    let service = client
        .rocket()
        .state::<Arc<SyncService>>()
        .unwrap()
        .clone();

    let running = tokio::spawn({
        let service = service.clone();
        async move { service.sync(&repo("octo/demo")).await }
    });
    while service.phase(&repo("octo/demo")) == SyncPhase::Idle {
        tokio::task::yield_now().await;
    }

    let response = trigger_sync(&client, "octo/demo", Some(TOKEN)).await;
    assert_eq!(response.status(), Status::Conflict);

    let response = client
        .get("/api/admin/sync")
        .header(Header::new("Authorization", format!("Bearer {TOKEN}")))
        .dispatch()
        .await;
    assert_eq!(
        body(response).await,
        json!({ "inFlight": [{ "repoFullName": "octo/demo", "phase": "fetching" }] })
    );

    gate.notify_one();
    assert!(running.await.unwrap().is_ok());
}

#[rocket::async_test]
async fn store_failure_maps_to_service_unavailable() {
    let store: SharedStore = Arc::new(FailingStore::default());
    let rocket = rocket::build()
        .manage(AdminToken(TOKEN.to_string()))
        .manage(store)
        .attach(sync::stage(
            Arc::new(demo_source()),
            Arc::new(PointsFormula::default()),
            true,
        ))
        .attach(super::stage());
    let client = Client::tracked(rocket).await.unwrap();

    let response = trigger_sync(&client, "octo/demo", Some(TOKEN)).await;
    assert_eq!(response.status(), Status::ServiceUnavailable);

    let response = client.get("/api/leaderboard").dispatch().await;
    assert_eq!(response.status(), Status::ServiceUnavailable);
}

#[rocket::async_test]
async fn serves_openapi_document() {
    let client = client(demo_source()).await;
    let response = client.get("/api-docs/openapi.json").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let doc = body(response).await;
    assert!(doc["paths"]["/api/admin/sync"].is_object());
    assert!(doc["paths"]["/api/leaderboard/{login}"].is_object());
    assert!(doc["components"]["schemas"]["SyncSummary"].is_object());
}

#[rocket::async_test]
async fn huge_page_number_returns_an_empty_page() {
    let client = client(demo_source()).await;
    trigger_sync(&client, "octo/demo", Some(TOKEN)).await;

    for uri in [
        "/api/leaderboard?page=18446744073709551615",
        "/api/repos/octo/demo/contributions?page=18446744073709551615&limit=100",
    ] {
        let response = client.get(uri).dispatch().await;
        assert_eq!(response.status(), Status::Ok, "{uri}");
        let page = body(response).await;
        assert_eq!(page["records"], json!([]), "{uri}");
        assert_eq!(page["page"], super::MAX_PAGE + 1, "{uri}");
    }
}
