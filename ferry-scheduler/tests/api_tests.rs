use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use ferry_scheduler::api::{AppState, create_router};
use ferry_scheduler::config::Config;
use ferry_scheduler::repository::MemoryStore;

fn create_test_app() -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), Config::default());
    create_router(state)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn create_git_import(app: &Router) -> i64 {
    let (status, body) = post_json(
        app,
        "/import/create",
        json!({
            "target_name": "~alice/widget/+git/main",
            "rcs_type": "GIT",
            "target_rcs_type": "GIT",
            "url": "https://git.example.com/widget.git",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "ferry-scheduler");
}

#[tokio::test]
async fn test_no_work_is_job_zero() {
    let app = create_test_app();

    let (status, body) = post_json(
        &app,
        "/rpc/getJobForMachine",
        json!({"hostname": "bender", "worker_limit": 1}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_id"], 0);
}

#[tokio::test]
async fn test_unknown_job_is_a_typed_fault() {
    let app = create_test_app();

    let (status, body) = post_json(
        &app,
        "/rpc/updateHeartbeat",
        json!({"job_id": 4242, "log_tail": ""}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["fault"], "NoSuchCodeImportJob");
    assert!(body["error"].as_str().unwrap().contains("4242"));
}

#[tokio::test]
async fn test_bad_status_name_is_invalid_status_fault() {
    let app = create_test_app();
    create_git_import(&app).await;

    let (_, claim) = post_json(
        &app,
        "/rpc/getJobForMachine",
        json!({"hostname": "bender", "worker_limit": 1}),
    )
    .await;
    let job_id = claim["job_id"].as_i64().unwrap();
    assert_ne!(job_id, 0);

    let (status, body) = post_json(
        &app,
        "/rpc/finishJobID",
        json!({"job_id": job_id, "status_name": "NEARLY"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fault"], "InvalidStatus");
}

#[tokio::test]
async fn test_worker_round_trip() {
    let app = create_test_app();
    let import_id = create_git_import(&app).await;

    let (_, claim) = post_json(
        &app,
        "/rpc/getJobForMachine",
        json!({"hostname": "bender", "worker_limit": 1}),
    )
    .await;
    let job_id = claim["job_id"].as_i64().unwrap();

    let (status, data) = post_json(
        &app,
        "/rpc/getImportDataForJobID",
        json!({"job_id": job_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["log_file_name"], "alice-widget-+git-main.log");
    assert_eq!(data["arguments"][1], "git:git");

    let (status, _) = post_json(
        &app,
        "/rpc/updateHeartbeat",
        json!({"job_id": job_id, "log_tail": "fetching"}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, alias) = post_json(
        &app,
        "/librarian/upload",
        json!({"filename": "alice-widget-+git-main.log", "content": "all done\n"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let alias_url = alias["url"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &app,
        "/rpc/finishJobID",
        json!({
            "job_id": job_id,
            "status_name": "SUCCESS",
            "log_file_alias_url": alias_url,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = get(&app, &format!("/import/{}/results", import_id)).await;
    assert_eq!(status, StatusCode::OK);
    let results: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["status"], "SUCCESS");

    // Log is downloadable from the alias path
    let path = &alias_url[alias_url.find("/librarian/").unwrap()..];
    let (status, content) = get(&app, path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content, "all done\n");

    let (status, _) = post_json(
        &app,
        "/rpc/finishJobID",
        json!({"job_id": job_id, "status_name": "SUCCESS"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_machine_state_changes() {
    let app = create_test_app();

    let (status, machine) = post_json(
        &app,
        "/machine/register",
        json!({"hostname": "bender"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(machine["state"], "OFFLINE");

    let (status, _) = post_json(
        &app,
        "/machine/bender/state",
        json!({"state": "QUIESCING"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, machine) = post_json(
        &app,
        "/machine/bender/state",
        json!({"state": "ONLINE"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine["state"], "ONLINE");

    let (status, _) = get(&app, "/machine/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
