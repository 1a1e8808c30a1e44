//! Alert API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::common::TestApp;

#[tokio::test]
async fn test_record_and_list() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/alerts")
        .json(&json!({ "category": "info", "title": "영상 연결", "message": "연결되었습니다", "senior_id": 2 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let recorded: Value = response.json();
    assert_eq!(recorded["read"], false);
    assert_eq!(recorded["senior_id"], 2);

    let feed: Value = app.server.get("/api/v1/alerts").await.json();
    assert_eq!(feed["unread"], 1);
    assert_eq!(feed["alerts"][0]["id"], recorded["id"]);
}

#[tokio::test]
async fn test_duplicate_inside_window_is_suppressed() {
    let app = TestApp::new().await;
    let body = json!({ "category": "warning", "title": "주의", "message": "같은 알림" });

    app.server
        .post("/api/v1/alerts")
        .json(&body)
        .await
        .assert_status(StatusCode::CREATED);
    app.server
        .post("/api/v1/alerts")
        .json(&body)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let feed: Value = app.server.get("/api/v1/alerts").await.json();
    assert_eq!(feed["alerts"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_invalid_alert_is_rejected() {
    let app = TestApp::new().await;

    app.server
        .post("/api/v1/alerts")
        .json(&json!({ "category": "info", "title": "" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.server
        .post("/api/v1/alerts")
        .json(&json!({ "category": "info", "title": "x", "senior_id": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mark_read() {
    let app = TestApp::new().await;
    let recorded: Value = app
        .server
        .post("/api/v1/alerts")
        .json(&json!({ "category": "error", "title": "긴급 상황", "message": "낙상" }))
        .await
        .json();
    let id = recorded["id"].as_str().unwrap();

    app.server
        .post(&format!("/api/v1/alerts/{id}/read"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .post(&format!("/api/v1/alerts/{}/read", Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let feed: Value = app.server.get("/api/v1/alerts").await.json();
    assert_eq!(feed["unread"], 0);
}

#[tokio::test]
async fn test_mark_all_read_and_clear() {
    let app = TestApp::new().await;
    for title in ["하나", "둘", "셋"] {
        app.server
            .post("/api/v1/alerts")
            .json(&json!({ "category": "info", "title": title }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let marked: Value = app.server.post("/api/v1/alerts/read-all").await.json();
    assert_eq!(marked["updated"], 3);
    let again: Value = app.server.post("/api/v1/alerts/read-all").await.json();
    assert_eq!(again["updated"], 0);

    app.server
        .delete("/api/v1/alerts")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let feed: Value = app.server.get("/api/v1/alerts").await.json();
    assert_eq!(feed["alerts"], json!([]));
}
