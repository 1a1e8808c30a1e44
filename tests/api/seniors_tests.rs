//! Senior API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use senior_safe::domain::events::{client, server};
use senior_safe::domain::HealthInfo;

use crate::common::{eventually, senior, TestApp};

async fn app() -> TestApp {
    TestApp::with_seniors(vec![
        senior(1, HealthInfo::Text("고혈압 위험".into())),
        senior(2, HealthInfo::List(vec!["관절염".into(), "주의".into()])),
        senior(3, HealthInfo::Absent),
    ])
    .await
}

fn ids(body: &Value) -> Vec<i64> {
    body["seniors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_list_derives_status_from_health_info() {
    let app = app().await;

    let body: Value = app.server.get("/api/v1/seniors").await.json();

    assert_eq!(body["total"], 3);
    let statuses: Vec<&str> = body["seniors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["danger", "caution", "safe"]);
    assert_eq!(body["seniors"][1]["health_info"], json!(["관절염", "주의"]));
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = app().await;

    let danger: Value = app
        .server
        .get("/api/v1/seniors")
        .add_query_param("status", "danger")
        .await
        .json();
    assert_eq!(ids(&danger), vec![1]);

    let caution: Value = app
        .server
        .get("/api/v1/seniors")
        .add_query_param("status", "주의")
        .await
        .json();
    assert_eq!(ids(&caution), vec![2]);
}

#[tokio::test]
async fn test_unknown_filter_is_rejected() {
    let app = app().await;

    let response = app
        .server
        .get("/api/v1/seniors")
        .add_query_param("status", "sleepy")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_senior_is_not_found() {
    let app = app().await;

    app.server
        .get("/api/v1/seniors/99")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_push_updates_senior_and_raises_alert() {
    let mut app = app().await;
    let end = app.connect().await;

    end.push(
        server::SENIOR_STATUS_CHANGE,
        vec![json!({ "senior_id": 3, "status": "위험", "reason": "fall" })],
    );

    let server = &app.server;
    assert!(
        eventually(|| async move {
            server.get("/api/v1/seniors/3").await.json::<Value>()["status"] == "danger"
        })
        .await
    );
    let body: Value = app.server.get("/api/v1/seniors/3").await.json();
    assert_eq!(body["status_source"], "push");
    assert_eq!(body["status_label"], "위험");

    let alerts: Value = app.server.get("/api/v1/alerts").await.json();
    assert_eq!(alerts["unread"], 1);
    assert_eq!(alerts["alerts"][0]["senior_id"], 3);
}

#[tokio::test]
async fn test_pushed_status_survives_refresh() {
    let mut app = app().await;
    let end = app.connect().await;
    end.push(
        server::SENIOR_STATUS_CHANGE,
        vec![json!({ "senior_id": 1, "status": "안전" })],
    );
    let reconciler = app.state.reconciler.clone();
    assert!(
        eventually(|| {
            let reconciler = reconciler.clone();
            async move { reconciler.override_for(1).await.is_some() }
        })
        .await
    );

    let refreshed: Value = app.server.post("/api/v1/seniors/refresh").await.json();
    assert_eq!(refreshed["updated"], 3);

    let body: Value = app.server.get("/api/v1/seniors/1").await.json();
    assert_eq!(body["status"], "safe");
    assert_eq!(body["status_source"], "override");
}

#[tokio::test]
async fn test_refresh_picks_up_new_seniors() {
    let app = app().await;
    app.directory.seniors.lock().push(senior(4, HealthInfo::Absent));

    let body: Value = app.server.post("/api/v1/seniors/refresh").await.json();

    assert_eq!(body["updated"], 4);
    app.server.get("/api/v1/seniors/4").await.assert_status_ok();
}

#[tokio::test]
async fn test_delete_senior() {
    let app = app().await;

    let body: Value = app.server.delete("/api/v1/seniors/2").await.json();

    assert_eq!(body, json!({ "senior_id": 2, "removed": true }));
    app.server
        .get("/api/v1/seniors/2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refused_delete_keeps_senior() {
    let app = app().await;
    *app.directory.refuse_delete.lock() = true;

    let body: Value = app.server.delete("/api/v1/seniors/2").await.json();

    assert_eq!(body["removed"], false);
    app.server.get("/api/v1/seniors/2").await.assert_status_ok();
}

#[tokio::test]
async fn test_sensor_request_and_push() {
    let mut app = app().await;
    let mut end = app.connect().await;

    let empty: Value = app.server.get("/api/v1/seniors/1/sensors").await.json();
    assert_eq!(empty["sensors"], json!([]));
    assert_eq!(end.expect_event(client::REQUEST_SENSOR_STATUS).await, vec![json!(1)]);

    end.push(
        server::SENSOR_STATUS_CHANGE,
        vec![json!({
            "senior_id": 1,
            "sensors": [
                { "sensor_type": "door", "location": "bedroom", "value": 1 },
                { "sensor_type": "motion", "location": "kitchen", "value": "false" }
            ]
        })],
    );

    let server = &app.server;
    assert!(
        eventually(|| async move {
            server.get("/api/v1/seniors/1/sensors").await.json::<Value>()["sensors"]
                .as_array()
                .map(Vec::len)
                == Some(2)
        })
        .await
    );
    let body: Value = app.server.get("/api/v1/seniors/1/sensors").await.json();
    assert_eq!(body["sensors"][0]["sensor_type"], "door");
    assert_eq!(body["sensors"][0]["value"], true);
}

#[tokio::test]
async fn test_profile_image_content_type() {
    let app = app().await;

    let response = app.server.get("/api/v1/seniors/1/profile-image").await;

    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "image/png");
}
