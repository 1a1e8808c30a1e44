//! Realtime Channel API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use senior_safe::domain::events::client;

use crate::common::TestApp;

#[tokio::test]
async fn test_channel_starts_disconnected() {
    let app = TestApp::new().await;

    let body: Value = app.server.get("/api/v1/channel").await.json();

    assert_eq!(
        body,
        json!({ "status": "disconnected", "connected": false, "socket_id": null })
    );
}

#[tokio::test]
async fn test_connect_and_disconnect_over_http() {
    let mut app = TestApp::new().await;

    app.server
        .post("/api/v1/channel/connect")
        .await
        .assert_status(StatusCode::ACCEPTED);
    let _end = app.accept().await;

    let url = app.transport.opened.lock()[0].to_string();
    assert_eq!(url, "ws://backend.test/socket.io/?EIO=4&transport=websocket");

    let body: Value = app.server.get("/api/v1/channel").await.json();
    assert_eq!(body["connected"], true);
    assert_eq!(body["socket_id"], "socket-1");

    let body: Value = app.server.post("/api/v1/channel/disconnect").await.json();
    assert_eq!(body["status"], "disconnected");
}

#[tokio::test]
async fn test_connect_without_credential_is_unauthorized() {
    let mut settings = crate::common::test_settings();
    settings.backend.access_token.clear();
    let app = TestApp::new().await;
    let state = senior_safe::startup::AppState {
        settings: std::sync::Arc::new(settings),
        ..app.state.clone()
    };
    let server = axum_test::TestServer::new(
        senior_safe::presentation::http::routes::create_router(state),
    )
    .unwrap();

    server
        .post("/api/v1/channel/connect")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_connect_requests_all_statuses() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;

    assert_eq!(end.expect_event(client::REQUEST_ALL_STATUS).await, Vec::<Value>::new());
}

#[tokio::test]
async fn test_safety_check_is_acknowledged() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;

    end.send(r#"427["server:request_safety_check",{"senior_id":1}]"#);

    let mut ack = None;
    while let Some(frame) = end.next_frame().await {
        if frame.starts_with("43") {
            ack = Some(frame);
            break;
        }
    }
    assert_eq!(ack.as_deref(), Some(r#"437[{"status":"ok"}]"#));
}

#[tokio::test]
async fn test_server_auth_request_is_answered() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;

    end.push("request_auth", Vec::new());

    assert_eq!(
        end.expect_event(client::AUTHENTICATE).await,
        vec![json!({ "jwt": crate::common::TOKEN })]
    );
}
