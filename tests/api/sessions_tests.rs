//! Live Video Session API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use senior_safe::domain::events::{client, server};
use senior_safe::domain::{IceCandidate, PeerConnectionState, PeerEvent};

use crate::common::{eventually, TestApp};

async fn session_state(app: &TestApp, senior_id: i64) -> String {
    let body: Value = app
        .server
        .get(&format!("/api/v1/sessions/{senior_id}"))
        .await
        .json();
    body["state"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_full_negotiation_over_channel() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;

    let response = app.server.post("/api/v1/sessions/7").await;
    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["senior_id"], 7);

    assert_eq!(end.expect_event(client::CHECK_OFFER).await, vec![json!(7)]);

    end.push(
        server::NEW_OFFER,
        vec![json!({ "senior_id": 7, "type": "offer", "sdp": "v=0 offer" })],
    );
    assert_eq!(
        end.expect_event(client::SEND_ANSWER).await,
        vec![json!(7), json!({ "type": "answer", "sdp": "v=0 answer" })]
    );
    assert_eq!(
        app.peers.latest().unwrap().remote.lock().as_ref().map(|o| o.sdp.clone()),
        Some("v=0 offer".to_string())
    );

    app.peers.raise(PeerEvent::LocalCandidate(IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 192.168.0.2 54321 typ host".into(),
        sdp_mline_index: Some(0),
        sdp_mid: Some("0".into()),
    }));
    let relayed = end.expect_event(client::SEND_ICE_CANDIDATE).await;
    assert_eq!(relayed[0], json!(7));
    assert_eq!(relayed[1]["sdpMLineIndex"], 0);
    assert_eq!(relayed[1]["sdpMid"], "0");

    end.push(
        server::NEW_ICE_CANDIDATE,
        vec![json!({ "candidate": "candidate:2 1 udp 1 10.0.0.9 40000 typ host", "sdpMLineIndex": 0, "sdpMid": "0" })],
    );
    let peers = app.peers.clone();
    assert!(
        eventually(|| {
            let peers = peers.clone();
            async move { peers.latest().map(|p| p.candidates.lock().len()) == Some(1) }
        })
        .await
    );

    app.peers
        .raise(PeerEvent::StateChanged(PeerConnectionState::Connected));
    let app_ref = &app;
    assert!(eventually(|| async move { session_state(app_ref, 7).await == "connected" }).await);

    let body: Value = app.server.get("/api/v1/sessions/7").await.json();
    assert_eq!(body["status_text"], "연결됨 - 스트리밍 중");
}

#[tokio::test]
async fn test_offer_for_another_senior_is_ignored() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;
    app.server.post("/api/v1/sessions/7").await;
    end.expect_event(client::CHECK_OFFER).await;

    end.push(
        server::NEW_OFFER,
        vec![json!({ "senior_id": 8, "type": "offer", "sdp": "v=0 other" })],
    );
    end.send("2");
    assert_eq!(end.next_frame().await.as_deref(), Some("3"));

    assert_eq!(app.peers.latest().unwrap().remote.lock().clone(), None);
    assert_eq!(session_state(&app, 7).await, "awaiting_offer");
}

#[tokio::test]
async fn test_reopening_live_session_requests_offer_again() {
    let mut app = TestApp::new().await;
    let mut end = app.connect().await;

    app.server.post("/api/v1/sessions/3").await;
    end.expect_event(client::CHECK_OFFER).await;
    app.server.post("/api/v1/sessions/3").await;
    end.expect_event(client::CHECK_OFFER).await;

    let sessions: Value = app.server.get("/api/v1/sessions").await.json();
    assert_eq!(sessions.as_array().map(Vec::len), Some(1));
    assert_eq!(app.peers.created.lock().len(), 1);
}

#[tokio::test]
async fn test_close_session() {
    let app = TestApp::new().await;
    app.server.post("/api/v1/sessions/5").await;

    app.server
        .delete("/api/v1/sessions/5")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get("/api/v1/sessions/5")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.server
        .delete("/api/v1/sessions/5")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
