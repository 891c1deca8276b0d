//! Webhook route tests, driven through the router without a socket.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::Sha256;
use skald_client::{
    Bootstrapper, ChatClient, CredentialStore, MemoryClient, Room, RoomId, UserId,
};
use skald_gateway::webhook::{self, AppState};
use tower::ServiceExt;

const KEY: &str = "whk_secret";
const ROOM: &str = "!ops:example.org";

fn loopback() -> Arc<MemoryClient> {
    let client = Arc::new(MemoryClient::new(UserId::new("@skald:example.org"), "hunter2"));
    client.seed_room(Room {
        id: RoomId::new(ROOM),
        name: "ops".to_string(),
        encrypted: true,
        members: vec![UserId::new("@alice:example.org")],
    });
    client
}

/// State with an authenticated session, as after bootstrap completes.
async fn ready_state(client: &Arc<MemoryClient>) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("creds.json"));
    let bootstrapper = Bootstrapper::new(
        Arc::clone(client) as Arc<dyn ChatClient>,
        store,
        "hunter2".to_string(),
    );
    let session = bootstrapper.authenticate().await.unwrap();

    let state = AppState::new(KEY);
    state.provide_session(Arc::new(session));
    (state, dir)
}

async fn post(router: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_raw(router, uri, body.to_string(), &[]).await
}

async fn post_raw(
    router: Router,
    uri: &str,
    body: String,
    headers: &[(&str, String)],
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }

    let response =
        router.oneshot(request.body(Body::from(body)).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn relay_before_authentication_is_a_graceful_503() {
    let router = webhook::router(AppState::new(KEY));

    let (status, body) =
        post(router, &format!("/{ROOM}"), &json!({"body": "hi", "key": KEY})).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, body) =
        post(router, &format!("/{ROOM}"), &json!({"body": "hi", "key": "wrong"})).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ret"], "Invalid API key");
    assert!(client.sent_messages().is_empty());
}

#[tokio::test]
async fn missing_body_field_is_a_400() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, _) = post(router, &format!("/{ROOM}"), &json!({"key": KEY})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_formatter_is_a_400() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, body) = post(
        router,
        &format!("/{ROOM}?formatter=pagerduty"),
        &json!({"body": "hi", "key": KEY}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ret"], "unknown formatter: pagerduty");
}

#[tokio::test]
async fn happy_path_joins_and_relays() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, body) =
        post(router, &format!("/{ROOM}"), &json!({"body": "deploy done", "key": KEY})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ret"], "OK");
    assert!(client.is_joined(&RoomId::new(ROOM)));
    assert_eq!(
        client.sent_messages(),
        vec![(RoomId::new(ROOM), "deploy done".to_string())]
    );
}

#[tokio::test]
async fn key_can_come_from_the_query_string() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, _) =
        post(router, &format!("/{ROOM}?key={KEY}"), &json!({"body": "hi"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_room_is_a_404() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, _) = post(
        router,
        "/!nowhere:example.org",
        &json!({"body": "hi", "key": KEY}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn grafana_formatter_is_applied_before_relay() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, _) = post(
        router,
        &format!("/{ROOM}?formatter=grafana"),
        &json!({"title": "CPU", "message": "97%", "key": KEY}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sent = client.sent_messages();
    assert_eq!(sent[0].1, "#### CPU\n97%\n\n");
}

#[tokio::test]
async fn github_push_is_authenticated_by_signature() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let payload = json!({
        "pusher": {"name": "octocat"},
        "ref": "refs/heads/main",
        "before": "aaa",
        "after": "bbb",
        "compare": "https://github.com/o/r/compare/aaa...bbb",
        "commits": [],
    })
    .to_string();

    let mut mac = Hmac::<Sha256>::new_from_slice(KEY.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let (status, _) = post_raw(
        router,
        &format!("/{ROOM}?formatter=github"),
        payload,
        &[("x-github-event", "push".to_string()), ("x-hub-signature-256", signature)],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(client.sent_messages()[0].1.contains("@octocat"));
}

#[tokio::test]
async fn github_without_signature_is_rejected() {
    let client = loopback();
    let (state, _dir) = ready_state(&client).await;
    let router = webhook::router(state);

    let (status, _) = post(
        router,
        &format!("/{ROOM}?formatter=github"),
        &json!({"body": "hi", "key": KEY}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
