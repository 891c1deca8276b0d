//! Webhook routes.
//!
//! `POST /{room_id}` relays a JSON payload into a room. Callers are
//! authenticated by the shared API key — carried in the body's `key`
//! field or the `key` query parameter — except GitHub, which signs the
//! raw body with `X-Hub-Signature-256` instead. Every response is JSON
//! with the HTTP status mirrored in the body, matching what webhook
//! producers expect to log.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use skald_client::{ChatError, RoomId, Session};

use crate::formatters::Formatter;

type HmacSha256 = Hmac<Sha256>;

/// Shared state of the webhook routes.
///
/// The session slot starts empty and is filled once bootstrap
/// authentication completes; until then every relay request is
/// answered with 503.
#[derive(Clone)]
pub struct AppState {
    session: Arc<OnceLock<Arc<Session>>>,
    api_key: Arc<str>,
}

impl AppState {
    /// Create state guarding relays with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { session: Arc::new(OnceLock::new()), api_key: Arc::from(api_key.into()) }
    }

    /// Expose the authenticated session to the relay path. Later calls
    /// are ignored; the session is set once per process.
    pub fn provide_session(&self, session: Arc<Session>) {
        let _ = self.session.set(session);
    }
}

/// Build the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new().route("/:room_id", post(relay)).with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct RelayParams {
    formatter: Option<String>,
    key: Option<String>,
}

/// Relay one webhook payload into a room.
async fn relay(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<RelayParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(mut data) = serde_json::from_slice::<Value>(&body) else {
        return reply(StatusCode::BAD_REQUEST, "Invalid JSON");
    };

    let formatter = match params.formatter.as_deref().map(Formatter::from_str) {
        None => None,
        Some(Ok(formatter)) => Some(formatter),
        Some(Err(err)) => return reply(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let authorized = if formatter == Some(Formatter::Github) {
        github_signature_valid(&headers, &body, &state.api_key)
    } else {
        let presented =
            data.get("key").and_then(Value::as_str).or(params.key.as_deref());
        presented == Some(&*state.api_key)
    };
    if !authorized {
        return reply(StatusCode::UNAUTHORIZED, "Invalid API key");
    }

    if let Some(formatter) = formatter {
        formatter.apply(&mut data, &headers);
    }

    let Some(markdown) = data.get("body").and_then(Value::as_str) else {
        return reply(StatusCode::BAD_REQUEST, "Missing body");
    };

    let Some(session) = state.session.get() else {
        tracing::warn!("webhook for {room_id} arrived before the session was ready");
        return reply(StatusCode::SERVICE_UNAVAILABLE, "Chat session not ready");
    };

    let room = RoomId::new(room_id);
    if let Err(err) = session.client().join(&room).await {
        return match err {
            ChatError::UnknownRoom(_) => reply(StatusCode::NOT_FOUND, err.to_string()),
            _ => {
                tracing::error!("could not join {room}: {err}");
                reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            },
        };
    }

    match session.client().send_message(&room, markdown).await {
        Ok(()) => reply(StatusCode::OK, "OK"),
        Err(err) => {
            tracing::error!("could not relay into {room}: {err}");
            reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        },
    }
}

/// JSON response with the status mirrored in the body.
fn reply(status: StatusCode, ret: impl Into<String>) -> Response {
    let body = serde_json::json!({ "status": status.as_u16(), "ret": ret.into() });
    (status, axum::Json(body)).into_response()
}

/// Check the `X-Hub-Signature-256` HMAC of the raw body against the
/// API key.
fn github_signature_valid(headers: &HeaderMap, body: &[u8], key: &str) -> bool {
    let Some(signature) =
        headers.get("x-hub-signature-256").and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&digest).is_ok()
}
